use std::rc::Rc;

use num_traits::{ToPrimitive, Zero};
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::expr::{Access, BinaryOp, Call, Expr, ExprKind, Literal};
use crate::scope::Scope;
use crate::statement::{Field, Method, Source, Stmt};
use crate::types::{Function, RecordType, Type, TypeScope, Variable};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("No method `main()` returning Integer.")]
    MissingMain,
    #[error("[offset {offset}] Expected {expected}, found {found}.")]
    TypeMismatch {
        expected: String,
        found: String,
        offset: usize,
    },
    #[error("[offset {offset}] Operator '{op}' cannot be applied to {left} and {right}.")]
    InvalidOperands {
        op: BinaryOp,
        left: String,
        right: String,
        offset: usize,
    },
    #[error("[offset {offset}] Undefined variable '{name}'.")]
    UndefinedVariable { name: Rc<str>, offset: usize },
    #[error("[offset {offset}] Undefined function '{name}' taking {arity} arguments.")]
    UndefinedFunction {
        name: Rc<str>,
        arity: usize,
        offset: usize,
    },
    #[error("[offset {offset}] Type {ty} has no field '{name}'.")]
    UndefinedField {
        ty: String,
        name: Rc<str>,
        offset: usize,
    },
    #[error("[offset {offset}] Type {ty} has no method '{name}' taking {arity} arguments.")]
    UndefinedMethod {
        ty: String,
        name: Rc<str>,
        arity: usize,
        offset: usize,
    },
    #[error("[offset {offset}] Unknown type '{name}'.")]
    UnknownType { name: Rc<str>, offset: usize },
    #[error("[offset {offset}] '{name}' is already defined in this scope.")]
    Redefinition { name: Rc<str>, offset: usize },
    #[error("[offset {offset}] Declaration of '{name}' needs a type or a value.")]
    MissingTypeOrValue { name: Rc<str>, offset: usize },
    #[error("[offset {offset}] Only variables and fields can be assigned to.")]
    InvalidAssignmentTarget { offset: usize },
    #[error("[offset {offset}] Only function calls can be used as statements.")]
    InvalidStatement { offset: usize },
    #[error("[offset {offset}] The body of an IF may not be empty.")]
    EmptyThenBranch { offset: usize },
    #[error("[offset {offset}] Integer literal {literal} does not fit in 32 bits.")]
    IntegerOutOfRange { literal: String, offset: usize },
    #[error("[offset {offset}] Decimal literal {literal} is out of range.")]
    DecimalOutOfRange { literal: String, offset: usize },
}

/// The one coercion gate: `source` may be used where `target` is expected.
pub fn require_assignable(
    target: &Type,
    source: &Type,
    offset: usize,
) -> Result<(), AnalysisError> {
    if target.is_assignable_from(source) {
        Ok(())
    } else {
        Err(AnalysisError::TypeMismatch {
            expected: target.to_string(),
            found: source.to_string(),
            offset,
        })
    }
}

/// Static checker. Resolves every name, computes every expression's type and
/// stores both on the AST.
pub struct Analyzer {
    global: TypeScope,
    types: FxHashMap<Rc<str>, Type>,
    /// Return type of the method whose body is being checked.
    returns: Option<Type>,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer {
    pub fn new() -> Self {
        let global: TypeScope = Scope::root();
        {
            let mut bor = global.borrow_mut();
            bor.declare_function(
                "print".into(),
                1,
                Function::new("print", vec![Type::Any], Type::Nil),
            );
            bor.declare_function(
                "range".into(),
                2,
                Function::new("range", vec![Type::Integer, Type::Integer], Type::IntegerIterable),
            );
        }
        Analyzer {
            global,
            types: Default::default(),
            returns: None,
        }
    }

    /// Makes a record type nameable in type annotations.
    pub fn register_type(&mut self, record: RecordType) -> Type {
        let ty = Type::Record(Rc::new(record));
        self.types.insert(ty.name().into(), ty.clone());
        ty
    }

    pub fn define_variable(&mut self, name: &str, ty: Type) {
        self.global.borrow_mut().declare(
            name.into(),
            Variable {
                name: name.into(),
                ty,
            },
        );
    }

    pub fn define_function(&mut self, fun: Function) {
        self.global
            .borrow_mut()
            .declare_function(fun.name.clone(), fun.arity(), fun);
    }

    #[tracing::instrument(skip_all)]
    pub fn analyze(&mut self, source: &mut Source) -> Result<(), AnalysisError> {
        let has_main = source.methods.iter().any(|m| {
            &*m.name == "main" && m.params.is_empty() && m.return_type.as_deref() == Some("Integer")
        });
        if !has_main {
            return Err(AnalysisError::MissingMain);
        }

        // A fresh module scope per run, so analyzing the same tree twice agrees.
        let module = Scope::new_child(&self.global);
        for field in source.fields.iter_mut() {
            self.field(field, &module)?;
        }
        for method in source.methods.iter_mut() {
            self.declare_method(method, &module)?;
        }
        for method in source.methods.iter_mut() {
            self.method(method, &module)?;
        }
        Ok(())
    }

    fn resolve_type(&self, name: &Rc<str>, offset: usize) -> Result<Type, AnalysisError> {
        Type::builtin(name)
            .or_else(|| self.types.get(name).cloned())
            .ok_or_else(|| AnalysisError::UnknownType {
                name: name.clone(),
                offset,
            })
    }

    /// Shared by fields and local declarations.
    fn binding(
        &mut self,
        name: &Rc<str>,
        type_name: Option<&Rc<str>>,
        value: Option<&mut Expr>,
        offset: usize,
        scope: &TypeScope,
    ) -> Result<Variable, AnalysisError> {
        let declared = match type_name {
            Some(type_name) => Some(self.resolve_type(type_name, offset)?),
            None => None,
        };

        let ty = match (declared, value) {
            (None, None) => {
                return Err(AnalysisError::MissingTypeOrValue {
                    name: name.clone(),
                    offset,
                })
            }
            (Some(declared), None) => declared,
            (declared, Some(value)) => {
                let found = self.expr(value, scope)?;
                match declared {
                    Some(declared) => {
                        require_assignable(&declared, &found, value.offset)?;
                        declared
                    }
                    None => found,
                }
            }
        };

        if scope.borrow().try_get_here(name).is_some() {
            return Err(AnalysisError::Redefinition {
                name: name.clone(),
                offset,
            });
        }

        let variable = Variable {
            name: name.clone(),
            ty,
        };
        scope.borrow_mut().declare(name.clone(), variable.clone());
        Ok(variable)
    }

    fn field(&mut self, field: &mut Field, scope: &TypeScope) -> Result<(), AnalysisError> {
        let variable = self.binding(
            &field.name,
            field.type_name.as_ref(),
            field.value.as_mut(),
            field.offset,
            scope,
        )?;
        field.variable = Some(variable);
        Ok(())
    }

    /// Registers the signature so any method body can call it.
    fn declare_method(
        &mut self,
        method: &mut Method,
        scope: &TypeScope,
    ) -> Result<(), AnalysisError> {
        let params = method
            .param_types
            .iter()
            .map(|name| self.resolve_type(name, method.offset))
            .collect::<Result<Vec<_>, _>>()?;
        let returns = match &method.return_type {
            Some(name) => self.resolve_type(name, method.offset)?,
            None => Type::Nil,
        };

        if scope.borrow().has_function_here(&method.name, params.len()) {
            return Err(AnalysisError::Redefinition {
                name: method.name.clone(),
                offset: method.offset,
            });
        }

        let function = Function::new(method.name.clone(), params, returns);
        scope
            .borrow_mut()
            .declare_function(method.name.clone(), function.arity(), function.clone());
        method.function = Some(function);
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(method = %method.name))]
    fn method(&mut self, method: &mut Method, scope: &TypeScope) -> Result<(), AnalysisError> {
        let Some(function) = method.function.clone() else {
            return Err(AnalysisError::UndefinedFunction {
                name: method.name.clone(),
                arity: method.params.len(),
                offset: method.offset,
            });
        };

        let body_scope = Scope::new_child(scope);
        for (param, ty) in method.params.iter().zip(&function.params) {
            if body_scope.borrow().try_get_here(param).is_some() {
                return Err(AnalysisError::Redefinition {
                    name: param.clone(),
                    offset: method.offset,
                });
            }
            body_scope.borrow_mut().declare(
                param.clone(),
                Variable {
                    name: param.clone(),
                    ty: ty.clone(),
                },
            );
        }

        let previous = self.returns.replace(function.returns.clone());
        let result = self.block(&mut method.body, &body_scope);
        self.returns = previous;
        tracing::debug!(ok = result.is_ok(), "analyzed method");
        result
    }

    fn block(&mut self, stmts: &mut [Stmt], scope: &TypeScope) -> Result<(), AnalysisError> {
        for stmt in stmts.iter_mut() {
            self.stmt(stmt, scope)?;
        }
        Ok(())
    }

    fn stmt(&mut self, stmt: &mut Stmt, scope: &TypeScope) -> Result<(), AnalysisError> {
        match stmt {
            Stmt::Expr(expr) => {
                self.expr(expr, scope)?;
                if !matches!(expr.kind, ExprKind::Call(_)) {
                    return Err(AnalysisError::InvalidStatement {
                        offset: expr.offset,
                    });
                }
            }
            Stmt::Declare(decl) => {
                let variable = self.binding(
                    &decl.name,
                    decl.type_name.as_ref(),
                    decl.value.as_mut(),
                    decl.offset,
                    scope,
                )?;
                decl.variable = Some(variable);
            }
            Stmt::Assign(receiver, value) => {
                if !matches!(receiver.kind, ExprKind::Access(_)) {
                    return Err(AnalysisError::InvalidAssignmentTarget {
                        offset: receiver.offset,
                    });
                }
                let found = self.expr(value, scope)?;
                let target = self.expr(receiver, scope)?;
                require_assignable(&target, &found, value.offset)?;
            }
            Stmt::If(cond, then, other) => {
                let ty = self.expr(cond, scope)?;
                require_assignable(&Type::Boolean, &ty, cond.offset)?;
                if then.is_empty() {
                    return Err(AnalysisError::EmptyThenBranch {
                        offset: cond.offset,
                    });
                }
                self.block(then, &Scope::new_child(scope))?;
                self.block(other, &Scope::new_child(scope))?;
            }
            Stmt::While(cond, body) => {
                let ty = self.expr(cond, scope)?;
                require_assignable(&Type::Boolean, &ty, cond.offset)?;
                self.block(body, &Scope::new_child(scope))?;
            }
            Stmt::For(for_loop) => {
                let ty = self.expr(&mut for_loop.iterable, scope)?;
                require_assignable(&Type::IntegerIterable, &ty, for_loop.iterable.offset)?;

                let body_scope = Scope::new_child(scope);
                body_scope.borrow_mut().declare(
                    for_loop.name.clone(),
                    Variable {
                        name: for_loop.name.clone(),
                        ty: Type::Integer,
                    },
                );
                self.block(&mut for_loop.body, &body_scope)?;
            }
            Stmt::Return(expr) => {
                let ty = self.expr(expr, scope)?;
                let returns = self.returns.clone().unwrap_or(Type::Nil);
                require_assignable(&returns, &ty, expr.offset)?;
            }
        }
        Ok(())
    }

    fn expr(&mut self, expr: &mut Expr, scope: &TypeScope) -> Result<Type, AnalysisError> {
        let offset = expr.offset;
        let ty = match &mut expr.kind {
            ExprKind::Literal(lit) => literal(lit, offset)?,
            ExprKind::Group(inner) => self.expr(inner, scope)?,
            ExprKind::Binary(op, l, r) => {
                let left = self.expr(l, scope)?;
                let right = self.expr(r, scope)?;
                binary(*op, &left, &right, l.offset, r.offset, offset)?
            }
            ExprKind::Access(access) => self.access(access, scope, offset)?,
            ExprKind::Call(call) => self.call(call, scope, offset)?,
        };
        expr.ty = Some(ty.clone());
        Ok(ty)
    }

    fn access(
        &mut self,
        access: &mut Access,
        scope: &TypeScope,
        offset: usize,
    ) -> Result<Type, AnalysisError> {
        let variable = match &mut access.receiver {
            Some(receiver) => {
                // Look the name up among the receiver type's members, not in `scope`.
                let receiver_ty = self.expr(receiver, scope)?;
                let field = match &receiver_ty {
                    Type::Record(record) => record.scope().borrow().try_get_here(&access.name),
                    _ => None,
                };
                field.ok_or_else(|| AnalysisError::UndefinedField {
                    ty: receiver_ty.to_string(),
                    name: access.name.clone(),
                    offset,
                })?
            }
            None => scope
                .borrow()
                .get(&access.name)
                .ok_or_else(|| AnalysisError::UndefinedVariable {
                    name: access.name.clone(),
                    offset,
                })?,
        };

        let ty = variable.ty.clone();
        access.variable = Some(variable);
        Ok(ty)
    }

    fn call(
        &mut self,
        call: &mut Call,
        scope: &TypeScope,
        offset: usize,
    ) -> Result<Type, AnalysisError> {
        // Slot 0 of a method's parameters is the receiver.
        let (function, skip) = match &mut call.receiver {
            Some(receiver) => {
                let receiver_ty = self.expr(receiver, scope)?;
                let arity = call.args.len() + 1;
                let method = match &receiver_ty {
                    Type::Record(record) => record.scope().borrow().get_function(&call.name, arity),
                    _ => None,
                };
                let method = method.ok_or_else(|| AnalysisError::UndefinedMethod {
                    ty: receiver_ty.to_string(),
                    name: call.name.clone(),
                    arity: call.args.len(),
                    offset,
                })?;
                (method, 1)
            }
            None => {
                let function = scope
                    .borrow()
                    .get_function(&call.name, call.args.len())
                    .ok_or_else(|| AnalysisError::UndefinedFunction {
                        name: call.name.clone(),
                        arity: call.args.len(),
                        offset,
                    })?;
                (function, 0)
            }
        };

        for (arg, param) in call.args.iter_mut().zip(&function.params[skip..]) {
            let ty = self.expr(arg, scope)?;
            require_assignable(param, &ty, arg.offset)?;
        }

        let ty = function.returns.clone();
        call.function = Some(function);
        Ok(ty)
    }
}

fn literal(lit: &Literal, offset: usize) -> Result<Type, AnalysisError> {
    Ok(match lit {
        Literal::Nil => Type::Nil,
        Literal::Boolean(_) => Type::Boolean,
        Literal::Character(_) => Type::Character,
        Literal::String(_) => Type::String,
        Literal::Integer(x) => {
            if x.to_i32().is_none() {
                return Err(AnalysisError::IntegerOutOfRange {
                    literal: x.to_string(),
                    offset,
                });
            }
            Type::Integer
        }
        Literal::Decimal(x) => {
            // Overflow to infinity and underflow to zero both lose the value.
            let representable = match x.to_f64() {
                Some(f) => f.is_finite() && (f != 0.0 || x.is_zero()),
                None => false,
            };
            if !representable {
                return Err(AnalysisError::DecimalOutOfRange {
                    literal: x.to_string(),
                    offset,
                });
            }
            Type::Decimal
        }
    })
}

fn binary(
    op: BinaryOp,
    left: &Type,
    right: &Type,
    left_offset: usize,
    right_offset: usize,
    offset: usize,
) -> Result<Type, AnalysisError> {
    match op {
        BinaryOp::And | BinaryOp::Or => {
            require_assignable(&Type::Boolean, left, left_offset)?;
            require_assignable(&Type::Boolean, right, right_offset)?;
            Ok(Type::Boolean)
        }
        op if op.is_comparison() => {
            require_assignable(&Type::Comparable, left, left_offset)?;
            require_assignable(left, right, right_offset)?;
            Ok(Type::Boolean)
        }
        BinaryOp::Add if *left == Type::String || *right == Type::String => Ok(Type::String),
        _ if matches!(left, Type::Integer | Type::Decimal) && left == right => Ok(left.clone()),
        _ => Err(AnalysisError::InvalidOperands {
            op,
            left: left.to_string(),
            right: right.to_string(),
            offset,
        }),
    }
}

/// Checks a parsed program.
pub fn analyze(source: &mut Source) -> Result<(), AnalysisError> {
    Analyzer::new().analyze(source)
}
