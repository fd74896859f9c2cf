use crate::expr::{Expr, ExprKind, RuntimeError};
use crate::scope::Scope;
use crate::types::{Function, Variable};
use crate::value::{cell, RuntimeScope, Value};
use std::rc::Rc;

/// A whole program: module-level fields, then methods.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct Source {
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Field {
    pub name: Rc<str>,
    pub type_name: Option<Rc<str>>,
    pub value: Option<Expr>,
    pub offset: usize,
    pub variable: Option<Variable>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Method {
    pub name: Rc<str>,
    pub params: Vec<Rc<str>>,
    pub param_types: Vec<Rc<str>>,
    pub return_type: Option<Rc<str>>,
    pub body: Vec<Stmt>,
    pub offset: usize,
    pub function: Option<Function>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Declaration {
    pub name: Rc<str>,
    pub type_name: Option<Rc<str>>,
    pub value: Option<Expr>,
    pub offset: usize,
    pub variable: Option<Variable>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct ForLoop {
    pub name: Rc<str>,
    pub iterable: Expr,
    pub body: Vec<Stmt>,
    pub offset: usize,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Stmt {
    Expr(Expr),
    Declare(Declaration),
    /// Receiver, value.
    Assign(Expr, Expr),
    If(Expr, Vec<Stmt>, Vec<Stmt>),
    For(ForLoop),
    While(Expr, Vec<Stmt>),
    Return(Expr),
}

/// Why statement execution stopped early.
#[derive(Debug)]
pub enum ExecInterruption {
    Return(Value),
    Err(RuntimeError),
}

impl From<RuntimeError> for ExecInterruption {
    fn from(value: RuntimeError) -> Self {
        ExecInterruption::Err(value)
    }
}

/// Runs `stmts` in a fresh child of `scope`, which is gone again afterwards,
/// however execution leaves the block.
fn exec_block(stmts: &[Stmt], scope: &RuntimeScope) -> Result<(), ExecInterruption> {
    let child = Scope::new_child(scope);
    for stmt in stmts.iter() {
        stmt.exec(&child)?;
    }
    Ok(())
}

impl Stmt {
    pub fn exec(&self, scope: &RuntimeScope) -> Result<(), ExecInterruption> {
        match self {
            Self::Expr(expr) => {
                expr.eval(scope)?;
            }
            Self::Declare(decl) => {
                let val = match &decl.value {
                    Some(val) => val.eval(scope)?,
                    None => Value::Nil,
                };
                scope.borrow_mut().declare(decl.name.clone(), cell(val));
            }
            Self::Assign(receiver, value) => {
                let ExprKind::Access(access) = &receiver.kind else {
                    return Err(RuntimeError::InvalidAssignmentTarget.into());
                };
                let val = value.eval(scope)?;
                let target = match &access.receiver {
                    Some(object) => object.eval(scope)?.as_object()?.field(&access.name)?,
                    None => scope
                        .borrow()
                        .get(&access.name)
                        .ok_or_else(|| RuntimeError::UndefinedVariable(access.name.clone()))?,
                };
                // Mutate the cell in place so every holder sees the new value.
                *target.borrow_mut() = val;
            }
            Self::If(cond, then, other) => {
                if cond.eval(scope)?.as_bool()? {
                    exec_block(then, scope)?;
                } else {
                    exec_block(other, scope)?;
                }
            }
            Self::While(cond, body) => {
                while cond.eval(scope)?.as_bool()? {
                    exec_block(body, scope)?;
                }
            }
            Self::For(for_loop) => {
                let items = for_loop.iterable.eval(scope)?.as_range()?;
                for item in items {
                    let child = Scope::new_child(scope);
                    child
                        .borrow_mut()
                        .declare(for_loop.name.clone(), cell(Value::Integer(item)));
                    for stmt in for_loop.body.iter() {
                        stmt.exec(&child)?;
                    }
                }
            }
            Self::Return(expr) => {
                return Err(ExecInterruption::Return(expr.eval(scope)?));
            }
        }
        Ok(())
    }
}
