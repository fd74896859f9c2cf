use std::{cmp::Ordering, fmt, rc::Rc};

use bigdecimal::{BigDecimal, RoundingMode};
use num_bigint::BigInt;
use thiserror::Error;

use crate::types::{Function, Type, Variable};
use crate::value::{RuntimeScope, Value};

pub type ExprRef = Box<Expr>;

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub offset: usize,
    /// Filled in by the analyzer.
    pub ty: Option<Type>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    Group(ExprRef),
    Binary(BinaryOp, ExprRef, ExprRef),
    Access(Access),
    Call(Call),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Nil,
    Boolean(bool),
    Integer(BigInt),
    Decimal(BigDecimal),
    Character(char),
    String(Rc<str>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Access {
    pub receiver: Option<ExprRef>,
    pub name: Rc<str>,
    pub variable: Option<Variable>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub receiver: Option<ExprRef>,
    pub name: Rc<str>,
    pub args: Vec<Expr>,
    pub function: Option<Function>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    And,
    Or,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
    NotEqual,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn from_lexeme(lexeme: &str) -> Option<BinaryOp> {
        Some(match lexeme {
            "AND" => Self::And,
            "OR" => Self::Or,
            "<" => Self::Less,
            "<=" => Self::LessEqual,
            ">" => Self::Greater,
            ">=" => Self::GreaterEqual,
            "==" => Self::Equal,
            "!=" => Self::NotEqual,
            "+" => Self::Add,
            "-" => Self::Sub,
            "*" => Self::Mul,
            "/" => Self::Div,
            _ => return None,
        })
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Less
                | Self::LessEqual
                | Self::Greater
                | Self::GreaterEqual
                | Self::Equal
                | Self::NotEqual
        )
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lexeme = match self {
            Self::And => "AND",
            Self::Or => "OR",
            Self::Less => "<",
            Self::LessEqual => "<=",
            Self::Greater => ">",
            Self::GreaterEqual => ">=",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        };
        f.write_str(lexeme)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("Undefined variable '{0}'.")]
    UndefinedVariable(Rc<str>),
    #[error("Undefined function '{name}' taking {arity} arguments.")]
    UndefinedFunction { name: Rc<str>, arity: usize },
    #[error("Value of type {ty} has no field '{name}'.")]
    UndefinedField { ty: Rc<str>, name: Rc<str> },
    #[error("Value of type {ty} has no method '{name}' taking {arity} arguments.")]
    UndefinedMethod {
        ty: Rc<str>,
        name: Rc<str>,
        arity: usize,
    },
    #[error("Expected {expected}, got {found}.")]
    TypeError {
        expected: &'static str,
        found: &'static str,
    },
    #[error("Operator '{op}' cannot be applied to {left} and {right}.")]
    InvalidOperands {
        op: BinaryOp,
        left: &'static str,
        right: &'static str,
    },
    #[error("Division by zero.")]
    DivisionByZero,
    #[error("Only variables and fields can be assigned to.")]
    InvalidAssignmentTarget,
    #[error("Expected {0} arguments, got {1}.")]
    WrongArgumentCount(usize, usize),
    #[error("Failed to write output: {0}")]
    Io(String),
}

impl Expr {
    pub fn new(kind: ExprKind, offset: usize) -> Self {
        Expr {
            kind,
            offset,
            ty: None,
        }
    }

    pub fn eval(&self, scope: &RuntimeScope) -> Result<Value, RuntimeError> {
        match &self.kind {
            ExprKind::Literal(lit) => Ok(Value::from(lit)),
            ExprKind::Group(inner) => inner.eval(scope),
            ExprKind::Binary(op @ (BinaryOp::And | BinaryOp::Or), x, y) => {
                let l = x.eval(scope)?.as_bool()?;

                if *op == BinaryOp::Or && l || *op == BinaryOp::And && !l {
                    return Ok(Value::Boolean(l));
                }

                Ok(Value::Boolean(y.eval(scope)?.as_bool()?))
            }
            ExprKind::Binary(op, x, y) => {
                let l = x.eval(scope)?;
                let r = y.eval(scope)?;
                binary(*op, l, r)
            }
            ExprKind::Access(access) => match &access.receiver {
                Some(receiver) => {
                    let object = receiver.eval(scope)?.as_object()?;
                    let cell = object.field(&access.name)?;
                    let val = cell.borrow().clone();
                    Ok(val)
                }
                None => {
                    let cell = scope
                        .borrow()
                        .get(&access.name)
                        .ok_or_else(|| RuntimeError::UndefinedVariable(access.name.clone()))?;
                    let val = cell.borrow().clone();
                    Ok(val)
                }
            },
            ExprKind::Call(call) => {
                let receiver = match &call.receiver {
                    Some(receiver) => Some(receiver.eval(scope)?),
                    None => None,
                };

                let mut args = Vec::with_capacity(call.args.len() + 1);
                if let Some(receiver) = &receiver {
                    args.push(receiver.clone());
                }
                for arg in call.args.iter() {
                    args.push(arg.eval(scope)?);
                }

                let fun = match receiver {
                    Some(receiver) => receiver.as_object()?.method(&call.name, args.len())?,
                    None => scope
                        .borrow()
                        .get_function(&call.name, args.len())
                        .ok_or_else(|| RuntimeError::UndefinedFunction {
                            name: call.name.clone(),
                            arity: args.len(),
                        })?,
                };

                tracing::trace!(name = %call.name, arity = args.len(), "call");
                fun.call(args)
            }
        }
    }
}

fn binary(op: BinaryOp, l: Value, r: Value) -> Result<Value, RuntimeError> {
    if op == BinaryOp::Div && r.is_zero() {
        return Err(RuntimeError::DivisionByZero);
    }

    match (op, l, r) {
        (BinaryOp::Add, Value::String(a), b) => Ok(Value::String(format!("{a}{b}").into())),
        (BinaryOp::Add, a, Value::String(b)) => Ok(Value::String(format!("{a}{b}").into())),

        (BinaryOp::Add, Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a + b)),
        (BinaryOp::Sub, Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a - b)),
        (BinaryOp::Mul, Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a * b)),
        // Truncates toward zero.
        (BinaryOp::Div, Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a / b)),

        (BinaryOp::Add, Value::Decimal(a), Value::Decimal(b)) => Ok(Value::Decimal(a + b)),
        (BinaryOp::Sub, Value::Decimal(a), Value::Decimal(b)) => Ok(Value::Decimal(a - b)),
        (BinaryOp::Mul, Value::Decimal(a), Value::Decimal(b)) => Ok(Value::Decimal(a * b)),
        (BinaryOp::Div, Value::Decimal(a), Value::Decimal(b)) => {
            // The quotient keeps the dividend's scale.
            let (_, scale) = a.as_bigint_and_exponent();
            Ok(Value::Decimal(
                (a / b).with_scale_round(scale, RoundingMode::HalfEven),
            ))
        }

        (BinaryOp::Equal, a, b) => Ok(Value::Boolean(a == b)),
        (BinaryOp::NotEqual, a, b) => Ok(Value::Boolean(a != b)),

        (op, a, b) if op.is_comparison() => {
            let ord = compare(op, &a, &b)?;
            Ok(Value::Boolean(match op {
                BinaryOp::Less => ord == Ordering::Less,
                BinaryOp::LessEqual => ord != Ordering::Greater,
                BinaryOp::Greater => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            }))
        }

        (op, a, b) => Err(RuntimeError::InvalidOperands {
            op,
            left: a.type_name(),
            right: b.type_name(),
        }),
    }
}

fn compare(op: BinaryOp, a: &Value, b: &Value) -> Result<Ordering, RuntimeError> {
    match (a, b) {
        (Value::Integer(a), Value::Integer(b)) => Ok(a.cmp(b)),
        (Value::Decimal(a), Value::Decimal(b)) => Ok(a.cmp(b)),
        (Value::Character(a), Value::Character(b)) => Ok(a.cmp(b)),
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        (Value::Boolean(a), Value::Boolean(b)) => Ok(a.cmp(b)),
        (a, b) => Err(RuntimeError::InvalidOperands {
            op,
            left: a.type_name(),
            right: b.type_name(),
        }),
    }
}
