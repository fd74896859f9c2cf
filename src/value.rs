use std::{
    cell::RefCell,
    fmt,
    io::{self, Write},
    iter::successors,
    rc::Rc,
};

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::{One, Zero};

use crate::expr::{Literal, RuntimeError};
use crate::scope::{Scope, ScopeLink};
use crate::statement::{ExecInterruption, Stmt};

pub type ValueCell = Rc<RefCell<Value>>;
pub type RuntimeScope = ScopeLink<ValueCell, Callable>;

#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Boolean(bool),
    Integer(BigInt),
    Decimal(BigDecimal),
    Character(char),
    String(Rc<str>),
    /// Half-open `start..end`, stepped lazily by `FOR`.
    Range(BigInt, BigInt),
    Object(Rc<Object>),
}

pub fn cell(val: Value) -> ValueCell {
    Rc::new(RefCell::new(val))
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "Nil",
            Self::Boolean(_) => "Boolean",
            Self::Integer(_) => "Integer",
            Self::Decimal(_) => "Decimal",
            Self::Character(_) => "Character",
            Self::String(_) => "String",
            Self::Range(..) => "IntegerIterable",
            Self::Object(_) => "Object",
        }
    }

    pub fn as_bool(&self) -> Result<bool, RuntimeError> {
        match self {
            Self::Boolean(b) => Ok(*b),
            other => Err(RuntimeError::TypeError {
                expected: "Boolean",
                found: other.type_name(),
            }),
        }
    }

    pub fn as_object(&self) -> Result<Rc<Object>, RuntimeError> {
        match self {
            Self::Object(obj) => Ok(obj.clone()),
            other => Err(RuntimeError::TypeError {
                expected: "Object",
                found: other.type_name(),
            }),
        }
    }

    pub fn as_range(&self) -> Result<impl Iterator<Item = BigInt>, RuntimeError> {
        match self {
            Self::Range(start, end) => {
                let end = end.clone();
                Ok(successors(Some(start.clone()), |cur| Some(cur + BigInt::one()))
                    .take_while(move |cur| *cur < end))
            }
            other => Err(RuntimeError::TypeError {
                expected: "IntegerIterable",
                found: other.type_name(),
            }),
        }
    }

    pub fn as_integer(&self) -> Result<&BigInt, RuntimeError> {
        match self {
            Self::Integer(x) => Ok(x),
            other => Err(RuntimeError::TypeError {
                expected: "Integer",
                found: other.type_name(),
            }),
        }
    }

    pub(crate) fn is_zero(&self) -> bool {
        match self {
            Self::Integer(x) => x.is_zero(),
            Self::Decimal(x) => x.is_zero(),
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Decimal(a), Self::Decimal(b)) => a == b,
            (Self::Character(a), Self::Character(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Range(a, b), Self::Range(c, d)) => a == c && b == d,
            (Self::Object(a), Self::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<&Literal> for Value {
    fn from(lit: &Literal) -> Self {
        match lit {
            Literal::Nil => Self::Nil,
            Literal::Boolean(b) => Self::Boolean(*b),
            Literal::Integer(x) => Self::Integer(x.clone()),
            Literal::Decimal(x) => Self::Decimal(x.clone()),
            Literal::Character(c) => Self::Character(*c),
            Literal::String(s) => Self::String(s.clone()),
        }
    }
}

impl From<i64> for Value {
    fn from(x: i64) -> Self {
        Self::Integer(x.into())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.into())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Nil => write!(f, "NIL"),
            Self::Boolean(true) => write!(f, "TRUE"),
            Self::Boolean(false) => write!(f, "FALSE"),
            Self::Integer(x) => write!(f, "{}", x),
            Self::Decimal(x) => write!(f, "{}", x),
            Self::Character(x) => write!(f, "{}", x),
            Self::String(x) => write!(f, "{}", x),
            Self::Range(start, end) => write!(f, "[{}, {})", start, end),
            Self::Object(obj) => write!(f, "<{}>", obj.type_name),
        }
    }
}

/// A host-provided aggregate: mutable field cells plus native methods.
///
/// Methods receive the object itself as argument 0.
pub struct Object {
    pub type_name: Rc<str>,
    members: RuntimeScope,
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("type_name", &self.type_name)
            .finish()
    }
}

impl Object {
    pub fn new(type_name: impl Into<Rc<str>>) -> Self {
        Object {
            type_name: type_name.into(),
            members: Scope::root(),
        }
    }

    pub fn with_field(self, name: &str, val: Value) -> Self {
        self.members.borrow_mut().declare(name.into(), cell(val));
        self
    }

    /// `arity` excludes the receiver.
    pub fn with_method(
        self,
        name: &str,
        arity: usize,
        fun: impl Fn(&[Value]) -> Result<Value, RuntimeError> + 'static,
    ) -> Self {
        let call = NativeCall::Host {
            name: name.into(),
            arity: arity + 1,
            fun: Rc::new(fun),
        };
        self.members
            .borrow_mut()
            .declare_function(name.into(), arity + 1, Callable::Native(call));
        self
    }

    pub fn field(&self, name: &Rc<str>) -> Result<ValueCell, RuntimeError> {
        self.members
            .borrow()
            .try_get_here(name)
            .ok_or_else(|| RuntimeError::UndefinedField {
                ty: self.type_name.clone(),
                name: name.clone(),
            })
    }

    /// `arity` includes the receiver.
    pub fn method(&self, name: &Rc<str>, arity: usize) -> Result<Callable, RuntimeError> {
        self.members
            .borrow()
            .get_function(name, arity)
            .ok_or_else(|| RuntimeError::UndefinedMethod {
                ty: self.type_name.clone(),
                name: name.clone(),
                arity: arity.saturating_sub(1),
            })
    }
}

/// Where `print` writes to.
pub type Output = Rc<RefCell<dyn Write>>;

pub type HostFn = Rc<dyn Fn(&[Value]) -> Result<Value, RuntimeError>>;

#[derive(Clone)]
pub enum NativeCall {
    Print(Output),
    Range,
    Host { name: Rc<str>, arity: usize, fun: HostFn },
}

impl fmt::Debug for NativeCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Print(_) => write!(f, "Print"),
            Self::Range => write!(f, "Range"),
            Self::Host { name, arity, .. } => write!(f, "Host({name}/{arity})"),
        }
    }
}

impl NativeCall {
    pub fn arity(&self) -> usize {
        match self {
            Self::Print(_) => 1,
            Self::Range => 2,
            Self::Host { arity, .. } => *arity,
        }
    }

    pub fn call(&self, vals: &[Value]) -> Result<Value, RuntimeError> {
        if self.arity() != vals.len() {
            return Err(RuntimeError::WrongArgumentCount(self.arity(), vals.len()));
        }
        match self {
            Self::Print(out) => {
                writeln!(out.borrow_mut(), "{}", vals[0])
                    .map_err(|e| RuntimeError::Io(e.to_string()))?;
                Ok(Value::Nil)
            }
            Self::Range => Ok(Value::Range(
                vals[0].as_integer()?.clone(),
                vals[1].as_integer()?.clone(),
            )),
            Self::Host { fun, .. } => fun(vals),
        }
    }
}

/// A user-defined method together with the scope it was defined in.
pub struct Func {
    pub name: Rc<str>,
    pub params: Rc<[Rc<str>]>,
    pub body: Rc<[Stmt]>,
    pub closure: RuntimeScope,
}

// The closure usually holds this function again, so it is left out.
impl fmt::Debug for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Func")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum Callable {
    Native(NativeCall),
    User(Rc<Func>),
}

impl Callable {
    /// Runs the callable. A `RETURN` inside the body stops here and becomes the result.
    pub fn call(&self, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let func = match self {
            Self::Native(nc) => return nc.call(&args),
            Self::User(func) => func,
        };

        if args.len() != func.params.len() {
            return Err(RuntimeError::WrongArgumentCount(func.params.len(), args.len()));
        }

        let child = Scope::new_child(&func.closure);
        {
            let mut bor = child.borrow_mut();
            for (param, arg) in func.params.iter().zip(args) {
                bor.declare(param.clone(), cell(arg));
            }
        }

        for stmt in func.body.iter() {
            match stmt.exec(&child) {
                Ok(()) => continue,
                Err(ExecInterruption::Err(e)) => return Err(e),
                Err(ExecInterruption::Return(val)) => return Ok(val),
            }
        }

        Ok(Value::Nil)
    }
}

/// An in-memory `print` target that can be read back, e.g. by tests or embedders.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
