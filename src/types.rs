use crate::scope::{Scope, ScopeLink};
use std::{fmt, rc::Rc};

/// A resolved variable: what an `Access` or declaration refers to.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: Rc<str>,
    pub ty: Type,
}

/// A resolved function signature. For record methods, `params[0]` is the receiver.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: Rc<str>,
    pub params: Vec<Type>,
    pub returns: Type,
}

impl Function {
    pub fn new(name: impl Into<Rc<str>>, params: Vec<Type>, returns: Type) -> Self {
        Function {
            name: name.into(),
            params,
            returns,
        }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

pub type TypeScope = ScopeLink<Variable, Function>;

#[derive(Debug, Clone)]
pub enum Type {
    Any,
    Nil,
    Comparable,
    Boolean,
    Integer,
    Decimal,
    Character,
    String,
    IntegerIterable,
    Record(Rc<RecordType>),
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Record(a), Self::Record(b)) => a.name == b.name,
            (a, b) => std::mem::discriminant(a) == std::mem::discriminant(b),
        }
    }
}

impl Type {
    pub fn builtin(name: &str) -> Option<Type> {
        Some(match name {
            "Any" => Self::Any,
            "Nil" => Self::Nil,
            "Comparable" => Self::Comparable,
            "Boolean" => Self::Boolean,
            "Integer" => Self::Integer,
            "Decimal" => Self::Decimal,
            "Character" => Self::Character,
            "String" => Self::String,
            "IntegerIterable" => Self::IntegerIterable,
            _ => return None,
        })
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Any => "Any",
            Self::Nil => "Nil",
            Self::Comparable => "Comparable",
            Self::Boolean => "Boolean",
            Self::Integer => "Integer",
            Self::Decimal => "Decimal",
            Self::Character => "Character",
            Self::String => "String",
            Self::IntegerIterable => "IntegerIterable",
            Self::Record(rec) => &rec.name,
        }
    }

    /// The single coercion rule: exact match, or a target of `Any`/`Comparable`.
    pub fn is_assignable_from(&self, source: &Type) -> bool {
        self == source || matches!(self, Self::Any | Self::Comparable)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A host-registered aggregate type with named fields and methods.
#[derive(Debug)]
pub struct RecordType {
    pub name: Rc<str>,
    scope: TypeScope,
}

impl RecordType {
    pub fn new(name: impl Into<Rc<str>>) -> Self {
        RecordType {
            name: name.into(),
            scope: Scope::root(),
        }
    }

    pub fn with_field(self, name: &str, ty: Type) -> Self {
        self.scope.borrow_mut().declare(
            name.into(),
            Variable {
                name: name.into(),
                ty,
            },
        );
        self
    }

    /// Registers a method. `params` excludes the receiver; it is prepended here.
    pub fn with_method(self, name: &str, params: Vec<Type>, returns: Type) -> Self {
        let receiver = Type::Any;
        let params = std::iter::once(receiver).chain(params).collect::<Vec<_>>();
        let arity = params.len();
        self.scope
            .borrow_mut()
            .declare_function(name.into(), arity, Function::new(name, params, returns));
        self
    }

    /// Members live in their own scope, which has no parent.
    pub fn scope(&self) -> &TypeScope {
        &self.scope
    }
}
