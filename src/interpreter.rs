use std::{cell::RefCell, io::Write, rc::Rc};

use thiserror::Error;
use tracing::debug;

use crate::analyzer::{AnalysisError, Analyzer};
use crate::expr::RuntimeError;
use crate::parser::{parse, ParseError};
use crate::scanner::{scan, LexError};
use crate::scope::Scope;
use crate::statement::Source;
use crate::types::{Function, RecordType, Type};
use crate::value::{cell, Callable, Func, HostFn, NativeCall, Output, RuntimeScope, Value};

/// Any failure of the tokenize, parse, analyze, run pipeline.
#[derive(Debug, Error)]
pub enum InterpretErr {
    #[error("lex error: {0}")]
    Lex(#[from] LexError),
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("analysis error: {0}")]
    Analysis(#[from] AnalysisError),
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

pub struct Interpreter {
    global_scope: RuntimeScope,
    /// Fields and methods of the most recently interpreted source.
    module_scope: RuntimeScope,
    analyzer: Analyzer,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Interpreter {
        Self::with_output(std::io::stdout())
    }

    /// An interpreter whose `print` writes to `out`.
    pub fn with_output(out: impl Write + 'static) -> Interpreter {
        let output: Output = Rc::new(RefCell::new(out));
        let global_scope: RuntimeScope = Scope::root();
        {
            let mut bor = global_scope.borrow_mut();
            bor.declare_function("print".into(), 1, Callable::Native(NativeCall::Print(output)));
            bor.declare_function("range".into(), 2, Callable::Native(NativeCall::Range));
        }
        Interpreter {
            module_scope: Scope::new_child(&global_scope),
            global_scope,
            analyzer: Analyzer::new(),
        }
    }

    /// Binds a host value under `name`, visible to every program run afterwards.
    pub fn define_variable(&mut self, name: &str, ty: Type, value: Value) {
        self.analyzer.define_variable(name, ty);
        self.global_scope.borrow_mut().declare(name.into(), cell(value));
    }

    /// Exposes a host function with the signature `fun`.
    pub fn define_function(
        &mut self,
        fun: Function,
        body: impl Fn(&[Value]) -> Result<Value, RuntimeError> + 'static,
    ) {
        let body: HostFn = Rc::new(body);
        let native = NativeCall::Host {
            name: fun.name.clone(),
            arity: fun.arity(),
            fun: body,
        };
        self.global_scope
            .borrow_mut()
            .declare_function(fun.name.clone(), fun.arity(), Callable::Native(native));
        self.analyzer.define_function(fun);
    }

    pub fn register_type(&mut self, record: RecordType) -> Type {
        self.analyzer.register_type(record)
    }

    /// Executes an analyzed source and returns what `main` returned.
    #[tracing::instrument(skip_all)]
    pub fn interpret(&mut self, source: &Source) -> Result<Value, RuntimeError> {
        let module = Scope::new_child(&self.global_scope);
        self.module_scope = module.clone();

        for field in source.fields.iter() {
            let val = match &field.value {
                Some(val) => val.eval(&module)?,
                None => Value::Nil,
            };
            module.borrow_mut().declare(field.name.clone(), cell(val));
        }

        for method in source.methods.iter() {
            let func = Func {
                name: method.name.clone(),
                params: method.params.iter().cloned().collect(),
                body: method.body.clone().into(),
                closure: module.clone(),
            };
            module.borrow_mut().declare_function(
                method.name.clone(),
                method.params.len(),
                Callable::User(Rc::new(func)),
            );
        }

        let main = module
            .borrow()
            .get_function("main", 0)
            .ok_or_else(|| RuntimeError::UndefinedFunction {
                name: "main".into(),
                arity: 0,
            })?;
        let result = main.call(vec![])?;
        debug!(%result, "main returned");
        Ok(result)
    }

    /// Runs program text through the whole pipeline.
    pub fn run(&mut self, code: &str) -> Result<Value, InterpretErr> {
        let tokens = scan(code)?;
        let mut source = parse(&tokens)?;
        self.analyzer.analyze(&mut source)?;
        Ok(self.interpret(&source)?)
    }

    /// Looks `id` up among the last program's fields and the host globals.
    pub fn get_global(&self, id: &str) -> Option<Value> {
        self.module_scope
            .borrow()
            .get(id)
            .map(|val| val.borrow().clone())
    }
}

/// Runs `code` on a fresh interpreter that prints to stdout.
pub fn run(code: &str) -> Result<Value, InterpretErr> {
    Interpreter::new().run(code)
}
