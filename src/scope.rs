use rustc_hash::FxHashMap;
use std::{cell::RefCell, rc::Rc};

pub type ScopeLink<V, F> = Rc<RefCell<Scope<V, F>>>;

/// One level of lexical bindings.
///
/// Shared by the analyzer (types) and the interpreter (value cells); only the
/// payloads differ. Functions are keyed by name and arity so overloads on
/// arity can coexist.
#[derive(Debug)]
pub struct Scope<V, F> {
    variables: FxHashMap<Rc<str>, V>,
    functions: FxHashMap<(Rc<str>, usize), F>,
    parent: Option<ScopeLink<V, F>>,
}

impl<V, F> Default for Scope<V, F> {
    fn default() -> Self {
        Scope {
            variables: Default::default(),
            functions: Default::default(),
            parent: None,
        }
    }
}

impl<V: Clone, F: Clone> Scope<V, F> {
    pub fn root() -> ScopeLink<V, F> {
        Rc::new(RefCell::new(Scope::default()))
    }

    /// Opens a child scope. It is dropped, and the parent is the innermost
    /// scope again, as soon as the returned link goes out of use.
    pub fn new_child(this: &ScopeLink<V, F>) -> ScopeLink<V, F> {
        Rc::new(RefCell::new(Scope {
            variables: Default::default(),
            functions: Default::default(),
            parent: Some(this.clone()),
        }))
    }

    pub fn try_get_here(&self, id: &str) -> Option<V> {
        self.variables.get(id).cloned()
    }

    pub fn has_function_here(&self, id: &str, arity: usize) -> bool {
        self.functions.contains_key(&(Rc::from(id), arity))
    }

    pub fn declare(&mut self, id: Rc<str>, val: V) {
        self.variables.insert(id, val);
    }

    pub fn declare_function(&mut self, id: Rc<str>, arity: usize, fun: F) {
        self.functions.insert((id, arity), fun);
    }

    pub fn get(&self, id: &str) -> Option<V> {
        if let Some(val) = self.variables.get(id) {
            return Some(val.clone());
        }

        // self is of type &Scope, the rest of the chain are ScopeLinks.
        let mut cur = self.parent.clone();
        while let Some(link) = cur {
            let borrow = link.borrow();
            if let Some(val) = borrow.variables.get(id) {
                return Some(val.clone());
            }
            cur = borrow.parent.clone();
        }
        None
    }

    pub fn get_function(&self, id: &str, arity: usize) -> Option<F> {
        let key = (Rc::from(id), arity);
        if let Some(fun) = self.functions.get(&key) {
            return Some(fun.clone());
        }

        let mut cur = self.parent.clone();
        while let Some(link) = cur {
            let borrow = link.borrow();
            if let Some(fun) = borrow.functions.get(&key) {
                return Some(fun.clone());
            }
            cur = borrow.parent.clone();
        }
        None
    }
}
