use crate::primitives::BUILTINS;
use crate::source::Span;
use crate::types::{Procedure, Value};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnvError {
    #[error("unbound variable: '{0}'")]
    UnboundVariable(String, Span), // Symbol name, span where lookup happened
}

/// One scope frame. Frames are shared through `Rc<RefCell<...>>` so that
/// closures can keep their defining frame alive.
#[derive(Debug, Default)]
pub struct Environment {
    outer: Option<Rc<RefCell<Environment>>>,
    bindings: HashMap<String, Value>,
}

impl Environment {
    /// Creates a new, empty top-level environment.
    pub fn new() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Environment::default()))
    }

    /// Creates a top-level environment holding every builtin.
    pub fn new_global_populated() -> Rc<RefCell<Environment>> {
        let env_ptr = Environment::new();
        {
            let mut env = env_ptr.borrow_mut();
            for &(name, func) in BUILTINS {
                env.define(name.to_string(), Value::Procedure(Procedure::Primitive(func, name)));
            }
        }
        env_ptr
    }

    /// Creates a new environment enclosed within an outer one.
    pub fn new_enclosed(outer_env: Rc<RefCell<Environment>>) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Environment {
            outer: Some(outer_env),
            bindings: HashMap::new(),
        }))
    }

    /// Binds `name` in this frame, replacing any binding it already has here.
    /// Outer frames are never touched, so this shadows rather than assigns.
    pub fn define(&mut self, name: String, value: Value) {
        self.bindings.insert(name, value);
    }

    /// Looks up a variable, walking outward through the enclosing frames.
    /// `lookup_span` is where the variable was referenced, for error reporting.
    pub fn lookup(&self, name: &str, lookup_span: Span) -> Result<Value, EnvError> {
        if let Some(value) = self.bindings.get(name) {
            return Ok(value.clone());
        }
        match &self.outer {
            Some(outer_env_ptr) => outer_env_ptr.borrow().lookup(name, lookup_span),
            None => Err(EnvError::UnboundVariable(name.to_string(), lookup_span)),
        }
    }

    /// Every identifier visible from this frame.
    pub fn get_identifiers(&self) -> HashSet<String> {
        let mut identifiers: HashSet<String> = self.bindings.keys().cloned().collect();
        if let Some(outer_env_ptr) = &self.outer {
            identifiers.extend(outer_env_ptr.borrow().get_identifiers());
        }
        identifiers
    }
}

/// The root environment every program starts from.
pub fn create_global_environment() -> Rc<RefCell<Environment>> {
    Environment::new_global_populated()
}
