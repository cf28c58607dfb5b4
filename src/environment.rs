//! Runtime scope chain.
//!
//! Frames are shared (`Rc<RefCell<_>>`) because a closure keeps its defining
//! frame alive after the block that created it has exited.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use log::trace;

use crate::error::{RuntimeError, RuntimeErrorKind};
use crate::token::Token;
use crate::value::Value;

/// Contents of a variable slot.
#[derive(Clone)]
enum Binding {
    /// Declared with `var x;` and not yet assigned; distinct from `nil`.
    Uninitialized,
    Value(Value),
}

pub struct Environment {
    values: HashMap<String, Binding>,
    enclosing: Option<Rc<RefCell<Environment>>>,
}

impl fmt::Debug for Environment {
    // Values may hold closures pointing back at this frame.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.values.keys().collect();
        names.sort();

        f.debug_struct("Environment")
            .field("names", &names)
            .field("has_enclosing", &self.enclosing.is_some())
            .finish()
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    /// A root (global) frame.
    pub fn new() -> Self {
        Environment {
            values: HashMap::new(),
            enclosing: None,
        }
    }

    pub fn with_enclosing(enclosing: Rc<RefCell<Environment>>) -> Self {
        Environment {
            values: HashMap::new(),
            enclosing: Some(enclosing),
        }
    }

    /// Convenience for `Rc::new(RefCell::new(Environment::with_enclosing(..)))`.
    pub fn nested(enclosing: &Rc<RefCell<Environment>>) -> Rc<RefCell<Environment>> {
        Rc::new(RefCell::new(Environment::with_enclosing(Rc::clone(
            enclosing,
        ))))
    }

    /// Bind `name` in this frame, shadowing nothing outside it.
    pub fn define(&mut self, name: &str, value: Value) {
        trace!("define '{}'", name);

        self.values.insert(name.to_string(), Binding::Value(value));
    }

    /// Bind `name` to the uninitialized sentinel.
    pub fn declare(&mut self, name: &str) {
        trace!("declare '{}' (uninitialized)", name);

        self.values.insert(name.to_string(), Binding::Uninitialized);
    }

    /// Value bound in this frame only, skipping uninitialized slots.
    pub fn get_local(&self, name: &str) -> Option<Value> {
        match self.values.get(name) {
            Some(Binding::Value(v)) => Some(v.clone()),
            _ => None,
        }
    }

    /// Dynamic lookup: search this frame, then each enclosing one.
    pub fn get(&self, name: &Token) -> Result<Value, RuntimeError> {
        match self.values.get(&name.lexeme) {
            Some(binding) => read(binding, name),
            None => match &self.enclosing {
                Some(enclosing) => enclosing.borrow().get(name),
                None => Err(RuntimeError::new(
                    name,
                    RuntimeErrorKind::UndefinedVariable(name.lexeme.clone()),
                )),
            },
        }
    }

    /// Dynamic assignment to the nearest frame that binds `name`.
    pub fn assign(&mut self, name: &Token, value: Value) -> Result<(), RuntimeError> {
        if let Some(slot) = self.values.get_mut(&name.lexeme) {
            *slot = Binding::Value(value);
            return Ok(());
        }

        match &self.enclosing {
            Some(enclosing) => enclosing.borrow_mut().assign(name, value),
            None => Err(RuntimeError::new(
                name,
                RuntimeErrorKind::UndefinedVariable(name.lexeme.clone()),
            )),
        }
    }

    /// The frame exactly `distance` links up the chain.
    ///
    /// Falls back to the outermost frame if the chain is shorter, which only
    /// happens when resolver output and runtime frames disagree.
    pub fn ancestor(env: &Rc<RefCell<Environment>>, distance: usize) -> Rc<RefCell<Environment>> {
        let mut current: Rc<RefCell<Environment>> = Rc::clone(env);

        for _ in 0..distance {
            let next = match current.borrow().enclosing.as_ref() {
                Some(parent) => Rc::clone(parent),
                None => break,
            };
            current = next;
        }

        current
    }

    /// Resolved lookup in the frame `distance` links up.
    pub fn get_at(
        env: &Rc<RefCell<Environment>>,
        distance: usize,
        name: &Token,
    ) -> Result<Value, RuntimeError> {
        let frame = Self::ancestor(env, distance);
        let frame = frame.borrow();

        match frame.values.get(&name.lexeme) {
            Some(binding) => read(binding, name),
            None => Err(RuntimeError::new(
                name,
                RuntimeErrorKind::UndefinedVariable(name.lexeme.clone()),
            )),
        }
    }

    /// Resolved assignment in the frame `distance` links up.
    pub fn assign_at(env: &Rc<RefCell<Environment>>, distance: usize, name: &Token, value: Value) {
        Self::ancestor(env, distance)
            .borrow_mut()
            .values
            .insert(name.lexeme.clone(), Binding::Value(value));
    }
}

fn read(binding: &Binding, name: &Token) -> Result<Value, RuntimeError> {
    match binding {
        Binding::Value(v) => Ok(v.clone()),
        Binding::Uninitialized => Err(RuntimeError::new(
            name,
            RuntimeErrorKind::UninitializedVariable(name.lexeme.clone()),
        )),
    }
}
