//! Classes and instances.
//!
//! A class doubles as an instance of its (implicit) metaclass: it owns a
//! field map and a table of static methods, and property access on a class
//! value goes through the same fields-then-methods lookup as on an instance.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use log::debug;

use crate::error::{RuntimeError, RuntimeErrorKind};
use crate::function::LoxFunction;
use crate::interpreter::Interpreter;
use crate::token::Token;
use crate::value::Value;

pub const INITIALIZER: &str = "init";

pub struct LoxClass {
    pub name: String,
    superclass: Option<Rc<LoxClass>>,
    methods: HashMap<String, Rc<LoxFunction>>,
    /// The metaclass's method table.
    class_methods: HashMap<String, Rc<LoxFunction>>,
    fields: RefCell<HashMap<String, Value>>,
}

impl fmt::Debug for LoxClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<&String> = self.methods.keys().collect();
        methods.sort();
        let mut class_methods: Vec<&String> = self.class_methods.keys().collect();
        class_methods.sort();

        f.debug_struct("LoxClass")
            .field("name", &self.name)
            .field(
                "superclass",
                &self.superclass.as_ref().map(|c| c.name.clone()),
            )
            .field("methods", &methods)
            .field("class_methods", &class_methods)
            .finish()
    }
}

impl LoxClass {
    pub fn new(
        name: String,
        superclass: Option<Rc<LoxClass>>,
        methods: HashMap<String, Rc<LoxFunction>>,
        class_methods: HashMap<String, Rc<LoxFunction>>,
    ) -> Self {
        LoxClass {
            name,
            superclass,
            methods,
            class_methods,
            fields: RefCell::new(HashMap::new()),
        }
    }

    /// Instance method lookup; the closest ancestor wins.
    pub fn find_method(&self, name: &str) -> Option<Rc<LoxFunction>> {
        self.methods.get(name).cloned().or_else(|| {
            self.superclass
                .as_ref()
                .and_then(|superclass| superclass.find_method(name))
        })
    }

    /// Static method lookup. A metaclass inherits from the superclass's
    /// metaclass, so this walks the same chain.
    pub fn find_class_method(&self, name: &str) -> Option<Rc<LoxFunction>> {
        self.class_methods.get(name).cloned().or_else(|| {
            self.superclass
                .as_ref()
                .and_then(|superclass| superclass.find_class_method(name))
        })
    }

    /// Arity of the initializer, or zero without one.
    pub fn arity(&self) -> usize {
        self.find_method(INITIALIZER).map_or(0, |init| init.arity())
    }

    /// Calling a class: allocate an instance and run `init` on it, if any.
    pub fn instantiate(
        class: &Rc<LoxClass>,
        interpreter: &mut Interpreter,
        arguments: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        debug!("Instantiating class '{}'", class.name);

        let instance = Value::Instance(Rc::new(LoxInstance::new(Rc::clone(class))));

        if let Some(initializer) = class.find_method(INITIALIZER) {
            initializer
                .bind(instance.clone())
                .call(interpreter, arguments)?;
        }

        Ok(instance)
    }

    /// Property read on the class object itself: own fields, then static
    /// methods bound with `this` = the class.
    pub fn get(class: &Rc<LoxClass>, name: &Token) -> Result<Value, RuntimeError> {
        if let Some(value) = class.fields.borrow().get(&name.lexeme) {
            return Ok(value.clone());
        }

        match class.find_class_method(&name.lexeme) {
            Some(method) => Ok(Value::function(
                method.bind(Value::class(Rc::clone(class))),
            )),
            None => Err(RuntimeError::new(
                name,
                RuntimeErrorKind::UndefinedProperty(name.lexeme.clone()),
            )),
        }
    }

    pub fn set(&self, name: &Token, value: Value) {
        self.fields.borrow_mut().insert(name.lexeme.clone(), value);
    }
}

pub struct LoxInstance {
    class: Rc<LoxClass>,
    fields: RefCell<HashMap<String, Value>>,
}

impl fmt::Debug for LoxInstance {
    // Field values can reference this instance again, so only names are shown.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = self.fields.borrow();
        let mut names: Vec<&String> = fields.keys().collect();
        names.sort();

        f.debug_struct("LoxInstance")
            .field("class", &self.class.name)
            .field("fields", &names)
            .finish()
    }
}

impl LoxInstance {
    pub fn new(class: Rc<LoxClass>) -> Self {
        LoxInstance {
            class,
            fields: RefCell::new(HashMap::new()),
        }
    }

    pub fn class(&self) -> &Rc<LoxClass> {
        &self.class
    }

    /// Fields shadow methods; a method comes back freshly bound to this
    /// instance on every access.
    pub fn get(instance: &Rc<LoxInstance>, name: &Token) -> Result<Value, RuntimeError> {
        if let Some(value) = instance.fields.borrow().get(&name.lexeme) {
            return Ok(value.clone());
        }

        match instance.class.find_method(&name.lexeme) {
            Some(method) => Ok(Value::function(
                method.bind(Value::Instance(Rc::clone(instance))),
            )),
            None => Err(RuntimeError::new(
                name,
                RuntimeErrorKind::UndefinedProperty(name.lexeme.clone()),
            )),
        }
    }

    pub fn set(&self, name: &Token, value: Value) {
        self.fields.borrow_mut().insert(name.lexeme.clone(), value);
    }
}
