use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{self, Write};
use std::rc::Rc;

use log::{debug, info, trace};

use crate::ast::{Expr, ExprId, LiteralValue, Method, Stmt};
use crate::class::{LoxClass, LoxInstance, INITIALIZER};
use crate::environment::Environment;
use crate::error::{RuntimeError, RuntimeErrorKind};
use crate::function::{self, LoxFunction};
use crate::token::{Token, TokenType};
use crate::value::{Callable, Value};

/// How a statement finished. `return` and `break` unwind through this
/// instead of through the error channel.
#[derive(Debug, Clone)]
pub enum Flow {
    Normal,
    Return(Value),
    Break,
}

/// Convenient alias for interpreter results.
pub type IResult<T> = Result<T, RuntimeError>;

/// Deepest chain of nested Lox calls before a `StackOverflow` error.
pub const MAX_CALL_DEPTH: usize = 5_000;

/// Remaining native stack below which a call runs on a freshly grown segment.
const RED_ZONE: usize = 100 * 1024;

/// Size of each grown stack segment.
const STACK_PER_RECURSION: usize = 1024 * 1024;

pub struct Interpreter {
    globals: Rc<RefCell<Environment>>,
    environment: Rc<RefCell<Environment>>,
    /// Resolver output: scope distance per resolved expression.
    locals: HashMap<ExprId, usize>,
    /// Number of Lox calls currently on the stack.
    depth: usize,
    out: Rc<RefCell<dyn Write>>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// Interpreter printing to stdout.
    pub fn new() -> Self {
        Self::with_output(Rc::new(RefCell::new(io::stdout())))
    }

    /// Creates an Interpreter writing `print` output to `out` and defines
    /// native functions such as `clock`.
    pub fn with_output(out: Rc<RefCell<dyn Write>>) -> Self {
        info!("Initializing Interpreter");

        let globals = Rc::new(RefCell::new(Environment::new()));

        debug!("Defining native function 'clock'");

        globals.borrow_mut().define(
            "clock",
            Value::Callable(Callable::Native(Rc::new(function::clock()))),
        );

        Self {
            environment: Rc::clone(&globals),
            globals,
            locals: HashMap::new(),
            depth: 0,
            out,
        }
    }

    /// Called by the resolver for every expression bound to a local.
    pub fn note_local(&mut self, id: ExprId, depth: usize) {
        trace!("Noting {:?} at depth {}", id, depth);

        self.locals.insert(id, depth);
    }

    /// Drops bindings recorded by a resolver pass whose batch was rejected.
    pub fn forget_locals(&mut self, ids: &[ExprId]) {
        debug!("Forgetting {} local binding(s)", ids.len());

        for id in ids {
            self.locals.remove(id);
        }
    }

    /// Number of expressions currently bound to a local slot.
    pub fn local_count(&self) -> usize {
        self.locals.len()
    }

    /// Interprets a list of statements (a "program") against the global
    /// environment. The first runtime error aborts the rest of the batch.
    pub fn interpret(&mut self, statements: &[Stmt]) -> IResult<()> {
        debug!(
            "Interpreting {} statements with {} resolved local(s)",
            statements.len(),
            self.local_count()
        );

        for stmt in statements {
            if let flow @ (Flow::Return(_) | Flow::Break) = self.execute(stmt)? {
                debug!("Ignoring top-level {:?}", flow);
            }
        }

        info!("Interpretation completed successfully");

        Ok(())
    }

    /// Executes a single statement.
    pub fn execute(&mut self, stmt: &Stmt) -> IResult<Flow> {
        match stmt {
            Stmt::Expression(expr) => {
                self.evaluate(expr)?;
                Ok(Flow::Normal)
            }

            Stmt::Print(expr) => {
                let value = self.evaluate(expr)?;
                writeln!(self.out.borrow_mut(), "{}", value).map_err(|e| RuntimeError {
                    line: expr.line().unwrap_or(0),
                    kind: RuntimeErrorKind::Output(e.to_string()),
                })?;
                Ok(Flow::Normal)
            }

            Stmt::Var { name, initializer } => {
                match initializer {
                    Some(expr) => {
                        let value = self.evaluate(expr)?;
                        debug!("Defining variable '{}' = {}", name.lexeme, value);
                        self.environment.borrow_mut().define(&name.lexeme, value);
                    }
                    None => self.environment.borrow_mut().declare(&name.lexeme),
                }
                Ok(Flow::Normal)
            }

            Stmt::Block(statements) => {
                let environment = Environment::nested(&self.environment);
                self.execute_block(statements, environment)
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.execute(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.execute(else_branch)
                } else {
                    Ok(Flow::Normal)
                }
            }

            Stmt::While { condition, body } => {
                while self.evaluate(condition)?.is_truthy() {
                    match self.execute(body)? {
                        Flow::Normal => {}
                        Flow::Break => break,
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }

            Stmt::Break(_) => Ok(Flow::Break),

            Stmt::Function { name, function } => {
                debug!("Defining function '{}'", name.lexeme);
                let function = LoxFunction::new(
                    Some(name.lexeme.clone()),
                    Rc::clone(function),
                    Rc::clone(&self.environment),
                    false,
                );
                self.environment
                    .borrow_mut()
                    .define(&name.lexeme, Value::function(function));
                Ok(Flow::Normal)
            }

            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };
                Ok(Flow::Return(value))
            }

            Stmt::Class {
                name,
                superclass,
                methods,
            } => self.execute_class(name, superclass.as_ref(), methods),
        }
    }

    /// Runs `statements` in `environment`, restoring the previous scope on
    /// every exit path.
    pub fn execute_block(
        &mut self,
        statements: &[Stmt],
        environment: Rc<RefCell<Environment>>,
    ) -> IResult<Flow> {
        let previous = std::mem::replace(&mut self.environment, environment);

        let mut result: IResult<Flow> = Ok(Flow::Normal);
        for stmt in statements {
            match self.execute(stmt) {
                Ok(Flow::Normal) => {}
                other => {
                    result = other;
                    break;
                }
            }
        }

        self.environment = previous;
        result
    }

    fn execute_class(
        &mut self,
        name: &Token,
        superclass: Option<&Expr>,
        methods: &[Method],
    ) -> IResult<Flow> {
        debug!("Defining class '{}'", name.lexeme);

        let superclass: Option<Rc<LoxClass>> = match superclass {
            Some(expr) => match self.evaluate(expr)? {
                Value::Callable(Callable::Class(class)) => Some(class),
                _ => {
                    let token = match expr {
                        Expr::Variable { name, .. } => name,
                        _ => name,
                    };
                    return Err(RuntimeError::new(
                        token,
                        RuntimeErrorKind::SuperclassNotClass,
                    ));
                }
            },
            None => None,
        };

        self.environment
            .borrow_mut()
            .define(&name.lexeme, Value::Nil);

        // Methods close over a short-lived frame holding `super`.
        let method_env = match &superclass {
            Some(class) => {
                let env = Environment::nested(&self.environment);
                env.borrow_mut()
                    .define("super", Value::class(Rc::clone(class)));
                env
            }
            None => Rc::clone(&self.environment),
        };

        let mut instance_methods: HashMap<String, Rc<LoxFunction>> = HashMap::new();
        let mut class_methods: HashMap<String, Rc<LoxFunction>> = HashMap::new();

        for method in methods {
            let is_initializer = !method.is_class_method && method.name.lexeme == INITIALIZER;
            let function = Rc::new(LoxFunction::new(
                Some(method.name.lexeme.clone()),
                Rc::clone(&method.function),
                Rc::clone(&method_env),
                is_initializer,
            ));

            if method.is_class_method {
                class_methods.insert(method.name.lexeme.clone(), function);
            } else {
                instance_methods.insert(method.name.lexeme.clone(), function);
            }
        }

        let class = LoxClass::new(
            name.lexeme.clone(),
            superclass,
            instance_methods,
            class_methods,
        );

        self.environment
            .borrow_mut()
            .define(&name.lexeme, Value::class(Rc::new(class)));

        Ok(Flow::Normal)
    }

    /// Evaluates an expression and returns a Value.
    pub fn evaluate(&mut self, expr: &Expr) -> IResult<Value> {
        match expr {
            Expr::Literal(literal) => Ok(match literal {
                LiteralValue::Number(n) => Value::Number(*n),
                LiteralValue::Str(s) => Value::String(s.clone()),
                LiteralValue::True => Value::Bool(true),
                LiteralValue::False => Value::Bool(false),
                LiteralValue::Nil => Value::Nil,
            }),

            Expr::Grouping(inner) => self.evaluate(inner),

            Expr::Unary { operator, right } => self.evaluate_unary(operator, right),

            Expr::Binary {
                left,
                operator,
                right,
            } => self.evaluate_binary(left, operator, right),

            Expr::Logical {
                left,
                operator,
                right,
            } => {
                let left = self.evaluate(left)?;

                let short_circuit = if operator.token_type == TokenType::OR {
                    left.is_truthy()
                } else {
                    !left.is_truthy()
                };

                if short_circuit {
                    Ok(left)
                } else {
                    self.evaluate(right)
                }
            }

            Expr::Ternary {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.evaluate(then_branch)
                } else {
                    self.evaluate(else_branch)
                }
            }

            Expr::Variable { id, name } => self.look_up_variable(*id, name),

            Expr::Assign { id, name, value } => {
                let value = self.evaluate(value)?;

                match self.locals.get(id) {
                    Some(&distance) => {
                        Environment::assign_at(&self.environment, distance, name, value.clone())
                    }
                    None => self.assign_unresolved(name, value.clone())?,
                }

                Ok(value)
            }

            Expr::Call {
                callee,
                paren,
                arguments,
            } => {
                let callee = self.evaluate(callee)?;

                let arguments = arguments
                    .iter()
                    .map(|argument| self.evaluate(argument))
                    .collect::<IResult<Vec<Value>>>()?;

                self.call_value(callee, paren, arguments)
            }

            Expr::Get { object, name } => match self.evaluate(object)? {
                Value::Instance(instance) => LoxInstance::get(&instance, name),
                Value::Callable(Callable::Class(class)) => LoxClass::get(&class, name),
                _ => Err(RuntimeError::new(
                    name,
                    RuntimeErrorKind::PropertyOnNonInstance,
                )),
            },

            Expr::Set {
                object,
                name,
                value,
            } => match self.evaluate(object)? {
                Value::Instance(instance) => {
                    let value = self.evaluate(value)?;
                    instance.set(name, value.clone());
                    Ok(value)
                }
                Value::Callable(Callable::Class(class)) => {
                    let value = self.evaluate(value)?;
                    class.set(name, value.clone());
                    Ok(value)
                }
                _ => Err(RuntimeError::new(
                    name,
                    RuntimeErrorKind::FieldOnNonInstance,
                )),
            },

            Expr::Function(declaration) => Ok(Value::function(LoxFunction::new(
                None,
                Rc::clone(declaration),
                Rc::clone(&self.environment),
                false,
            ))),

            Expr::This { id, keyword } => self.look_up_variable(*id, keyword),

            Expr::Super {
                id,
                keyword,
                method,
            } => self.evaluate_super(*id, keyword, method),
        }
    }

    fn evaluate_unary(&mut self, operator: &Token, right: &Expr) -> IResult<Value> {
        let right = self.evaluate(right)?;

        match operator.token_type {
            TokenType::MINUS => match right {
                Value::Number(n) => Ok(Value::Number(-n)),
                _ => Err(RuntimeError::new(
                    operator,
                    RuntimeErrorKind::OperandNotNumber,
                )),
            },
            TokenType::BANG => Ok(Value::Bool(!right.is_truthy())),
            _ => Err(RuntimeError::new(
                operator,
                RuntimeErrorKind::InvalidOperator(operator.lexeme.clone()),
            )),
        }
    }

    fn evaluate_binary(&mut self, left: &Expr, operator: &Token, right: &Expr) -> IResult<Value> {
        let left = self.evaluate(left)?;
        let right = self.evaluate(right)?;

        match operator.token_type {
            TokenType::PLUS => add(operator, left, right),

            TokenType::MINUS => {
                let (a, b) = number_operands(operator, &left, &right)?;
                Ok(Value::Number(a - b))
            }

            TokenType::STAR => {
                let (a, b) = number_operands(operator, &left, &right)?;
                Ok(Value::Number(a * b))
            }

            TokenType::SLASH => {
                let (a, b) = number_operands(operator, &left, &right)?;
                if b == 0.0 {
                    return Err(RuntimeError::new(
                        operator,
                        RuntimeErrorKind::DivisionByZero,
                    ));
                }
                Ok(Value::Number(a / b))
            }

            TokenType::GREATER => {
                let (a, b) = number_operands(operator, &left, &right)?;
                Ok(Value::Bool(a > b))
            }

            TokenType::GREATER_EQUAL => {
                let (a, b) = number_operands(operator, &left, &right)?;
                Ok(Value::Bool(a >= b))
            }

            TokenType::LESS => {
                let (a, b) = number_operands(operator, &left, &right)?;
                Ok(Value::Bool(a < b))
            }

            TokenType::LESS_EQUAL => {
                let (a, b) = number_operands(operator, &left, &right)?;
                Ok(Value::Bool(a <= b))
            }

            TokenType::EQUAL_EQUAL => Ok(Value::Bool(left == right)),

            TokenType::BANG_EQUAL => Ok(Value::Bool(left != right)),

            _ => Err(RuntimeError::new(
                operator,
                RuntimeErrorKind::InvalidOperator(operator.lexeme.clone()),
            )),
        }
    }

    /// `super.method`: the superclass comes from the frame the class
    /// declaration installed, the receiver from the `this` frame just below.
    /// Unresolved trees fall back to a dynamic walk from the current frame.
    fn evaluate_super(&mut self, id: ExprId, keyword: &Token, method: &Token) -> IResult<Value> {
        let this = Token::new(TokenType::THIS, "this", None, keyword.line);

        let (superclass, receiver): (Value, Value) = match self.locals.get(&id) {
            Some(&distance) => (
                Environment::get_at(&self.environment, distance, keyword)?,
                Environment::get_at(&self.environment, distance.saturating_sub(1), &this)?,
            ),
            None => (
                self.environment.borrow().get(keyword)?,
                self.environment.borrow().get(&this)?,
            ),
        };

        let superclass: Rc<LoxClass> = match superclass {
            Value::Callable(Callable::Class(class)) => class,
            _ => {
                return Err(RuntimeError::new(
                    keyword,
                    RuntimeErrorKind::SuperclassNotClass,
                ))
            }
        };

        // Inside a static method the receiver is the class itself.
        let found = match &receiver {
            Value::Callable(Callable::Class(_)) => superclass.find_class_method(&method.lexeme),
            _ => superclass.find_method(&method.lexeme),
        };

        match found {
            Some(function) => Ok(Value::function(function.bind(receiver))),
            None => Err(RuntimeError::new(
                method,
                RuntimeErrorKind::UndefinedProperty(method.lexeme.clone()),
            )),
        }
    }

    fn look_up_variable(&self, id: ExprId, name: &Token) -> IResult<Value> {
        match self.locals.get(&id) {
            Some(&distance) => Environment::get_at(&self.environment, distance, name),
            None => {
                let global: IResult<Value> = self.globals.borrow().get(name);
                match global {
                    Err(RuntimeError {
                        kind: RuntimeErrorKind::UndefinedVariable(_),
                        ..
                    }) => {
                        trace!("'{}' not global, walking the scope chain", name.lexeme);
                        self.environment.borrow().get(name)
                    }
                    other => other,
                }
            }
        }
    }

    /// Globals first, then the dynamic chain for trees that skipped the resolver.
    fn assign_unresolved(&self, name: &Token, value: Value) -> IResult<()> {
        let global: IResult<()> = self.globals.borrow_mut().assign(name, value.clone());
        match global {
            Err(RuntimeError {
                kind: RuntimeErrorKind::UndefinedVariable(_),
                ..
            }) => {
                trace!("'{}' not global, walking the scope chain", name.lexeme);
                self.environment.borrow_mut().assign(name, value)
            }
            other => other,
        }
    }

    fn call_value(&mut self, callee: Value, paren: &Token, arguments: Vec<Value>) -> IResult<Value> {
        let Value::Callable(callable) = callee else {
            return Err(RuntimeError::new(paren, RuntimeErrorKind::NotCallable));
        };

        let arity = callable.arity();
        if arguments.len() != arity {
            return Err(RuntimeError::new(
                paren,
                RuntimeErrorKind::ArityMismatch {
                    expected: arity,
                    got: arguments.len(),
                },
            ));
        }

        if self.depth >= MAX_CALL_DEPTH {
            return Err(RuntimeError::new(paren, RuntimeErrorKind::StackOverflow));
        }

        self.depth += 1;
        let result: IResult<Value> = stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, || {
            callable.call(self, paren, arguments)
        });
        self.depth -= 1;

        result
    }
}

/// Checks each operand separately so the error names the offending side.
fn number_operands(operator: &Token, left: &Value, right: &Value) -> IResult<(f64, f64)> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => Ok((*a, *b)),
        (Value::Number(_), _) => Err(RuntimeError::new(
            operator,
            RuntimeErrorKind::RightOperandNotNumber,
        )),
        _ => Err(RuntimeError::new(
            operator,
            RuntimeErrorKind::LeftOperandNotNumber,
        )),
    }
}

/// `+` adds numbers; if either side is a string the other is stringified
/// and concatenated.
fn add(operator: &Token, left: Value, right: Value) -> IResult<Value> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
        (Value::String(a), other) => Ok(Value::String(format!("{}{}", a, other))),
        (other, Value::String(b)) => Ok(Value::String(format!("{}{}", other, b))),
        _ => Err(RuntimeError::new(
            operator,
            RuntimeErrorKind::InvalidAddition,
        )),
    }
}
