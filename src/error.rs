//! Centralised error hierarchy for the **Lox interpreter**.
//!
//! All subsystems (scanner, parser, resolver, runtime, CLI) convert their
//! internal failure modes into one of the variants defined here. Lexical,
//! syntax and static diagnostics are collected rather than thrown; a batch
//! carrying any of them is refused as a whole through [`LoxError::Rejected`].
//!
//! The module **does not** print diagnostics itself.

use std::fmt::Write as _;
use std::io;
use thiserror::Error;

use log::debug;

use crate::token::{Token, TokenType};

/// Canonical error type used throughout the interpreter.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoxError {
    /// Lexical (scanner) error with source line information.
    #[error("[line {line}] Error: {message}")]
    Lex {
        /// Human‑readable description.
        message: String,

        /// 1‑based line where the error occurred.
        line: usize,
    },

    /// Syntactic (parser) error.
    #[error("[line {line}] Error{location}: {message}")]
    Parse {
        message: String,
        line: usize,
        /// `" at 'x'"` or `" at end"`.
        location: String,
    },

    /// Static‑analysis failure reported by the resolver.
    #[error("[line {line}] Error{location}: {message}")]
    Resolve {
        message: String,
        line: usize,
        location: String,
    },

    /// Runtime evaluation error.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// A batch refused before execution, with every diagnostic in source order.
    #[error("{}", join_lines(.0))]
    Rejected(Vec<LoxError>),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl LoxError {
    pub fn lex<S: Into<String>>(line: usize, msg: S) -> Self {
        let message: String = msg.into();

        debug!("Creating Lex error: line={}, msg={}", line, message);

        LoxError::Lex { message, line }
    }

    pub fn parse<S: Into<String>>(token: &Token, msg: S) -> Self {
        let message: String = msg.into();

        debug!("Creating Parse error: line={}, msg={}", token.line, message);

        LoxError::Parse {
            message,
            line: token.line,
            location: location_of(token),
        }
    }

    pub fn resolve<S: Into<String>>(token: &Token, msg: S) -> Self {
        let message: String = msg.into();

        debug!("Creating Resolve error: line={}, msg={}", token.line, message);

        LoxError::Resolve {
            message,
            line: token.line,
            location: location_of(token),
        }
    }

    /// Source line of a single diagnostic; `None` for aggregates and I/O.
    pub fn line(&self) -> Option<usize> {
        match self {
            LoxError::Lex { line, .. }
            | LoxError::Parse { line, .. }
            | LoxError::Resolve { line, .. } => Some(*line),
            LoxError::Runtime(e) => Some(e.line),
            _ => None,
        }
    }

    /// Process exit status for this failure (sysexits conventions).
    pub fn exit_code(&self) -> i32 {
        match self {
            LoxError::Lex { .. }
            | LoxError::Parse { .. }
            | LoxError::Resolve { .. }
            | LoxError::Rejected(_) => 65,
            LoxError::Runtime(_) => 70,
            LoxError::Io(_) | LoxError::Utf8(_) => 74,
        }
    }
}

fn location_of(token: &Token) -> String {
    if token.token_type == TokenType::EOF {
        " at end".to_string()
    } else {
        format!(" at '{}'", token.lexeme)
    }
}

fn join_lines(errors: &[LoxError]) -> String {
    let mut out = String::new();

    for (i, e) in errors.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let _ = write!(out, "{}", e);
    }

    out
}

/// Failure raised while evaluating a program, tagged with the line of the
/// operator or identifier that triggered it.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}\n[line {line}]")]
pub struct RuntimeError {
    pub line: usize,
    pub kind: RuntimeErrorKind,
}

impl RuntimeError {
    pub fn new(token: &Token, kind: RuntimeErrorKind) -> Self {
        debug!("Runtime error at line {}: {}", token.line, kind);

        RuntimeError {
            line: token.line,
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeErrorKind {
    #[error("Undefined variable '{0}'.")]
    UndefinedVariable(String),

    #[error("Variable '{0}' is not initialized.")]
    UninitializedVariable(String),

    #[error("Operand must be a number.")]
    OperandNotNumber,

    #[error("Left operand must be a number.")]
    LeftOperandNotNumber,

    #[error("Right operand must be a number.")]
    RightOperandNotNumber,

    #[error("Operands must be two numbers or one of them must be a string.")]
    InvalidAddition,

    #[error("Division by zero.")]
    DivisionByZero,

    #[error("Can only call functions and classes.")]
    NotCallable,

    #[error("Expected {expected} arguments, but got {got}.")]
    ArityMismatch { expected: usize, got: usize },

    #[error("Only instances have properties.")]
    PropertyOnNonInstance,

    #[error("Only instances have fields.")]
    FieldOnNonInstance,

    #[error("Undefined property '{0}'.")]
    UndefinedProperty(String),

    #[error("Superclass must be a class.")]
    SuperclassNotClass,

    #[error("Stack overflow.")]
    StackOverflow,

    #[error("Invalid operator '{0}'.")]
    InvalidOperator(String),

    #[error("Native function failed: {0}")]
    Native(String),

    #[error("Could not write output: {0}")]
    Output(String),
}

/// Crate‑wide `Result` alias.
pub type Result<T> = std::result::Result<T, LoxError>;
