pub mod ast;
pub mod ast_printer;
pub mod class;
pub mod environment;
pub mod error;
pub mod function;
pub mod interpreter;
pub mod parser;
pub mod resolver;
pub mod scanner;
pub mod token;
pub mod value;

use std::cell::RefCell;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;
use std::rc::Rc;

use log::{debug, info};

use crate::ast::Stmt;
use crate::error::{LoxError, Result};
use crate::interpreter::Interpreter;
use crate::parser::Parser;
use crate::resolver::Resolver;

/// Reads a whole script into memory. Missing files and invalid UTF-8 come
/// back as [`LoxError::Io`] and [`LoxError::Utf8`].
pub fn read_source(path: impl AsRef<Path>) -> Result<String> {
    let path: &Path = path.as_ref();
    info!("Reading file: {:?}", path);

    let mut reader = BufReader::new(File::open(path)?);
    let mut buf: Vec<u8> = Vec::new();
    let bytes: usize = reader.read_to_end(&mut buf)?;

    info!("Read {} bytes from {:?}", bytes, path);

    Ok(String::from_utf8(buf)?)
}

/// One interpreter session: a single global environment that persists
/// across every batch fed to it.
pub struct Lox {
    interpreter: Interpreter,
}

impl Default for Lox {
    fn default() -> Self {
        Self::new()
    }
}

impl Lox {
    /// Session printing to stdout.
    pub fn new() -> Self {
        Lox {
            interpreter: Interpreter::new(),
        }
    }

    pub fn with_output(out: Rc<RefCell<dyn Write>>) -> Self {
        Lox {
            interpreter: Interpreter::with_output(out),
        }
    }

    /// Run `source` as one program.
    pub fn run(&mut self, source: &str) -> Result<()> {
        self.run_batch(source, false)
    }

    /// Read and run the script at `path`.
    pub fn run_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let source: String = read_source(path)?;
        self.run(&source)
    }

    /// Run one REPL line; a trailing expression without `;` is printed.
    pub fn run_interactive(&mut self, source: &str) -> Result<()> {
        self.run_batch(source, true)
    }

    /// Scan, parse and resolve `source` without running it. Every
    /// diagnostic is returned at once, ordered by line.
    pub fn check(&mut self, source: &str, interactive: bool) -> Result<Vec<Stmt>> {
        let (tokens, mut errors) = scanner::scan(source);

        let mut parser = Parser::new(tokens).interactive(interactive);
        let statements: Vec<Stmt> = parser.parse();
        errors.extend(parser.into_errors());

        if !errors.is_empty() {
            errors.sort_by_key(|e| e.line().unwrap_or(0));
            return Err(LoxError::Rejected(errors));
        }

        let errors: Vec<LoxError> = Resolver::new(&mut self.interpreter).resolve(&statements);
        if !errors.is_empty() {
            return Err(LoxError::Rejected(errors));
        }

        Ok(statements)
    }

    fn run_batch(&mut self, source: &str, interactive: bool) -> Result<()> {
        info!(
            "Running {} bytes ({})",
            source.len(),
            if interactive { "interactive" } else { "batch" }
        );

        let statements: Vec<Stmt> = self.check(source, interactive)?;

        debug!("Executing {} statement(s)", statements.len());

        self.interpreter.interpret(&statements)?;

        Ok(())
    }
}
