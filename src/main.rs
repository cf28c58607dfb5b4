use std::fs::File;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser as ClapParser, ValueEnum};
use env_logger::Builder;
use log::{debug, info};

use treelox as lox;

use lox::ast::Stmt;
use lox::ast_printer::AstPrinter;
use lox::parser::Parser;
use lox::scanner::{self, Scanner};
use lox::error::LoxError;
use lox::Lox;

#[derive(ClapParser, Debug)]
#[command(version, about = "Tree-walking Lox interpreter", long_about = None)]
pub struct Cli {
    /// Script to run; starts a REPL when omitted
    script: Option<PathBuf>,

    /// Print an intermediate form instead of running the program
    #[arg(long, value_enum)]
    emit: Option<Emit>,

    /// Enable logging to treelox.log
    #[arg(long)]
    log: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Emit {
    /// One token per line
    Tokens,
    /// Prefix form of each expression statement
    Ast,
    /// The statement list as JSON
    Json,
}

fn init_logger() -> Result<()> {
    let log_file = File::create("treelox.log").context("Failed to create treelox.log")?;

    Builder::new()
        .format(|buf, record| {
            let module = record
                .module_path()
                .unwrap_or("<unnamed>")
                .strip_prefix("treelox::")
                .unwrap_or(record.module_path().unwrap_or("<unnamed>"));
            writeln!(
                buf,
                "[{}:{}] - {}",
                module,
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .filter(None, log::LevelFilter::Debug) // Default to Debug, override with RUST_LOG
        .parse_default_env()
        .init();

    info!("Logger initialized, writing to treelox.log");
    Ok(())
}

/// Prints every token; returns false if any lexical error was reported.
fn emit_tokens(source: &str) -> bool {
    let mut tokenized = true;

    for token in Scanner::new(source) {
        match token {
            Ok(token) => println!("{}", token),
            Err(e) => {
                tokenized = false;
                debug!("Tokenization debug: {}", e);
                eprintln!("{}", e);
            }
        }
    }

    tokenized
}

/// Scans and parses without resolving; diagnostics go to stderr.
fn parse_only(source: &str) -> Option<Vec<Stmt>> {
    let (tokens, mut errors) = scanner::scan(source);
    let mut parser = Parser::new(tokens);
    let statements = parser.parse();
    errors.extend(parser.into_errors());

    if errors.is_empty() {
        return Some(statements);
    }

    errors.sort_by_key(|e| e.line().unwrap_or(0));
    for e in &errors {
        eprintln!("{}", e);
    }
    None
}

fn emit(mode: Emit, source: &str) -> Result<i32> {
    info!("Emitting {:?}", mode);

    if mode == Emit::Tokens {
        return Ok(if emit_tokens(source) { 0 } else { 65 });
    }

    let Some(statements) = parse_only(source) else {
        return Ok(65);
    };

    match mode {
        Emit::Json => {
            let json = serde_json::to_string_pretty(&statements)
                .context("Failed to serialize syntax tree")?;
            println!("{}", json);
        }
        _ => {
            let printer = AstPrinter;
            for stmt in &statements {
                if let Stmt::Expression(expr) | Stmt::Print(expr) = stmt {
                    println!("{}", printer.print(expr));
                }
            }
        }
    }

    Ok(0)
}

/// Prints a read failure and returns its exit code.
fn report_read_error(script: &Path, e: LoxError) -> i32 {
    debug!("Read debug: {:?}", e);
    eprintln!("Could not read {:?}: {}", script, e);
    e.exit_code()
}

fn run_file(script: &Path) -> i32 {
    let mut session = Lox::new();

    match session.run_file(script) {
        Err(e @ (LoxError::Io(_) | LoxError::Utf8(_))) => report_read_error(script, e),
        Ok(()) => {
            info!("Program executed successfully");
            0
        }
        Err(e) => {
            debug!("Run debug: {:?}", e);
            eprintln!("{}", e);
            e.exit_code()
        }
    }
}

fn run_prompt() -> Result<i32> {
    info!("Starting REPL");

    let mut session = Lox::new();
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("> ");
        io::stdout().flush().context("Failed to flush prompt")?;

        let Some(line) = lines.next() else {
            println!();
            break;
        };
        let line = line.context("Failed to read from stdin")?;

        if let Err(e) = session.run_interactive(&line) {
            // Errors end the line, not the session.
            debug!("REPL error: {:?}", e);
            eprintln!("{}", e);
        }
    }

    info!("REPL finished");
    Ok(0)
}

fn main() -> Result<()> {
    let args: Cli = match Cli::try_parse() {
        Ok(args) => args,
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            let _ = e.print();
            std::process::exit(64);
        }
    };

    if args.log {
        init_logger()?;
    } else {
        // Initialize a minimal logger to avoid "no logger" errors
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Off)
            .init();
    }

    info!("CLI arguments: {:?}", args);

    let code: i32 = match (args.emit, &args.script) {
        (Some(mode), Some(script)) => match lox::read_source(script) {
            Ok(source) => emit(mode, &source)?,
            Err(e) => report_read_error(script, e),
        },
        (Some(mode), None) => {
            let mut source = String::new();
            io::stdin()
                .read_to_string(&mut source)
                .context("Failed to read from stdin")?;
            emit(mode, &source)?
        }
        (None, Some(script)) => run_file(script),
        (None, None) => run_prompt()?,
    };

    if code != 0 {
        debug!("Exiting with code {}", code);
        std::process::exit(code);
    }

    Ok(())
}
