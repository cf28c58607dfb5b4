//! One‑pass, streaming lexer for Lox source text.
//!
//! [`Scanner`] borrows the source and yields owned [`Token`]s, skipping
//! whitespace and `//` comments, and always finishing with exactly one `EOF`.
//! A bad character or an unterminated string is yielded as an `Err` in place
//! and scanning carries on, so one pass surfaces every lexical error.
//!
//! Keywords come from a compile‑time perfect hash (`phf`); line comments are
//! skipped with `memchr`.

use std::iter::FusedIterator;

use log::{debug, info};
use memchr::memchr;
use phf::phf_map;

use crate::error::{LoxError, Result};
use crate::token::{Literal, Token, TokenType};

static KEYWORDS: phf::Map<&'static str, TokenType> = phf_map! {
    "and"    => TokenType::AND,
    "break"  => TokenType::BREAK,
    "class"  => TokenType::CLASS,
    "else"   => TokenType::ELSE,
    "false"  => TokenType::FALSE,
    "for"    => TokenType::FOR,
    "fun"    => TokenType::FUN,
    "if"     => TokenType::IF,
    "nil"    => TokenType::NIL,
    "or"     => TokenType::OR,
    "print"  => TokenType::PRINT,
    "return" => TokenType::RETURN,
    "super"  => TokenType::SUPER,
    "this"   => TokenType::THIS,
    "true"   => TokenType::TRUE,
    "var"    => TokenType::VAR,
    "while"  => TokenType::WHILE,
};

/// Scans `src` to completion, returning every token (always ending in `EOF`)
/// together with every lexical error encountered along the way.
pub fn scan(src: &str) -> (Vec<Token>, Vec<LoxError>) {
    let mut tokens: Vec<Token> = Vec::new();
    let mut errors: Vec<LoxError> = Vec::new();

    for result in Scanner::new(src) {
        match result {
            Ok(token) => tokens.push(token),
            Err(e) => errors.push(e),
        }
    }

    debug!(
        "Scanned {} token(s) with {} error(s)",
        tokens.len(),
        errors.len()
    );

    (tokens, errors)
}

pub struct Scanner<'a> {
    text: &'a str,
    start: usize,   // first byte of the lexeme being scanned
    current: usize, // next byte to examine
    line: usize,
    done: bool, // EOF has been handed out
}

/// What one step of the scanner found.
enum Lexeme {
    Token(TokenType, Option<Literal>),
    Skip,
}

impl<'a> Scanner<'a> {
    pub fn new(src: &'a str) -> Self {
        info!("Scanner created over {} bytes", src.len());

        Scanner {
            text: src,
            start: 0,
            current: 0,
            line: 1,
            done: false,
        }
    }

    #[inline]
    fn bytes(&self) -> &'a [u8] {
        self.text.as_bytes()
    }

    #[inline]
    fn is_at_end(&self) -> bool {
        self.current >= self.text.len()
    }

    /// Byte `offset` positions ahead of `current`, or `0` past the end.
    #[inline]
    fn peek_at(&self, offset: usize) -> u8 {
        self.bytes()
            .get(self.current + offset)
            .copied()
            .unwrap_or(0)
    }

    #[inline]
    fn bump(&mut self) -> u8 {
        let b: u8 = self.peek_at(0);
        self.current += 1;
        b
    }

    /// `long` if the next byte is `=`, consuming it, else `short`.
    #[inline]
    fn pick(&mut self, long: TokenType, short: TokenType) -> TokenType {
        if self.peek_at(0) == b'=' {
            self.current += 1;
            long
        } else {
            short
        }
    }

    fn lexeme(&self) -> &'a str {
        &self.text[self.start..self.current]
    }

    fn scan_lexeme(&mut self) -> Result<Lexeme> {
        use TokenType::*;

        let token_type: TokenType = match self.bump() {
            b'(' => LEFT_PAREN,
            b')' => RIGHT_PAREN,
            b'{' => LEFT_BRACE,
            b'}' => RIGHT_BRACE,
            b',' => COMMA,
            b'.' => DOT,
            b'-' => MINUS,
            b'+' => PLUS,
            b';' => SEMICOLON,
            b'*' => STAR,
            b'?' => QUESTION,
            b':' => COLON,
            b'!' => self.pick(BANG_EQUAL, BANG),
            b'=' => self.pick(EQUAL_EQUAL, EQUAL),
            b'<' => self.pick(LESS_EQUAL, LESS),
            b'>' => self.pick(GREATER_EQUAL, GREATER),

            b'/' if self.peek_at(0) == b'/' => {
                // Stop on the newline so the line counter still sees it.
                let rest: &[u8] = &self.bytes()[self.current..];
                self.current += memchr(b'\n', rest).unwrap_or(rest.len());
                return Ok(Lexeme::Skip);
            }
            b'/' => SLASH,

            b' ' | b'\r' | b'\t' => return Ok(Lexeme::Skip),
            b'\n' => {
                self.line += 1;
                return Ok(Lexeme::Skip);
            }

            b'"' => return self.string(),
            b'0'..=b'9' => return Ok(self.number()),
            b if b.is_ascii_alphabetic() || b == b'_' => self.identifier(),

            _ => {
                // Report a multi-byte character once, not once per byte.
                let ch: char = self.text[self.start..]
                    .chars()
                    .next()
                    .unwrap_or(char::REPLACEMENT_CHARACTER);
                self.current = self.start + ch.len_utf8();

                return Err(LoxError::lex(
                    self.line,
                    format!("Unexpected character: {}", ch),
                ));
            }
        };

        Ok(Lexeme::Token(token_type, None))
    }

    /// String literals may span lines and have no escapes.
    fn string(&mut self) -> Result<Lexeme> {
        loop {
            match self.peek_at(0) {
                _ if self.is_at_end() => {
                    return Err(LoxError::lex(self.line, "Unterminated string."))
                }
                b'"' => break,
                b'\n' => self.line += 1,
                _ => {}
            }
            self.current += 1;
        }

        self.current += 1;

        let value: &str = &self.text[self.start + 1..self.current - 1];

        Ok(Lexeme::Token(
            TokenType::STRING,
            Some(Literal::Str(value.to_owned())),
        ))
    }

    fn number(&mut self) -> Lexeme {
        self.skip_digits();

        if self.peek_at(0) == b'.' && self.peek_at(1).is_ascii_digit() {
            self.current += 1;
            self.skip_digits();
        }

        // Only ASCII digits with at most one interior dot reach here.
        let value: f64 = self.lexeme().parse().unwrap_or_default();

        Lexeme::Token(TokenType::NUMBER, Some(Literal::Number(value)))
    }

    fn skip_digits(&mut self) {
        while self.peek_at(0).is_ascii_digit() {
            self.current += 1;
        }
    }

    fn identifier(&mut self) -> TokenType {
        while matches!(self.peek_at(0), b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_') {
            self.current += 1;
        }

        KEYWORDS
            .get(self.lexeme())
            .copied()
            .unwrap_or(TokenType::IDENTIFIER)
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Result<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        while !self.is_at_end() {
            self.start = self.current;

            match self.scan_lexeme() {
                Ok(Lexeme::Skip) => continue,
                Ok(Lexeme::Token(token_type, literal)) => {
                    return Some(Ok(Token::new(
                        token_type,
                        self.lexeme(),
                        literal,
                        self.line,
                    )));
                }
                Err(e) => {
                    debug!("Lexical error: {}", e);
                    return Some(Err(e));
                }
            }
        }

        self.done = true;
        Some(Ok(Token::eof(self.line)))
    }
}

impl<'a> FusedIterator for Scanner<'a> {}
