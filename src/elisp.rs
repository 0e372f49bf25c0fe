//! Reader for the Emacs Lisp printed forms org-roam stores in its database.
//!
//! Every column org-roam writes goes through `prin1`, so a title is stored as
//! `"\"My title\""`, a property alist as `(("ID" . "abc") ("CATEGORY" . "x"))`
//! and a timestamp as `(25821 50943 0 0)`. This module tokenizes and parses
//! those forms into [`Expr`] trees; [`values`] turns trees into Rust values.

pub mod values;

use std::fmt;

use thiserror::Error;

/// Errors raised while reading or interpreting an Elisp form.
#[derive(Debug, Error, PartialEq)]
pub enum ElispError {
    #[error("unexpected end of input at byte {position}")]
    UnexpectedEof { position: usize },

    #[error("unexpected '{found}' at byte {position}")]
    Unexpected { found: String, position: usize },

    #[error("unterminated string starting at byte {position}")]
    UnterminatedString { position: usize },

    #[error("invalid dotted pair at byte {position}")]
    InvalidDottedPair { position: usize },

    #[error("no expression found")]
    Empty,

    #[error("expected {expected}, got {found}")]
    Type {
        expected: &'static str,
        found: String,
    },
}

/// A parsed Elisp expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Symbol(String),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Expr>),
    Cons(Box<Expr>, Box<Expr>),
    Quoted(Box<Expr>),
}

impl Expr {
    /// Short description used in type errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Expr::Symbol(_) => "symbol",
            Expr::Int(_) => "integer",
            Expr::Float(_) => "float",
            Expr::Str(_) => "string",
            Expr::List(_) => "list",
            Expr::Cons(_, _) => "dotted pair",
            Expr::Quoted(_) => "quoted form",
        }
    }

    /// `nil` and `()` are the same object in Elisp.
    pub fn is_nil(&self) -> bool {
        match self {
            Expr::Symbol(s) => s == "nil",
            Expr::List(items) => items.is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Symbol(s) => f.write_str(s),
            Expr::Int(n) => write!(f, "{n}"),
            Expr::Float(n) => write!(f, "{n}"),
            Expr::Str(s) => write!(f, "\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
            Expr::List(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
            Expr::Cons(car, cdr) => write!(f, "({car} . {cdr})"),
            Expr::Quoted(inner) => write!(f, "'{inner}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LeftParen,
    RightParen,
    Quote,
    Dot,
    Str(String),
    Int(i64),
    Float(f64),
    Symbol(String),
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '\'' | '"' | ';')
}

fn tokenize(source: &str) -> Result<Vec<(Token, usize)>, ElispError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            ';' => {
                while let Some(&(_, c)) = chars.peek() {
                    if c == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '(' => {
                chars.next();
                tokens.push((Token::LeftParen, start));
            }
            ')' => {
                chars.next();
                tokens.push((Token::RightParen, start));
            }
            '\'' => {
                chars.next();
                tokens.push((Token::Quote, start));
            }
            '"' => {
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    match c {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.next() {
                            Some((_, 'n')) => value.push('\n'),
                            Some((_, 't')) => value.push('\t'),
                            // Escaped newline is a line continuation.
                            Some((_, '\n')) => {}
                            Some((_, other)) => value.push(other),
                            None => break,
                        },
                        other => value.push(other),
                    }
                }
                if !closed {
                    return Err(ElispError::UnterminatedString { position: start });
                }
                tokens.push((Token::Str(value), start));
            }
            _ => {
                let mut atom = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if is_delimiter(c) {
                        break;
                    }
                    atom.push(c);
                    chars.next();
                }
                tokens.push((classify_atom(atom), start));
            }
        }
    }

    Ok(tokens)
}

fn classify_atom(atom: String) -> Token {
    if atom == "." {
        return Token::Dot;
    }
    if let Ok(n) = atom.parse::<i64>() {
        return Token::Int(n);
    }
    let numeric = atom
        .trim_start_matches('-')
        .chars()
        .all(|c| c.is_ascii_digit() || c == '.');
    if numeric && atom.chars().any(|c| c.is_ascii_digit()) {
        if let Ok(n) = atom.parse::<f64>() {
            return Token::Float(n);
        }
    }
    Token::Symbol(atom)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    current: usize,
    end: usize,
}

impl Parser {
    fn position(&self) -> usize {
        self.tokens
            .get(self.current)
            .map(|(_, pos)| *pos)
            .unwrap_or(self.end)
    }

    fn advance(&mut self) -> Option<(Token, usize)> {
        let token = self.tokens.get(self.current).cloned();
        if token.is_some() {
            self.current += 1;
        }
        token
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.current).map(|(t, _)| t)
    }

    fn parse_expression(&mut self) -> Result<Expr, ElispError> {
        let position = self.position();
        let (token, pos) = self
            .advance()
            .ok_or(ElispError::UnexpectedEof { position })?;

        match token {
            Token::LeftParen => self.parse_list(),
            Token::Quote => Ok(Expr::Quoted(Box::new(self.parse_expression()?))),
            Token::Str(s) => Ok(Expr::Str(s)),
            Token::Int(n) => Ok(Expr::Int(n)),
            Token::Float(n) => Ok(Expr::Float(n)),
            Token::Symbol(s) => Ok(Expr::Symbol(s)),
            Token::RightParen => Err(ElispError::Unexpected {
                found: ")".to_string(),
                position: pos,
            }),
            Token::Dot => Err(ElispError::Unexpected {
                found: ".".to_string(),
                position: pos,
            }),
        }
    }

    fn parse_list(&mut self) -> Result<Expr, ElispError> {
        let mut elements = Vec::new();

        loop {
            match self.peek() {
                None => {
                    return Err(ElispError::UnexpectedEof {
                        position: self.end,
                    });
                }
                Some(Token::RightParen) => {
                    self.advance();
                    return Ok(Expr::List(elements));
                }
                Some(Token::Dot) => {
                    let position = self.position();
                    self.advance();
                    if elements.len() != 1 {
                        return Err(ElispError::InvalidDottedPair { position });
                    }
                    let cdr = self.parse_expression()?;
                    if self.peek() != Some(&Token::RightParen) {
                        return Err(ElispError::InvalidDottedPair {
                            position: self.position(),
                        });
                    }
                    self.advance();
                    let car = elements.pop().ok_or(ElispError::InvalidDottedPair { position })?;
                    return Ok(Expr::Cons(Box::new(car), Box::new(cdr)));
                }
                Some(_) => elements.push(self.parse_expression()?),
            }
        }
    }
}

/// Parses every top-level expression in `source`.
pub fn parse_all(source: &str) -> Result<Vec<Expr>, ElispError> {
    let mut parser = Parser {
        tokens: tokenize(source)?,
        current: 0,
        end: source.len(),
    };
    let mut expressions = Vec::new();
    while parser.current < parser.tokens.len() {
        expressions.push(parser.parse_expression()?);
    }
    Ok(expressions)
}

/// Parses the first expression in `source`.
pub fn parse_one(source: &str) -> Result<Expr, ElispError> {
    parse_all(source)?.into_iter().next().ok_or(ElispError::Empty)
}
