//! Query expressions
//!
//! Selects which transaction groups reach the handler.
//!
//! ## Grammar
//! ```text
//! expr    := and ("or" and)*
//! and     := unary ("and" unary)*
//! unary   := "not" unary | "(" expr ")" | cond
//! cond    := tagspec [op value]
//! tagspec := Tag["*"][":" field]
//! op      := "==" | "!=" | "<" | "<=" | ">" | ">=" | "eq" | "ne" | "~" | "!~"
//! ```
//!
//! A condition holds if any record of the group satisfies it. `:field`
//! reads header-style payloads (`Name: value`); numeric operators compare
//! the first word of the operand. `~` and `!~` take a regular expression,
//! compiled once with the query.

use regex::Regex;

use crate::error::{Result, VslError};
use crate::record::tags::{tag_index, tags_with_prefix};
use crate::record::Record;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Op {
    NumEq,
    NumNe,
    Lt,
    Le,
    Gt,
    Ge,
    StrEq,
    StrNe,
    Matches,
    NotMatches,
}

impl Op {
    fn is_numeric(self) -> bool {
        matches!(
            self,
            Op::NumEq | Op::NumNe | Op::Lt | Op::Le | Op::Gt | Op::Ge
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Str(String),
    Op(Op),
    LParen,
    RParen,
}

/// Nesting allowed for parentheses and `not`
const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone)]
struct Test {
    op: Op,
    value: String,
    number: f64,
    pattern: Option<Regex>,
}

#[derive(Debug, Clone)]
pub(crate) struct Cond {
    tags: Vec<u8>,
    field: Option<String>,
    test: Option<Test>,
}

/// Compiled query expression
#[derive(Debug, Clone)]
pub(crate) enum Expr {
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Cond(Box<Cond>),
}

impl Expr {
    /// Parse `text` into an expression
    pub fn compile(text: &str) -> Result<Expr> {
        let tokens = tokenize(text)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            text_len: text.len(),
            depth: 0,
        };
        let expr = parser.parse_or()?;
        if let Some((_, at)) = parser.peek() {
            return Err(syntax(at, "unexpected trailing input"));
        }
        Ok(expr)
    }

    /// Evaluate against the decoded records of one group
    pub fn matches(&self, records: &[Record]) -> bool {
        match self {
            Expr::And(a, b) => a.matches(records) && b.matches(records),
            Expr::Or(a, b) => a.matches(records) || b.matches(records),
            Expr::Not(e) => !e.matches(records),
            Expr::Cond(cond) => records.iter().any(|r| cond.holds(r)),
        }
    }
}

impl Cond {
    fn holds(&self, record: &Record) -> bool {
        if !self.tags.contains(&record.tag_index) {
            return false;
        }

        let text = record.payload_text();
        let operand = match &self.field {
            Some(field) => match header_value(&text, field) {
                Some(value) => value,
                None => return false,
            },
            None => text.as_ref(),
        };

        let test = match &self.test {
            Some(test) => test,
            None => return true,
        };

        if test.op.is_numeric() {
            let number = match operand.split_whitespace().next().map(str::parse::<f64>) {
                Some(Ok(n)) => n,
                _ => return false,
            };
            return match test.op {
                Op::NumEq => number == test.number,
                Op::NumNe => number != test.number,
                Op::Lt => number < test.number,
                Op::Le => number <= test.number,
                Op::Gt => number > test.number,
                Op::Ge => number >= test.number,
                _ => false,
            };
        }

        match (test.op, &test.pattern) {
            (Op::StrEq, _) => operand == test.value,
            (Op::StrNe, _) => operand != test.value,
            (Op::Matches, Some(pattern)) => pattern.is_match(operand),
            (Op::NotMatches, Some(pattern)) => !pattern.is_match(operand),
            _ => false,
        }
    }
}

/// Value of a `Name: value` payload when `Name` matches `field`
fn header_value<'a>(payload: &'a str, field: &str) -> Option<&'a str> {
    let (name, value) = payload.split_once(':')?;
    if name.trim().eq_ignore_ascii_case(field) {
        Some(value.trim())
    } else {
        None
    }
}

fn syntax(at: usize, message: &str) -> VslError {
    VslError::QueryCompile(format!("Syntax error at position {}: {}", at, message))
}

// =============================================================================
// Tokenizer
// =============================================================================

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '"' | '\'' | '=' | '!' | '<' | '>' | '~')
}

fn tokenize(text: &str) -> Result<Vec<(Token, usize)>> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some(&(at, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        match c {
            '(' => {
                chars.next();
                tokens.push((Token::LParen, at));
            }
            ')' => {
                chars.next();
                tokens.push((Token::RParen, at));
            }
            '"' | '\'' => {
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some((_, ch)) = chars.next() {
                    match ch {
                        '\\' => {
                            if let Some((_, escaped)) = chars.next() {
                                value.push(escaped);
                            }
                        }
                        ch if ch == c => {
                            closed = true;
                            break;
                        }
                        ch => value.push(ch),
                    }
                }
                if !closed {
                    return Err(syntax(at, "unterminated string"));
                }
                tokens.push((Token::Str(value), at));
            }
            '=' | '!' | '<' | '>' | '~' => {
                chars.next();
                let next = chars.peek().map(|&(_, n)| n);
                let op = match (c, next) {
                    ('=', Some('=')) => Some(Op::NumEq),
                    ('!', Some('=')) => Some(Op::NumNe),
                    ('!', Some('~')) => Some(Op::NotMatches),
                    ('<', Some('=')) => Some(Op::Le),
                    ('>', Some('=')) => Some(Op::Ge),
                    _ => None,
                };
                let op = match op {
                    Some(op) => {
                        chars.next();
                        op
                    }
                    None => match c {
                        '<' => Op::Lt,
                        '>' => Op::Gt,
                        '~' => Op::Matches,
                        _ => return Err(syntax(at, &format!("unknown operator '{}'", c))),
                    },
                };
                tokens.push((Token::Op(op), at));
            }
            _ => {
                let mut word = String::new();
                while let Some(&(_, ch)) = chars.peek() {
                    if is_delimiter(ch) {
                        break;
                    }
                    word.push(ch);
                    chars.next();
                }
                tokens.push((Token::Word(word), at));
            }
        }
    }

    Ok(tokens)
}

// =============================================================================
// Parser
// =============================================================================

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    text_len: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<(&Token, usize)> {
        self.tokens.get(self.pos).map(|(t, at)| (t, *at))
    }

    fn next(&mut self) -> Option<(Token, usize)> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some((Token::Word(w), _)) if w.eq_ignore_ascii_case(keyword))
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.peek_keyword("or") {
            self.next();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        while self.peek_keyword("and") {
            self.next();
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.depth >= MAX_DEPTH {
            let at = self.peek().map_or(self.text_len, |(_, at)| at);
            return Err(syntax(at, "expression nested too deeply"));
        }

        self.depth += 1;
        let expr = self.parse_nested();
        self.depth -= 1;
        expr
    }

    fn parse_nested(&mut self) -> Result<Expr> {
        if self.peek_keyword("not") {
            self.next();
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }

        match self.next() {
            Some((Token::LParen, _)) => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some((Token::RParen, _)) => Ok(inner),
                    Some((_, at)) => Err(syntax(at, "expected ')'")),
                    None => Err(syntax(self.text_len, "expected ')'")),
                }
            }
            Some((Token::Word(word), at)) => self.parse_cond(word, at),
            Some((_, at)) => Err(syntax(at, "expected tag")),
            None => Err(syntax(self.text_len, "expected tag")),
        }
    }

    fn parse_cond(&mut self, spec: String, at: usize) -> Result<Expr> {
        if ["and", "or", "not"]
            .iter()
            .any(|k| spec.eq_ignore_ascii_case(k))
        {
            return Err(syntax(at, "expected tag"));
        }

        let (name, field) = match spec.split_once(':') {
            Some((name, field)) if !field.is_empty() => (name, Some(field.to_string())),
            Some(_) => return Err(syntax(at, "empty field name")),
            None => (spec.as_str(), None),
        };

        let tags = match name.strip_suffix('*') {
            Some(prefix) => tags_with_prefix(prefix),
            None => tag_index(name).into_iter().collect(),
        };
        if tags.is_empty() {
            return Err(VslError::QueryCompile(format!(
                "Unknown tag '{}' at position {}",
                name, at
            )));
        }

        let op = match self.peek() {
            Some((Token::Op(op), _)) => Some(*op),
            Some((Token::Word(w), _)) if w.eq_ignore_ascii_case("eq") => Some(Op::StrEq),
            Some((Token::Word(w), _)) if w.eq_ignore_ascii_case("ne") => Some(Op::StrNe),
            _ => None,
        };

        let test = match op {
            Some(op) => {
                let (_, op_at) = self.next().unwrap_or((Token::RParen, self.text_len));
                let (value, value_at) = match self.next() {
                    Some((Token::Word(v), at)) | Some((Token::Str(v), at)) => (v, at),
                    _ => return Err(syntax(op_at, "expected value after operator")),
                };
                let number = if op.is_numeric() {
                    value.parse::<f64>().map_err(|_| {
                        syntax(op_at, &format!("expected number, got '{}'", value))
                    })?
                } else {
                    0.0
                };
                let pattern = match op {
                    Op::Matches | Op::NotMatches => Some(Regex::new(&value).map_err(|e| {
                        syntax(value_at, &format!("invalid pattern '{}': {}", value, e))
                    })?),
                    _ => None,
                };
                Some(Test {
                    op,
                    value,
                    number,
                    pattern,
                })
            }
            None => None,
        };

        Ok(Expr::Cond(Box::new(Cond { tags, field, test })))
    }
}
