//! # Condition Evaluator
//!
//! A small boolean language for choice and node conditions.
//!
//! ```text
//! or      := and ( ("||" | "or") and )*
//! and     := compare ( ("&&" | "and") compare )*
//! compare := unary ( ("==" | "=" | "!=" | "<" | "<=" | ">" | ">=") unary )?
//! unary   := ("!" | "not") unary | primary
//! primary := "(" or ")" | "has" "(" name ")" | integer | string | true | false | name
//! ```
//!
//! Evaluation never fails. Undefined flags are false, comparisons against
//! undefined variables are false, and an expression that does not parse
//! evaluates false with a warning. An absent or blank condition is true.

use crate::primitives::{MAX_CONDITION_DEPTH, MAX_CONDITION_LENGTH};
use crate::{Value, Variable};
use std::cmp::Ordering;
use thiserror::Error;

// =============================================================================
// STATE VIEW
// =============================================================================

/// Read access to the state a condition is evaluated against.
pub trait StateView {
    fn flag(&self, name: &str) -> Option<bool>;
    fn variable(&self, name: &str) -> Option<&Variable>;
    fn has_item(&self, item: &str) -> bool;
}

// =============================================================================
// ERRORS
// =============================================================================

/// Why a condition failed to parse. Byte offsets point into the source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
    #[error("unexpected character {ch:?} at {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("unterminated string starting at {pos}")]
    UnterminatedString { pos: usize },

    #[error("integer out of range at {pos}")]
    NumberOutOfRange { pos: usize },

    #[error("unexpected {found} at {pos}")]
    UnexpectedToken { found: String, pos: usize },

    #[error("unexpected end of condition")]
    UnexpectedEnd,

    #[error("condition longer than {MAX_CONDITION_LENGTH} bytes")]
    TooLong,

    #[error("condition nested deeper than {MAX_CONDITION_DEPTH} levels")]
    TooDeep,
}

// =============================================================================
// TOKENS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LParen,
    RParen,
    Not,
    And,
    Or,
    Cmp(CmpOp),
    Literal(Value),
    Name(String),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Self::LParen => "`(`".to_string(),
            Self::RParen => "`)`".to_string(),
            Self::Not => "`!`".to_string(),
            Self::And => "`&&`".to_string(),
            Self::Or => "`||`".to_string(),
            Self::Cmp(_) => "comparison".to_string(),
            Self::Literal(v) => format!("literal {v}"),
            Self::Name(n) => format!("name `{n}`"),
        }
    }
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | ':')
}

fn tokenize(source: &str) -> Result<Vec<(Token, usize)>, ConditionError> {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while let Some(&(pos, c)) = chars.get(i) {
        let next = chars.get(i + 1).map(|&(_, n)| n);
        match c {
            _ if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push((Token::LParen, pos));
                i += 1;
            }
            ')' => {
                tokens.push((Token::RParen, pos));
                i += 1;
            }
            '&' if next == Some('&') => {
                tokens.push((Token::And, pos));
                i += 2;
            }
            '|' if next == Some('|') => {
                tokens.push((Token::Or, pos));
                i += 2;
            }
            '!' if next == Some('=') => {
                tokens.push((Token::Cmp(CmpOp::Ne), pos));
                i += 2;
            }
            '!' => {
                tokens.push((Token::Not, pos));
                i += 1;
            }
            '=' => {
                tokens.push((Token::Cmp(CmpOp::Eq), pos));
                i += if next == Some('=') { 2 } else { 1 };
            }
            '<' | '>' => {
                let op = match (c, next == Some('=')) {
                    ('<', true) => CmpOp::Le,
                    ('<', false) => CmpOp::Lt,
                    (_, true) => CmpOp::Ge,
                    (_, false) => CmpOp::Gt,
                };
                tokens.push((Token::Cmp(op), pos));
                i += if next == Some('=') { 2 } else { 1 };
            }
            '"' | '\'' => {
                let quote = c;
                let mut text = String::new();
                let mut j = i + 1;
                loop {
                    match chars.get(j) {
                        None => return Err(ConditionError::UnterminatedString { pos }),
                        Some(&(_, '\\')) => {
                            if let Some(&(_, escaped)) = chars.get(j + 1) {
                                text.push(escaped);
                            }
                            j += 2;
                        }
                        Some(&(_, ch)) if ch == quote => break,
                        Some(&(_, ch)) => {
                            text.push(ch);
                            j += 1;
                        }
                    }
                }
                tokens.push((Token::Literal(Value::Text(text)), pos));
                i = j + 1;
            }
            _ if c.is_ascii_digit() || (c == '-' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let mut j = i + 1;
                while chars.get(j).is_some_and(|&(_, d)| d.is_ascii_digit()) {
                    j += 1;
                }
                let end = chars.get(j).map_or(source.len(), |&(p, _)| p);
                if let Some(&(_, d)) = chars.get(j).filter(|&&(_, d)| is_name_char(d)) {
                    return Err(ConditionError::UnexpectedChar { ch: d, pos: end });
                }
                let n = source[pos..end]
                    .parse::<i64>()
                    .map_err(|_| ConditionError::NumberOutOfRange { pos })?;
                tokens.push((Token::Literal(Value::Number(n)), pos));
                i = j;
            }
            _ if is_name_char(c) => {
                let mut j = i + 1;
                while chars.get(j).is_some_and(|&(_, d)| is_name_char(d)) {
                    j += 1;
                }
                let end = chars.get(j).map_or(source.len(), |&(p, _)| p);
                let word = &source[pos..end];
                let token = match word.to_ascii_lowercase().as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "true" => Token::Literal(Value::Bool(true)),
                    "false" => Token::Literal(Value::Bool(false)),
                    _ => Token::Name(word.to_string()),
                };
                tokens.push((token, pos));
                i = j;
            }
            _ => return Err(ConditionError::UnexpectedChar { ch: c, pos }),
        }
    }

    Ok(tokens)
}

// =============================================================================
// SYNTAX TREE & PARSER
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    Literal(Value),
    Name(String),
    Has(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    cursor: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor).map(|(t, _)| t)
    }

    fn bump(&mut self) -> Result<(Token, usize), ConditionError> {
        let token = self
            .tokens
            .get(self.cursor)
            .cloned()
            .ok_or(ConditionError::UnexpectedEnd)?;
        self.cursor += 1;
        Ok(token)
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ConditionError> {
        let (token, pos) = self.bump()?;
        if &token == expected {
            Ok(())
        } else {
            Err(ConditionError::UnexpectedToken {
                found: token.describe(),
                pos,
            })
        }
    }

    fn descend(&mut self) -> Result<(), ConditionError> {
        self.depth += 1;
        if self.depth > MAX_CONDITION_DEPTH {
            return Err(ConditionError::TooDeep);
        }
        Ok(())
    }

    fn parse_or(&mut self) -> Result<Expr, ConditionError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.cursor += 1;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ConditionError> {
        let mut left = self.parse_compare()?;
        while self.peek() == Some(&Token::And) {
            self.cursor += 1;
            let right = self.parse_compare()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_compare(&mut self) -> Result<Expr, ConditionError> {
        let left = self.parse_unary()?;
        if let Some(&Token::Cmp(op)) = self.peek() {
            self.cursor += 1;
            let right = self.parse_unary()?;
            return Ok(Expr::Compare(op, Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ConditionError> {
        if self.peek() == Some(&Token::Not) {
            self.cursor += 1;
            self.descend()?;
            let inner = self.parse_unary()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ConditionError> {
        let (token, pos) = self.bump()?;
        match token {
            Token::LParen => {
                self.descend()?;
                let inner = self.parse_or()?;
                self.expect(&Token::RParen)?;
                self.depth -= 1;
                Ok(inner)
            }
            Token::Literal(value) => Ok(Expr::Literal(value)),
            Token::Name(name) if name == "has" && self.peek() == Some(&Token::LParen) => {
                self.cursor += 1;
                let (item, item_pos) = self.bump()?;
                let item = match item {
                    Token::Name(n) => n,
                    Token::Literal(Value::Text(s)) => s,
                    other => {
                        return Err(ConditionError::UnexpectedToken {
                            found: other.describe(),
                            pos: item_pos,
                        });
                    }
                };
                self.expect(&Token::RParen)?;
                Ok(Expr::Has(item))
            }
            Token::Name(name) => Ok(Expr::Name(name)),
            other => Err(ConditionError::UnexpectedToken {
                found: other.describe(),
                pos,
            }),
        }
    }
}

// =============================================================================
// CONDITION
// =============================================================================

/// A parsed condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    /// `None` for a blank condition, which always holds.
    expr: Option<Expr>,
}

impl Condition {
    /// Parse condition text.
    pub fn parse(source: &str) -> Result<Self, ConditionError> {
        if source.len() > MAX_CONDITION_LENGTH {
            return Err(ConditionError::TooLong);
        }
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Ok(Self { expr: None });
        }

        let mut parser = Parser {
            tokens,
            cursor: 0,
            depth: 0,
        };
        let expr = parser.parse_or()?;
        if let Some((token, pos)) = parser.tokens.get(parser.cursor) {
            return Err(ConditionError::UnexpectedToken {
                found: token.describe(),
                pos: *pos,
            });
        }
        Ok(Self { expr: Some(expr) })
    }

    /// Whether this condition always holds.
    #[must_use]
    pub fn is_vacuous(&self) -> bool {
        self.expr.is_none()
    }

    /// Evaluate against a state. Never fails.
    pub fn evaluate(&self, state: &impl StateView) -> bool {
        self.expr.as_ref().is_none_or(|e| truth(e, state))
    }
}

/// Evaluate optional condition text. Absent is true, unparseable is false.
pub fn evaluate(expression: Option<&str>, state: &impl StateView) -> bool {
    let Some(source) = expression else {
        return true;
    };
    match Condition::parse(source) {
        Ok(condition) => condition.evaluate(state),
        Err(e) => {
            tracing::warn!(condition = source, error = %e, "unparseable condition treated as false");
            false
        }
    }
}

// =============================================================================
// EVALUATION
// =============================================================================

fn truth(expr: &Expr, state: &impl StateView) -> bool {
    match expr {
        Expr::Literal(v) => v.is_truthy(),
        Expr::Name(name) => match state.flag(name) {
            Some(b) => b,
            None => state
                .variable(name)
                .is_some_and(|v| Value::from(v.clone()).is_truthy()),
        },
        Expr::Has(item) => state.has_item(item),
        Expr::Not(inner) => !truth(inner, state),
        Expr::And(l, r) => truth(l, state) && truth(r, state),
        Expr::Or(l, r) => truth(l, state) || truth(r, state),
        Expr::Compare(op, l, r) => match (operand(l, state), operand(r, state)) {
            (Some(a), Some(b)) => compare(*op, &a, &b),
            _ => false,
        },
    }
}

/// Resolve a comparison operand. Names look up variables first, then flags.
fn operand(expr: &Expr, state: &impl StateView) -> Option<Value> {
    match expr {
        Expr::Literal(v) => Some(v.clone()),
        Expr::Name(name) => state
            .variable(name)
            .map(|v| Value::from(v.clone()))
            .or_else(|| state.flag(name).map(Value::Bool)),
        other => Some(Value::Bool(truth(other, state))),
    }
}

fn compare(op: CmpOp, a: &Value, b: &Value) -> bool {
    let ordering = match (a, b) {
        (Value::Number(x), Value::Number(y)) => Some(x.cmp(y)),
        (Value::Text(x), Value::Text(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => {
            return match op {
                CmpOp::Eq => x == y,
                CmpOp::Ne => x != y,
                _ => false,
            };
        }
        _ => None,
    };
    match (op, ordering) {
        (CmpOp::Eq, Some(o)) => o == Ordering::Equal,
        (CmpOp::Ne, Some(o)) => o != Ordering::Equal,
        (CmpOp::Lt, Some(o)) => o == Ordering::Less,
        (CmpOp::Le, Some(o)) => o != Ordering::Greater,
        (CmpOp::Gt, Some(o)) => o == Ordering::Greater,
        (CmpOp::Ge, Some(o)) => o != Ordering::Less,
        // Mixed types are never equal and never ordered.
        (CmpOp::Ne, None) => true,
        (_, None) => false,
    }
}

// =============================================================================
// TESTS
// =============================================================================
