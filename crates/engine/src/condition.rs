//! Declarative comparisons used by condition nodes.
//!
//! An expression is either a single operand (truthiness) or
//! `operand <op> operand` with `op` one of `== != > >= < <=`. Operands
//! are context paths or literals: numbers, quoted strings, `true`,
//! `false`, `null`. There is no arithmetic and no boolean combinators.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use actions::JsonMap;
use serde_json::{Number, Value};

use crate::template::lookup;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Path(String),
    Literal(Value),
}

impl Operand {
    fn resolve<'a>(&'a self, context: &'a JsonMap) -> &'a Value {
        static NULL: Value = Value::Null;
        match self {
            Self::Path(path) => lookup(context, path).unwrap_or(&NULL),
            Self::Literal(value) => value,
        }
    }
}

/// A parsed condition expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    left: Operand,
    comparison: Option<(CompareOp, Operand)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError(pub String);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ParseError {}

impl Condition {
    /// Evaluate against `context`. Never fails: missing paths are `null`
    /// and ill-typed orderings are simply false.
    pub fn evaluate(&self, context: &JsonMap) -> bool {
        let left = self.left.resolve(context);
        let Some((op, right)) = &self.comparison else {
            return truthy(left);
        };
        let right = right.resolve(context);
        match op {
            CompareOp::Eq => loosely_equal(left, right),
            CompareOp::Ne => !loosely_equal(left, right),
            CompareOp::Gt => order(left, right) == Some(Ordering::Greater),
            CompareOp::Ge => matches!(order(left, right), Some(Ordering::Greater | Ordering::Equal)),
            CompareOp::Lt => order(left, right) == Some(Ordering::Less),
            CompareOp::Le => matches!(order(left, right), Some(Ordering::Less | Ordering::Equal)),
        }
    }
}

impl FromStr for Condition {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens = tokenize(s)?;
        let mut tokens = tokens.into_iter();
        let left = match tokens.next() {
            Some(Token::Operand(op)) => op,
            Some(Token::Op(_)) => return Err(ParseError("expression starts with an operator".into())),
            None => return Err(ParseError("empty expression".into())),
        };
        let comparison = match (tokens.next(), tokens.next()) {
            (None, _) => None,
            (Some(Token::Op(op)), Some(Token::Operand(right))) => Some((op, right)),
            (Some(Token::Op(_)), None) => return Err(ParseError("missing right-hand operand".into())),
            _ => return Err(ParseError("expected `operand <op> operand`".into())),
        };
        if tokens.next().is_some() {
            return Err(ParseError("unexpected trailing input".into()));
        }
        Ok(Self { left, comparison })
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn loosely_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn order(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

enum Token {
    Operand(Operand),
    Op(CompareOp),
}

fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '"' || c == '\'' {
            let (text, next) = quoted(&chars, i)?;
            tokens.push(Token::Operand(Operand::Literal(Value::String(text))));
            i = next;
        } else if matches!(c, '=' | '!' | '<' | '>') {
            let two = chars.get(i + 1) == Some(&'=');
            let op = match (c, two) {
                ('=', true) => CompareOp::Eq,
                ('!', true) => CompareOp::Ne,
                ('<', true) => CompareOp::Le,
                ('>', true) => CompareOp::Ge,
                ('<', false) => CompareOp::Lt,
                ('>', false) => CompareOp::Gt,
                _ => return Err(ParseError(format!("unknown operator at position {i}"))),
            };
            tokens.push(Token::Op(op));
            i += if two { 2 } else { 1 };
        } else if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) {
            let start = i;
            i += 1;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let number = text
                .parse::<f64>()
                .ok()
                .and_then(number_value)
                .ok_or_else(|| ParseError(format!("invalid number '{text}'")))?;
            tokens.push(Token::Operand(Operand::Literal(number)));
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || matches!(chars[i], '_' | '.' | '-')) {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            if word.ends_with('.') || word.contains("..") {
                return Err(ParseError(format!("malformed path '{word}'")));
            }
            let operand = match word.as_str() {
                "true" => Operand::Literal(Value::Bool(true)),
                "false" => Operand::Literal(Value::Bool(false)),
                "null" => Operand::Literal(Value::Null),
                _ => Operand::Path(word),
            };
            tokens.push(Token::Operand(operand));
        } else {
            return Err(ParseError(format!("unexpected character '{c}' at position {i}")));
        }
    }

    Ok(tokens)
}

fn number_value(f: f64) -> Option<Value> {
    // Keep integers integral so equality with context values is exact.
    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        return Some(Value::Number(Number::from(f as i64)));
    }
    Number::from_f64(f).map(Value::Number)
}

fn quoted(chars: &[char], start: usize) -> Result<(String, usize), ParseError> {
    let quote = chars[start];
    let mut text = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                text.push(chars[i + 1]);
                i += 2;
            }
            c if c == quote => return Ok((text, i + 1)),
            c => {
                text.push(c);
                i += 1;
            }
        }
    }
    Err(ParseError(format!("unterminated string starting at position {start}")))
}
