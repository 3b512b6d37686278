//! Boolean expressions for Decision nodes and `filter_array` predicates.
//!
//! ```text
//! expr     := and ( "||" and )*
//! and      := primary ( "&&" primary )*
//! primary  := "(" expr ")" | operand ( cmp operand )?
//! cmp      := "==" | "!=" | ">" | "<" | ">=" | "<="
//! operand  := ${path} | number | 'string' | "string" | true | false | null
//! ```
//!
//! A lone operand is tested for truthiness. Ordered comparisons accept two
//! numbers or two strings; anything else fails with `InvalidCondition`.

use std::cmp::Ordering;

use serde_json::Value;

use crate::error::ExecError;
use crate::resolver::PathRef;
use crate::scope::Lookup;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl CmpOp {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Ref(PathRef),
    Literal(Value),
}

impl Operand {
    fn eval(&self, scope: &dyn Lookup) -> Result<Value, ExecError> {
        match self {
            Self::Ref(path) => path.resolve(scope),
            Self::Literal(v) => Ok(v.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Truthy(Operand),
    Compare(Operand, CmpOp, Operand),
    And(Vec<Expr>),
    Or(Vec<Expr>),
}

/// A parsed condition, ready to be evaluated against any scope.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    source: String,
    expr: Expr,
}

impl Condition {
    pub fn parse(source: &str) -> Result<Self, ExecError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let expr = parser.expr()?;
        if let Some(tok) = parser.peek() {
            return Err(invalid(format!("unexpected {:?} in '{}'", tok, source)));
        }
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Evaluate with short-circuiting `&&` and `||`.
    pub fn evaluate(&self, scope: &dyn Lookup) -> Result<bool, ExecError> {
        eval(&self.expr, scope)
    }
}

fn eval(expr: &Expr, scope: &dyn Lookup) -> Result<bool, ExecError> {
    match expr {
        Expr::Truthy(op) => Ok(truthy(&op.eval(scope)?)),
        Expr::Compare(lhs, op, rhs) => compare(&lhs.eval(scope)?, *op, &rhs.eval(scope)?),
        Expr::And(parts) => {
            for p in parts {
                if !eval(p, scope)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Expr::Or(parts) => {
            for p in parts {
                if eval(p, scope)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

/// JSON truthiness: null, false, 0, "" and empty collections are false.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn compare(lhs: &Value, op: CmpOp, rhs: &Value) -> Result<bool, ExecError> {
    let ordered = |accept: fn(Ordering) -> bool| {
        ordering(lhs, rhs).map(accept).ok_or_else(|| {
            invalid(format!(
                "cannot compare {} {} {}",
                crate::error::json_type(lhs),
                op.as_str(),
                crate::error::json_type(rhs)
            ))
        })
    };
    match op {
        CmpOp::Eq => Ok(json_eq(lhs, rhs)),
        CmpOp::Ne => Ok(!json_eq(lhs, rhs)),
        CmpOp::Gt => ordered(Ordering::is_gt),
        CmpOp::Lt => ordered(Ordering::is_lt),
        CmpOp::Ge => ordered(Ordering::is_ge),
        CmpOp::Le => ordered(Ordering::is_le),
    }
}

/// Order two numbers or two strings; anything else has no order.
fn ordering(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Equality where `1` and `1.0` are the same number.
fn json_eq(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => lhs == rhs,
    }
}

fn invalid(msg: impl Into<String>) -> ExecError {
    ExecError::InvalidCondition(msg.into())
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ref(PathRef),
    Literal(Value),
    Cmp(CmpOp),
    And,
    Or,
    LParen,
    RParen,
}

fn tokenize(src: &str) -> Result<Vec<Token>, ExecError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '&' if next == Some('&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if next == Some('|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '=' if next == Some('=') => {
                tokens.push(Token::Cmp(CmpOp::Eq));
                i += 2;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::Cmp(CmpOp::Ne));
                i += 2;
            }
            '>' | '<' => {
                let op = match (c, next == Some('=')) {
                    ('>', true) => CmpOp::Ge,
                    ('>', false) => CmpOp::Gt,
                    ('<', true) => CmpOp::Le,
                    _ => CmpOp::Lt,
                };
                i += if next == Some('=') { 2 } else { 1 };
                tokens.push(Token::Cmp(op));
            }
            '$' if next == Some('{') => {
                let start = i + 2;
                let end = chars[start..]
                    .iter()
                    .position(|&c| c == '}')
                    .map(|p| start + p)
                    .ok_or_else(|| invalid(format!("unclosed reference in '{}'", src)))?;
                let path: String = chars[start..end].iter().collect();
                let path = PathRef::parse(&path).map_err(|e| invalid(e.to_string()))?;
                tokens.push(Token::Ref(path));
                i = end + 1;
            }
            '"' | '\'' => {
                let (s, end) = read_string(&chars, i)?;
                tokens.push(Token::Literal(Value::String(s)));
                i = end;
            }
            c if c.is_ascii_digit() || c == '-' || c == '.' => {
                let start = i;
                i += 1;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || matches!(chars[i], '.' | '+' | '-'))
                {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n: serde_json::Number = serde_json::from_str(&text)
                    .map_err(|_| invalid(format!("bad number '{}'", text)))?;
                tokens.push(Token::Literal(Value::Number(n)));
            }
            c if c.is_ascii_alphabetic() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_alphanumeric() {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let value = match word.as_str() {
                    "true" => Value::Bool(true),
                    "false" => Value::Bool(false),
                    "null" => Value::Null,
                    _ => {
                        return Err(invalid(format!(
                            "unknown word '{}' (references are written ${{...}})",
                            word
                        )))
                    }
                };
                tokens.push(Token::Literal(value));
            }
            other => return Err(invalid(format!("unexpected character '{}'", other))),
        }
    }
    Ok(tokens)
}

/// Read a quoted string starting at `start`; returns the text and the index after the closing quote.
fn read_string(chars: &[char], start: usize) -> Result<(String, usize), ExecError> {
    let quote = chars[start];
    let mut out = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                out.push(match chars[i + 1] {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                });
                i += 2;
            }
            c if c == quote => return Ok((out, i + 1)),
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    Err(invalid("unterminated string literal"))
}

/// Deepest parenthesis nesting a condition may use.
const MAX_NESTING: usize = 64;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn expr(&mut self) -> Result<Expr, ExecError> {
        let mut parts = vec![self.and()?];
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            parts.push(self.and()?);
        }
        Ok(if parts.len() == 1 {
            parts.remove(0)
        } else {
            Expr::Or(parts)
        })
    }

    fn and(&mut self) -> Result<Expr, ExecError> {
        let mut parts = vec![self.primary()?];
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            parts.push(self.primary()?);
        }
        Ok(if parts.len() == 1 {
            parts.remove(0)
        } else {
            Expr::And(parts)
        })
    }

    fn primary(&mut self) -> Result<Expr, ExecError> {
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            if self.depth >= MAX_NESTING {
                return Err(invalid("condition nested too deeply"));
            }
            self.depth += 1;
            let inner = self.expr()?;
            self.depth -= 1;
            return match self.next() {
                Some(Token::RParen) => Ok(inner),
                _ => Err(invalid("missing ')'")),
            };
        }
        let lhs = self.operand()?;
        if let Some(Token::Cmp(op)) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.operand()?;
            return Ok(Expr::Compare(lhs, op, rhs));
        }
        Ok(Expr::Truthy(lhs))
    }

    fn operand(&mut self) -> Result<Operand, ExecError> {
        match self.next() {
            Some(Token::Ref(path)) => Ok(Operand::Ref(path)),
            Some(Token::Literal(v)) => Ok(Operand::Literal(v)),
            Some(tok) => Err(invalid(format!("expected a value, found {:?}", tok))),
            None => Err(invalid("unexpected end of condition")),
        }
    }
}
