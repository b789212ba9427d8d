//! Sandboxed boolean expressions for condition nodes.
//!
//! A small grammar evaluated against a JSON context, with no access to
//! anything outside that context:
//!
//! ```text
//! expression := and_expr (OR and_expr)*
//! and_expr   := unary (AND unary)*
//! unary      := NOT unary | primary
//! primary    := '(' expression ')' | operand (cmp operand)?
//! cmp        := == | != | < | <= | > | >=
//! operand    := number | 'text' | "text" | true | false | null | ident
//! ```
//!
//! Identifiers resolve dotted paths into the context (`fetch.cost`); an
//! unbound path reads as `null`. `AND`/`OR`/`NOT` keywords are
//! case-insensitive and `&&`/`||`/`!` are accepted as spellings. A bare
//! operand is coerced to a boolean by truthiness: non-zero numbers and
//! non-empty text are true, `null` is false.

use platform::{PlatformError, Result};
use serde_json::Value;

/// Evaluate an expression against a JSON context object.
pub fn evaluate(expression: &str, context: &Value) -> Result<bool> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err(PlatformError::InvalidExpression(
            "expression is empty".to_string(),
        ));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        context,
    };
    let result = parser.expression()?;
    if parser.pos < parser.tokens.len() {
        return Err(PlatformError::InvalidExpression(format!(
            "unexpected input after expression: {}",
            parser.describe_current()
        )));
    }
    Ok(result)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Text(String),
    Ident(String),
    Bool(bool),
    Null,
    And,
    Or,
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
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
            '&' => {
                if chars.get(i + 1) == Some(&'&') {
                    tokens.push(Token::And);
                    i += 2;
                } else {
                    return Err(invalid("expected '&&'"));
                }
            }
            '|' => {
                if chars.get(i + 1) == Some(&'|') {
                    tokens.push(Token::Or);
                    i += 2;
                } else {
                    return Err(invalid("expected '||'"));
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ne);
                    i += 2;
                } else {
                    tokens.push(Token::Not);
                    i += 1;
                }
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Eq);
                    i += 2;
                } else {
                    return Err(invalid("expected '=='"));
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '\'' | '"' => {
                let quote = c;
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && chars[end] != quote {
                    end += 1;
                }
                if end >= chars.len() {
                    return Err(invalid("unterminated string"));
                }
                tokens.push(Token::Text(chars[start..end].iter().collect()));
                i = end + 1;
            }
            '-' | '0'..='9' => {
                let start = i;
                let mut end = i;
                if chars[end] == '-' {
                    end += 1;
                }
                while end < chars.len() && (chars[end].is_ascii_digit() || chars[end] == '.') {
                    end += 1;
                }
                let literal: String = chars[start..end].iter().collect();
                let number = literal
                    .parse::<f64>()
                    .map_err(|_| invalid(format!("invalid number '{literal}'")))?;
                tokens.push(Token::Number(number));
                i = end;
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                let mut end = i;
                while end < chars.len()
                    && (chars[end].is_alphanumeric() || chars[end] == '_' || chars[end] == '.')
                {
                    end += 1;
                }
                let word: String = chars[start..end].iter().collect();
                tokens.push(match word.to_ascii_lowercase().as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    "null" => Token::Null,
                    _ => Token::Ident(word),
                });
                i = end;
            }
            other => {
                return Err(invalid(format!("unexpected character '{other}'")));
            }
        }
    }

    Ok(tokens)
}

/// A resolved comparison operand
#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Number(f64),
    Text(String),
    Bool(bool),
    Null,
}

impl Operand {
    fn truthy(&self) -> bool {
        match self {
            Operand::Bool(b) => *b,
            Operand::Number(n) => *n != 0.0,
            Operand::Text(t) => !t.is_empty(),
            Operand::Null => false,
        }
    }

    /// Numeric view, accepting numeric text so `count == '3'` compares
    fn as_number(&self) -> Option<f64> {
        match self {
            Operand::Number(n) => Some(*n),
            Operand::Text(t) => t.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Operand::Number(_) => "number",
            Operand::Text(_) => "text",
            Operand::Bool(_) => "boolean",
            Operand::Null => "null",
        }
    }
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    context: &'a Value,
}

impl Parser<'_> {
    fn expression(&mut self) -> Result<bool> {
        let mut result = self.and_expr()?;
        while self.eat(&Token::Or) {
            let right = self.and_expr()?;
            result = result || right;
        }
        Ok(result)
    }

    fn and_expr(&mut self) -> Result<bool> {
        let mut result = self.unary()?;
        while self.eat(&Token::And) {
            let right = self.unary()?;
            result = result && right;
        }
        Ok(result)
    }

    fn unary(&mut self) -> Result<bool> {
        if self.eat(&Token::Not) {
            return Ok(!self.unary()?);
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<bool> {
        if self.eat(&Token::LParen) {
            let inner = self.expression()?;
            if !self.eat(&Token::RParen) {
                return Err(invalid("expected ')'"));
            }
            return Ok(inner);
        }

        let left = self.operand()?;
        let op = match self.peek() {
            Some(Token::Eq) => Token::Eq,
            Some(Token::Ne) => Token::Ne,
            Some(Token::Lt) => Token::Lt,
            Some(Token::Le) => Token::Le,
            Some(Token::Gt) => Token::Gt,
            Some(Token::Ge) => Token::Ge,
            _ => return Ok(left.truthy()),
        };
        self.pos += 1;
        let right = self.operand()?;

        match op {
            Token::Eq => Ok(equals(&left, &right)),
            Token::Ne => Ok(!equals(&left, &right)),
            Token::Lt => ordering(&left, &right).map(|o| o == std::cmp::Ordering::Less),
            Token::Le => ordering(&left, &right).map(|o| o != std::cmp::Ordering::Greater),
            Token::Gt => ordering(&left, &right).map(|o| o == std::cmp::Ordering::Greater),
            Token::Ge => ordering(&left, &right).map(|o| o != std::cmp::Ordering::Less),
            _ => unreachable!(),
        }
    }

    fn operand(&mut self) -> Result<Operand> {
        let token = self
            .peek()
            .cloned()
            .ok_or_else(|| invalid("expected an operand"))?;
        self.pos += 1;
        match token {
            Token::Number(n) => Ok(Operand::Number(n)),
            Token::Text(t) => Ok(Operand::Text(t)),
            Token::Bool(b) => Ok(Operand::Bool(b)),
            Token::Null => Ok(Operand::Null),
            Token::Ident(path) => Ok(self.lookup(&path)),
            other => Err(invalid(format!("expected an operand, found {other:?}"))),
        }
    }

    /// Resolve a dotted path in the context; an unbound path reads as null
    fn lookup(&self, path: &str) -> Operand {
        let mut current = self.context;
        for segment in path.split('.') {
            match current.get(segment) {
                Some(next) => current = next,
                None => return Operand::Null,
            }
        }
        match current {
            Value::Null => Operand::Null,
            Value::Bool(b) => Operand::Bool(*b),
            Value::Number(n) => Operand::Number(n.as_f64().unwrap_or(0.0)),
            Value::String(s) => Operand::Text(s.clone()),
            // Containers compare as their JSON text
            other => Operand::Text(other.to_string()),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn describe_current(&self) -> String {
        match self.peek() {
            Some(token) => format!("{token:?}"),
            None => "end of input".to_string(),
        }
    }
}

fn equals(left: &Operand, right: &Operand) -> bool {
    match (left, right) {
        (Operand::Null, Operand::Null) => true,
        (Operand::Bool(a), Operand::Bool(b)) => a == b,
        (Operand::Number(a), Operand::Number(b)) => a == b,
        (Operand::Text(a), Operand::Text(b)) => a == b,
        (Operand::Number(n), Operand::Text(t)) | (Operand::Text(t), Operand::Number(n)) => {
            t.trim().parse::<f64>().map_or(false, |parsed| parsed == *n)
        }
        _ => false,
    }
}

fn ordering(left: &Operand, right: &Operand) -> Result<std::cmp::Ordering> {
    if let (Some(a), Some(b)) = (left.as_number(), right.as_number()) {
        return a
            .partial_cmp(&b)
            .ok_or_else(|| invalid("cannot order non-finite numbers"));
    }
    if let (Operand::Text(a), Operand::Text(b)) = (left, right) {
        return Ok(a.cmp(b));
    }
    Err(invalid(format!(
        "cannot order {} and {}",
        left.kind(),
        right.kind()
    )))
}

fn invalid(message: impl Into<String>) -> PlatformError {
    PlatformError::InvalidExpression(message.into())
}
