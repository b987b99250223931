//! boolean expressions over identity claims, used by iam filters.
//!
//! ```text
//! domain == "example.com" && ("admins" in token.groups || token.email_verified)
//! ```
//!
//! a claim that is not present compares unequal to everything and is false
//! when used as a condition, including under `!=`.

use std::collections::BTreeMap;

use tidescale_types::User;

use crate::error::ExprError;

/// a claim value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimValue {
    /// a string claim.
    String(String),
    /// a boolean claim.
    Bool(bool),
    /// a list of strings, e.g. `groups`.
    List(Vec<String>),
}

impl From<&str> for ClaimValue {
    fn from(s: &str) -> Self {
        ClaimValue::String(s.to_string())
    }
}

impl From<String> for ClaimValue {
    fn from(s: String) -> Self {
        ClaimValue::String(s)
    }
}

impl From<bool> for ClaimValue {
    fn from(b: bool) -> Self {
        ClaimValue::Bool(b)
    }
}

impl From<Vec<String>> for ClaimValue {
    fn from(v: Vec<String>) -> Self {
        ClaimValue::List(v)
    }
}

/// claims about an identity, keyed by dotted name (`token.groups`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Claims(BTreeMap<String, ClaimValue>);

impl Claims {
    /// no claims.
    pub fn new() -> Self {
        Self::default()
    }

    /// set a claim, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ClaimValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// builder form of [`Claims::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ClaimValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// look up a claim.
    pub fn get(&self, key: &str) -> Option<&ClaimValue> {
        self.0.get(key)
    }

    /// the claims derivable from a stored user: `sub`, `email` and `domain`.
    pub fn for_user(user: &User) -> Self {
        let mut claims = Self::new();
        if let Some(sub) = &user.account_id {
            claims.insert("sub", sub.as_str());
        }
        let login = user.login_name();
        claims.insert("email", login);
        if let Some((_, domain)) = login.rsplit_once('@') {
            claims.insert("domain", domain);
        }
        claims
    }

    /// the `sub` claim, if it is a string.
    pub fn sub(&self) -> Option<&str> {
        self.string("sub")
    }

    /// the `email` claim, if it is a string.
    pub fn email(&self) -> Option<&str> {
        self.string("email")
    }

    fn string(&self, key: &str) -> Option<&str> {
        match self.get(key) {
            Some(ClaimValue::String(s)) => Some(s),
            _ => None,
        }
    }
}

/// a parsed filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// a literal value.
    Literal(Value),
    /// a claim reference.
    Claim(String),
    /// `!e`
    Not(Box<Expr>),
    /// `a && b`
    And(Box<Expr>, Box<Expr>),
    /// `a || b`
    Or(Box<Expr>, Box<Expr>),
    /// `a == b`
    Eq(Box<Expr>, Box<Expr>),
    /// `a != b`
    Ne(Box<Expr>, Box<Expr>),
    /// `a in [..]`
    In(Box<Expr>, Box<Expr>),
    /// `a contains b`, for lists and substrings.
    Contains(Box<Expr>, Box<Expr>),
}

/// a value produced while evaluating.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// string.
    Str(String),
    /// boolean.
    Bool(bool),
    /// list.
    List(Vec<Value>),
    /// a claim that is not present.
    Missing,
}

impl From<&ClaimValue> for Value {
    fn from(v: &ClaimValue) -> Self {
        match v {
            ClaimValue::String(s) => Value::Str(s.clone()),
            ClaimValue::Bool(b) => Value::Bool(*b),
            ClaimValue::List(items) => Value::List(items.iter().cloned().map(Value::Str).collect()),
        }
    }
}

impl Expr {
    /// parse an expression.
    pub fn parse(input: &str) -> Result<Self, ExprError> {
        let tokens = tokenize(input)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.or()?;
        match parser.peek() {
            None => Ok(expr),
            Some(tok) => Err(ExprError::UnexpectedToken(tok.to_string())),
        }
    }

    /// evaluate as a condition.
    pub fn evaluate(&self, claims: &Claims) -> Result<bool, ExprError> {
        truthy(&self.value(claims)?)
    }

    fn value(&self, claims: &Claims) -> Result<Value, ExprError> {
        Ok(match self {
            Expr::Literal(v) => v.clone(),
            Expr::Claim(key) => claims.get(key).map(Value::from).unwrap_or(Value::Missing),
            Expr::Not(e) => Value::Bool(!e.evaluate(claims)?),
            Expr::And(a, b) => Value::Bool(a.evaluate(claims)? && b.evaluate(claims)?),
            Expr::Or(a, b) => Value::Bool(a.evaluate(claims)? || b.evaluate(claims)?),
            Expr::Eq(a, b) | Expr::Ne(a, b) => {
                let (a, b) = (a.value(claims)?, b.value(claims)?);
                if a == Value::Missing || b == Value::Missing {
                    Value::Bool(false)
                } else {
                    Value::Bool((a == b) == matches!(self, Expr::Eq(..)))
                }
            }
            Expr::In(needle, haystack) => {
                let needle = needle.value(claims)?;
                match haystack.value(claims)? {
                    Value::List(items) => {
                        Value::Bool(needle != Value::Missing && items.contains(&needle))
                    }
                    Value::Missing => Value::Bool(false),
                    other => {
                        return Err(ExprError::TypeMismatch(format!(
                            "right side of `in` must be a list, got {other:?}"
                        )));
                    }
                }
            }
            Expr::Contains(haystack, needle) => {
                let needle = needle.value(claims)?;
                match (haystack.value(claims)?, &needle) {
                    (Value::Missing, _) | (_, Value::Missing) => Value::Bool(false),
                    (Value::List(items), _) => Value::Bool(items.contains(&needle)),
                    (Value::Str(s), Value::Str(sub)) => Value::Bool(s.contains(sub.as_str())),
                    (other, _) => {
                        return Err(ExprError::TypeMismatch(format!(
                            "`contains` needs a list or string, got {other:?}"
                        )));
                    }
                }
            }
        })
    }
}

impl std::str::FromStr for Expr {
    type Err = ExprError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn truthy(v: &Value) -> Result<bool, ExprError> {
    match v {
        Value::Bool(b) => Ok(*b),
        Value::Missing => Ok(false),
        other => Err(ExprError::TypeMismatch(format!(
            "expected a boolean, got {other:?}"
        ))),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    And,
    Or,
    Not,
    EqEq,
    NotEq,
    Str(String),
    Ident(String),
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
            Token::LBracket => f.write_str("["),
            Token::RBracket => f.write_str("]"),
            Token::Comma => f.write_str(","),
            Token::And => f.write_str("&&"),
            Token::Or => f.write_str("||"),
            Token::Not => f.write_str("!"),
            Token::EqEq => f.write_str("=="),
            Token::NotEq => f.write_str("!="),
            Token::Str(s) => write!(f, "{s:?}"),
            Token::Ident(s) => f.write_str(s),
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

fn tokenize(input: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some((offset, c)) = chars.next() {
        let token = match c {
            c if c.is_whitespace() => continue,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            ',' => Token::Comma,
            '&' | '|' | '=' => match chars.next() {
                Some((_, next)) if next == c => match c {
                    '&' => Token::And,
                    '|' => Token::Or,
                    _ => Token::EqEq,
                },
                _ => return Err(ExprError::UnexpectedChar { offset, ch: c }),
            },
            '!' => {
                if chars.next_if(|(_, n)| *n == '=').is_some() {
                    Token::NotEq
                } else {
                    Token::Not
                }
            }
            '"' | '\'' => {
                let mut s = String::new();
                loop {
                    match chars.next() {
                        None => return Err(ExprError::UnterminatedString(offset)),
                        Some((_, '\\')) => match chars.next() {
                            Some((_, escaped)) => s.push(escaped),
                            None => return Err(ExprError::UnterminatedString(offset)),
                        },
                        Some((_, q)) if q == c => break,
                        Some((_, other)) => s.push(other),
                    }
                }
                Token::Str(s)
            }
            c if is_ident_char(c) => {
                let mut ident = c.to_string();
                while let Some((_, n)) = chars.next_if(|(_, n)| is_ident_char(*n)) {
                    ident.push(n);
                }
                Token::Ident(ident)
            }
            ch => return Err(ExprError::UnexpectedChar { offset, ch }),
        };
        tokens.push(token);
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token, ExprError> {
        let tok = self.tokens.get(self.pos).cloned().ok_or(ExprError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(tok)
    }

    fn expect(&mut self, want: Token) -> Result<(), ExprError> {
        let tok = self.next()?;
        if tok == want {
            Ok(())
        } else {
            Err(ExprError::UnexpectedToken(tok.to_string()))
        }
    }

    fn or(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            lhs = Expr::Or(Box::new(lhs), Box::new(self.and()?));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            lhs = Expr::And(Box::new(lhs), Box::new(self.unary()?));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, ExprError> {
        let lhs = self.primary()?;
        let op: fn(Box<Expr>, Box<Expr>) -> Expr = match self.peek() {
            Some(Token::EqEq) => Expr::Eq,
            Some(Token::NotEq) => Expr::Ne,
            Some(Token::Ident(kw)) if kw == "in" => Expr::In,
            Some(Token::Ident(kw)) if kw == "contains" => Expr::Contains,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.primary()?;
        Ok(op(Box::new(lhs), Box::new(rhs)))
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        match self.next()? {
            Token::LParen => {
                let inner = self.or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::LBracket => Ok(Expr::Literal(Value::List(self.list()?))),
            Token::Str(s) => Ok(Expr::Literal(Value::Str(s))),
            Token::Ident(id) => Ok(match id.as_str() {
                "true" => Expr::Literal(Value::Bool(true)),
                "false" => Expr::Literal(Value::Bool(false)),
                "in" | "contains" => return Err(ExprError::UnexpectedToken(id)),
                _ => Expr::Claim(id),
            }),
            tok => Err(ExprError::UnexpectedToken(tok.to_string())),
        }
    }

    /// list literal after the opening bracket. a trailing comma is allowed.
    fn list(&mut self) -> Result<Vec<Value>, ExprError> {
        let mut items = Vec::new();
        loop {
            match self.next()? {
                Token::RBracket => return Ok(items),
                Token::Str(s) => items.push(Value::Str(s)),
                Token::Ident(id) if id == "true" => items.push(Value::Bool(true)),
                Token::Ident(id) if id == "false" => items.push(Value::Bool(false)),
                tok => return Err(ExprError::UnexpectedToken(tok.to_string())),
            }
            match self.next()? {
                Token::Comma => continue,
                Token::RBracket => return Ok(items),
                tok => return Err(ExprError::UnexpectedToken(tok.to_string())),
            }
        }
    }
}
