//! Load curves: the mapping from an average delay to an instantaneous load.
//!
//! The configured fit function is an arithmetic expression over the variable
//! `X`, e.g. `100000.0+200000.0*X` or `e^-(1.08X) + 5*e^(2*X)`. It is parsed
//! once at startup into an [`Expression`] and evaluated on every sample.
//!
//! Supported syntax: `+ - * / ^` (`^` is right-associative and binds tighter
//! than unary minus), parentheses, decimal literals with optional exponent,
//! implicit multiplication (`2X`, `3(X+1)`), the constants `e` and `pi`, and
//! the functions `exp ln log sqrt abs`. Names are case-insensitive.

use std::fmt;
use std::str::FromStr;

use crate::error::CurveError;

/// Maps an average delay (ns) to an instantaneous load value.
///
/// The estimator clamps the result to at most `1.0`; curves need not.
pub trait LoadCurve: Send + Sync {
    /// Evaluate the curve at `delay`.
    fn load_at(&self, delay: f64) -> f64;
}

impl<F> LoadCurve for F
where
    F: Fn(f64) -> f64 + Send + Sync,
{
    fn load_at(&self, delay: f64) -> f64 {
        self(delay)
    }
}

/// Parse `expression` and evaluate it at `x` in one step.
pub fn evaluate(expression: &str, x: f64) -> Result<f64, CurveError> {
    Ok(Expression::parse(expression)?.eval(x))
}

/// A parsed fit function.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Node,
}

impl Expression {
    /// Parse a fit function.
    pub fn parse(source: &str) -> Result<Self, CurveError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser { tokens, pos: 0 };
        let root = parser.expr()?;
        if let Some(token) = parser.tokens.get(parser.pos) {
            return Err(CurveError::new(
                format!("unexpected {}", token.kind),
                token.offset,
            ));
        }
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    /// The text this expression was parsed from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate with `X = x`.
    pub fn eval(&self, x: f64) -> f64 {
        self.root.eval(x)
    }
}

impl FromStr for Expression {
    type Err = CurveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl LoadCurve for Expression {
    fn load_at(&self, delay: f64) -> f64 {
        self.eval(delay)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Func {
    Exp,
    Ln,
    Log,
    Sqrt,
    Abs,
}

impl Func {
    fn lookup(name: &str) -> Option<Self> {
        match name {
            "exp" => Some(Func::Exp),
            "ln" => Some(Func::Ln),
            "log" => Some(Func::Log),
            "sqrt" => Some(Func::Sqrt),
            "abs" => Some(Func::Abs),
            _ => None,
        }
    }

    fn apply(self, v: f64) -> f64 {
        match self {
            Func::Exp => v.exp(),
            Func::Ln => v.ln(),
            Func::Log => v.log10(),
            Func::Sqrt => v.sqrt(),
            Func::Abs => v.abs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Num(f64),
    Var,
    Neg(Box<Node>),
    Add(Box<Node>, Box<Node>),
    Sub(Box<Node>, Box<Node>),
    Mul(Box<Node>, Box<Node>),
    Div(Box<Node>, Box<Node>),
    Pow(Box<Node>, Box<Node>),
    Call(Func, Box<Node>),
}

impl Node {
    fn eval(&self, x: f64) -> f64 {
        match self {
            Node::Num(v) => *v,
            Node::Var => x,
            Node::Neg(a) => -a.eval(x),
            Node::Add(a, b) => a.eval(x) + b.eval(x),
            Node::Sub(a, b) => a.eval(x) - b.eval(x),
            Node::Mul(a, b) => a.eval(x) * b.eval(x),
            Node::Div(a, b) => a.eval(x) / b.eval(x),
            Node::Pow(a, b) => a.eval(x).powf(b.eval(x)),
            Node::Call(f, a) => f.apply(a.eval(x)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Num(f64),
    Ident(String),
    Op(char),
    LParen,
    RParen,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Num(v) => write!(f, "number {}", v),
            TokenKind::Ident(name) => write!(f, "name {:?}", name),
            TokenKind::Op(c) => write!(f, "operator '{}'", c),
            TokenKind::LParen => f.write_str("'('"),
            TokenKind::RParen => f.write_str("')'"),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    offset: usize,
}

fn tokenize(source: &str) -> Result<Vec<Token>, CurveError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let start = i;
        let kind = match c {
            b' ' | b'\t' | b'\r' | b'\n' => {
                i += 1;
                continue;
            }
            b'+' | b'-' | b'*' | b'/' | b'^' => {
                i += 1;
                TokenKind::Op(c as char)
            }
            b'(' => {
                i += 1;
                TokenKind::LParen
            }
            b')' => {
                i += 1;
                TokenKind::RParen
            }
            b'0'..=b'9' | b'.' => {
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                    i += 1;
                }
                // Exponent only when followed by digits, so "2e" stays 2*e
                if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
                    let mut j = i + 1;
                    if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
                        j += 1;
                    }
                    if j < bytes.len() && bytes[j].is_ascii_digit() {
                        i = j;
                        while i < bytes.len() && bytes[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let text = &source[start..i];
                let value = text
                    .parse::<f64>()
                    .map_err(|_| CurveError::new(format!("invalid number {:?}", text), start))?;
                TokenKind::Num(value)
            }
            c if c.is_ascii_alphabetic() => {
                while i < bytes.len() && bytes[i].is_ascii_alphanumeric() && !is_var_split(bytes, start, i) {
                    i += 1;
                }
                TokenKind::Ident(source[start..i].to_ascii_lowercase())
            }
            _ => {
                return Err(CurveError::new(
                    format!("unexpected character {:?}", c as char),
                    start,
                ))
            }
        };
        tokens.push(Token {
            kind,
            offset: start,
        });
    }

    Ok(tokens)
}

/// A lone `X` is the variable even when glued to a following name, as in `Xe`.
fn is_var_split(bytes: &[u8], start: usize, i: usize) -> bool {
    i == start + 1 && bytes[start].eq_ignore_ascii_case(&b'x')
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|t| t.offset)
            .or_else(|| self.tokens.last().map(|t| t.offset + 1))
            .unwrap_or(0)
    }

    fn advance(&mut self) -> Option<TokenKind> {
        let token = self.tokens.get(self.pos).map(|t| t.kind.clone());
        self.pos += 1;
        token
    }

    fn expr(&mut self) -> Result<Node, CurveError> {
        let mut lhs = self.term()?;
        loop {
            match self.peek() {
                Some(TokenKind::Op('+')) => {
                    self.pos += 1;
                    lhs = Node::Add(Box::new(lhs), Box::new(self.term()?));
                }
                Some(TokenKind::Op('-')) => {
                    self.pos += 1;
                    lhs = Node::Sub(Box::new(lhs), Box::new(self.term()?));
                }
                _ => return Ok(lhs),
            }
        }
    }

    fn term(&mut self) -> Result<Node, CurveError> {
        let mut lhs = self.unary()?;
        loop {
            match self.peek() {
                Some(TokenKind::Op('*')) => {
                    self.pos += 1;
                    lhs = Node::Mul(Box::new(lhs), Box::new(self.unary()?));
                }
                Some(TokenKind::Op('/')) => {
                    self.pos += 1;
                    lhs = Node::Div(Box::new(lhs), Box::new(self.unary()?));
                }
                // Implicit multiplication: 1.08X, 2(X+1), 3e
                Some(TokenKind::Ident(_)) | Some(TokenKind::LParen) => {
                    lhs = Node::Mul(Box::new(lhs), Box::new(self.power()?));
                }
                _ => return Ok(lhs),
            }
        }
    }

    fn unary(&mut self) -> Result<Node, CurveError> {
        match self.peek() {
            Some(TokenKind::Op('-')) => {
                self.pos += 1;
                Ok(Node::Neg(Box::new(self.unary()?)))
            }
            Some(TokenKind::Op('+')) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Node, CurveError> {
        let base = self.primary()?;
        if let Some(TokenKind::Op('^')) = self.peek() {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(Node::Pow(Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Node, CurveError> {
        let offset = self.offset();
        match self.advance() {
            Some(TokenKind::Num(v)) => Ok(Node::Num(v)),
            Some(TokenKind::LParen) => {
                let inner = self.expr()?;
                self.expect_rparen()?;
                Ok(inner)
            }
            Some(TokenKind::Ident(name)) => match name.as_str() {
                "x" => Ok(Node::Var),
                "e" => Ok(Node::Num(std::f64::consts::E)),
                "pi" => Ok(Node::Num(std::f64::consts::PI)),
                other => {
                    let func = Func::lookup(other).ok_or_else(|| {
                        CurveError::new(format!("unknown name {:?}", other), offset)
                    })?;
                    let open = self.offset();
                    if self.advance() != Some(TokenKind::LParen) {
                        return Err(CurveError::new(format!("expected '(' after {}", other), open));
                    }
                    let arg = self.expr()?;
                    self.expect_rparen()?;
                    Ok(Node::Call(func, Box::new(arg)))
                }
            },
            Some(kind) => Err(CurveError::new(format!("unexpected {}", kind), offset)),
            None => Err(CurveError::new("unexpected end of expression", offset)),
        }
    }

    fn expect_rparen(&mut self) -> Result<(), CurveError> {
        let offset = self.offset();
        match self.advance() {
            Some(TokenKind::RParen) => Ok(()),
            _ => Err(CurveError::new("expected ')'", offset)),
        }
    }
}
