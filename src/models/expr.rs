//! Target-model expression language.
//!
//! Users may replace the plain `exp(-t/k<N>)` summand of a component with
//! their own expression. The grammar is closed:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := ('+' | '-') unary | primary
//! primary := NUMBER | 't' | 'k' DIGITS | 'exp' '(' expr ')' | '(' expr ')'
//! ```
//!
//! - `t` is the time-delay axis
//! - `k<N>` is the shared decay constant of component `N`
//!
//! Anything else (unknown identifiers, `**`, `^`, unbalanced parentheses) is
//! a compile error. Compilation resolves each `k<N>` to its slot in the
//! component set, so evaluation is a plain tree walk with no name lookups.

use std::fmt;

use crate::domain::ComponentSet;
use crate::error::ConfigurationError;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Time,
    Tau(usize),
    Exp,
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    fn symbol(self) -> char {
        match self {
            BinOp::Add => '+',
            BinOp::Sub => '-',
            BinOp::Mul => '*',
            BinOp::Div => '/',
        }
    }
}

/// Parsed and resolved expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(f64),
    Time,
    /// Decay constant of `component`, stored at `slot` of the tau slice.
    Tau { component: usize, slot: usize },
    Neg(Box<Expr>),
    Exp(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

/// Failure while evaluating a compiled expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalFault {
    DivisionByZero,
    NonFinite,
    /// `k<component>` has no entry in the decay constant slice.
    UnboundDecayConstant { component: usize },
}

/// Value and derivative with respect to one decay constant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dual {
    pub value: f64,
    pub deriv: f64,
}

impl Expr {
    /// Evaluate at time `t` with decay constants `taus` (component-set order).
    pub fn eval(&self, t: f64, taus: &[f64]) -> Result<f64, EvalFault> {
        let v = match self {
            Expr::Num(v) => *v,
            Expr::Time => t,
            Expr::Tau { component, slot } => *taus
                .get(*slot)
                .ok_or(EvalFault::UnboundDecayConstant { component: *component })?,
            Expr::Neg(inner) => -inner.eval(t, taus)?,
            Expr::Exp(inner) => inner.eval(t, taus)?.exp(),
            Expr::Binary(op, lhs, rhs) => {
                let a = lhs.eval(t, taus)?;
                let b = rhs.eval(t, taus)?;
                match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => {
                        if b == 0.0 {
                            return Err(EvalFault::DivisionByZero);
                        }
                        a / b
                    }
                }
            }
        };
        if v.is_finite() { Ok(v) } else { Err(EvalFault::NonFinite) }
    }

    /// Forward-mode evaluation of value and `∂/∂τ[wrt]`.
    pub fn eval_dual(&self, t: f64, taus: &[f64], wrt: usize) -> Result<Dual, EvalFault> {
        let d = match self {
            Expr::Num(v) => Dual { value: *v, deriv: 0.0 },
            Expr::Time => Dual { value: t, deriv: 0.0 },
            Expr::Tau { component, slot } => Dual {
                value: *taus
                    .get(*slot)
                    .ok_or(EvalFault::UnboundDecayConstant { component: *component })?,
                deriv: if *slot == wrt { 1.0 } else { 0.0 },
            },
            Expr::Neg(inner) => {
                let a = inner.eval_dual(t, taus, wrt)?;
                Dual { value: -a.value, deriv: -a.deriv }
            }
            Expr::Exp(inner) => {
                let a = inner.eval_dual(t, taus, wrt)?;
                let e = a.value.exp();
                Dual { value: e, deriv: e * a.deriv }
            }
            Expr::Binary(op, lhs, rhs) => {
                let a = lhs.eval_dual(t, taus, wrt)?;
                let b = rhs.eval_dual(t, taus, wrt)?;
                match op {
                    BinOp::Add => Dual { value: a.value + b.value, deriv: a.deriv + b.deriv },
                    BinOp::Sub => Dual { value: a.value - b.value, deriv: a.deriv - b.deriv },
                    BinOp::Mul => Dual {
                        value: a.value * b.value,
                        deriv: a.value * b.deriv + b.value * a.deriv,
                    },
                    BinOp::Div => {
                        if b.value == 0.0 {
                            return Err(EvalFault::DivisionByZero);
                        }
                        Dual {
                            value: a.value / b.value,
                            deriv: (a.deriv * b.value - a.value * b.deriv) / (b.value * b.value),
                        }
                    }
                }
            }
        };
        if d.value.is_finite() && d.deriv.is_finite() {
            Ok(d)
        } else {
            Err(EvalFault::NonFinite)
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Num(v) => write!(f, "{v}"),
            Expr::Time => f.write_str("t"),
            Expr::Tau { component, .. } => write!(f, "k{component}"),
            Expr::Neg(inner) => write!(f, "(-{inner})"),
            Expr::Exp(inner) => write!(f, "exp({inner})"),
            Expr::Binary(op, lhs, rhs) => write!(f, "({lhs} {} {rhs})", op.symbol()),
        }
    }
}

/// One component's compiled summand.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSummand {
    pub component: usize,
    pub source: String,
    pub expr: Expr,
}

/// Compile the summand text of `component` against `components`.
///
/// Empty text compiles to the constant `0`.
pub fn compile_summand(
    text: &str,
    component: usize,
    components: &ComponentSet,
) -> Result<CompiledSummand, ConfigurationError> {
    let fail = |message: String| ConfigurationError::InvalidModelExpression { component, message };

    let expr = if text.trim().is_empty() {
        Expr::Num(0.0)
    } else {
        let tokens = tokenize(text).map_err(fail)?;
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            components,
        };
        let expr = parser.expr().map_err(fail)?;
        if let Some((tok, at)) = parser.peek() {
            return Err(fail(format!("unexpected {} at position {at}", describe(tok))));
        }
        expr
    };

    Ok(CompiledSummand {
        component,
        source: text.to_string(),
        expr,
    })
}

fn tokenize(text: &str) -> Result<Vec<(Token, usize)>, String> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                i += 1;
                continue;
            }
            '+' => out.push((Token::Plus, start)),
            '-' => out.push((Token::Minus, start)),
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    return Err(format!("operator '**' at position {start} is not allowed"));
                }
                out.push((Token::Star, start));
            }
            '/' => out.push((Token::Slash, start)),
            '(' => out.push((Token::LParen, start)),
            ')' => out.push((Token::RParen, start)),
            c if c.is_ascii_digit() || c == '.' => {
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // Optional exponent: only when followed by digits.
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let literal: String = chars[start..i].iter().collect();
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number '{literal}' at position {start}"))?;
                out.push((Token::Number(value), start));
                continue;
            }
            c if c.is_alphabetic() || c == '_' => {
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                let token = match ident.as_str() {
                    "t" => Token::Time,
                    "exp" => Token::Exp,
                    _ => match ident.strip_prefix('k').map(str::parse::<usize>) {
                        Some(Ok(n)) => Token::Tau(n),
                        _ => {
                            return Err(format!(
                                "unknown identifier '{ident}' at position {start} (allowed: t, k<N>, exp)"
                            ));
                        }
                    },
                };
                out.push((token, start));
                continue;
            }
            other => {
                return Err(format!("character '{other}' at position {start} is not allowed"));
            }
        }
        i += 1;
    }

    Ok(out)
}

fn describe(tok: Token) -> String {
    match tok {
        Token::Number(v) => format!("number {v}"),
        Token::Time => "'t'".to_string(),
        Token::Tau(n) => format!("'k{n}'"),
        Token::Exp => "'exp'".to_string(),
        Token::Plus => "'+'".to_string(),
        Token::Minus => "'-'".to_string(),
        Token::Star => "'*'".to_string(),
        Token::Slash => "'/'".to_string(),
        Token::LParen => "'('".to_string(),
        Token::RParen => "')'".to_string(),
    }
}

struct Parser<'a> {
    tokens: &'a [(Token, usize)],
    pos: usize,
    components: &'a ComponentSet,
}

impl Parser<'_> {
    fn peek(&self) -> Option<(Token, usize)> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<(Token, usize)> {
        let tok = self.peek();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect_rparen(&mut self, opened_at: usize) -> Result<(), String> {
        match self.next() {
            Some((Token::RParen, _)) => Ok(()),
            Some((tok, at)) => Err(format!(
                "expected ')' to close '(' at position {opened_at}, found {} at position {at}",
                describe(tok)
            )),
            None => Err(format!("unbalanced parentheses: '(' at position {opened_at} is never closed")),
        }
    }

    fn expr(&mut self) -> Result<Expr, String> {
        let mut lhs = self.term()?;
        while let Some((tok, _)) = self.peek() {
            let op = match tok {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, String> {
        let mut lhs = self.unary()?;
        while let Some((tok, _)) = self.peek() {
            let op = match tok {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, String> {
        match self.peek() {
            Some((Token::Minus, _)) => {
                self.pos += 1;
                Ok(Expr::Neg(Box::new(self.unary()?)))
            }
            Some((Token::Plus, _)) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some((Token::Number(v), _)) => Ok(Expr::Num(v)),
            Some((Token::Time, _)) => Ok(Expr::Time),
            Some((Token::Tau(component), at)) => {
                let slot = self.components.position(component).ok_or_else(|| {
                    format!(
                        "'k{component}' at position {at} refers to component {component}, \
                         which is not in the component set {}",
                        self.components
                    )
                })?;
                Ok(Expr::Tau { component, slot })
            }
            Some((Token::Exp, at)) => match self.next() {
                Some((Token::LParen, open)) => {
                    let inner = self.expr()?;
                    self.expect_rparen(open)?;
                    Ok(Expr::Exp(Box::new(inner)))
                }
                _ => Err(format!("'exp' at position {at} must be followed by '('")),
            },
            Some((Token::LParen, open)) => {
                let inner = self.expr()?;
                self.expect_rparen(open)?;
                Ok(inner)
            }
            Some((Token::RParen, at)) => {
                Err(format!("unbalanced parentheses: unexpected ')' at position {at}"))
            }
            Some((tok, at)) => Err(format!("unexpected {} at position {at}", describe(tok))),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}
