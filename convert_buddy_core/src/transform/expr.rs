//! The tiny, pure, total expression language `compute` fields evaluate
//! (spec §4.4 point 4, §9 "Compute expression language"): literals, field
//! references, unary `- !`, binary `+ - * / %`, comparisons, `&& ||`, a
//! ternary, and a small safe function set (`len`, `lower`, `upper`,
//! `contains`). No I/O, no assignment, no user-defined functions — the
//! narrow scope the DESIGN NOTES call for instead of a general sandbox.

use crate::error::{ConvertError, ConvertResult};
use crate::record::Record;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Str(String),
    Ident(String),
    True,
    False,
    Null,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,
    Question,
    Colon,
    Comma,
    LParen,
    RParen,
    Eof,
}

fn lex(src: &str) -> ConvertResult<Vec<Token>> {
    let chars: Vec<char> = src.chars().collect();
    let mut i = 0;
    let mut tokens = Vec::new();

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '?' => {
                tokens.push(Token::Question);
                i += 1;
            }
            ':' => {
                tokens.push(Token::Colon);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::EqEq);
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::NotEq);
                i += 2;
            }
            '!' => {
                tokens.push(Token::Bang);
                i += 1;
            }
            '<' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Le);
                i += 2;
            }
            '<' => {
                tokens.push(Token::Lt);
                i += 1;
            }
            '>' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ge);
                i += 2;
            }
            '>' => {
                tokens.push(Token::Gt);
                i += 1;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::AndAnd);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::OrOr);
                i += 2;
            }
            '"' | '\'' => {
                let quote = c;
                i += 1;
                let mut s = String::new();
                loop {
                    match chars.get(i) {
                        None => return Err(expr_error("unterminated string literal")),
                        Some(&q) if q == quote => {
                            i += 1;
                            break;
                        }
                        Some(&'\\') => {
                            i += 1;
                            match chars.get(i) {
                                Some(&'n') => s.push('\n'),
                                Some(&'t') => s.push('\t'),
                                Some(&other) => s.push(other),
                                None => return Err(expr_error("unterminated escape")),
                            }
                            i += 1;
                        }
                        Some(&other) => {
                            s.push(other);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(s));
            }
            _ if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n: f64 = text
                    .parse()
                    .map_err(|_| expr_error("invalid number literal"))?;
                tokens.push(Token::Num(n));
            }
            _ if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                tokens.push(match text.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    _ => Token::Ident(text),
                });
            }
            other => return Err(expr_error(&format!("unexpected character {other:?}"))),
        }
    }
    tokens.push(Token::Eof);
    Ok(tokens)
}

fn expr_error(msg: &str) -> ConvertError {
    ConvertError::CoercionError {
        field: "compute".to_string(),
        value: msg.to_string(),
    }
}

#[derive(Debug, Clone)]
enum Expr {
    Num(f64),
    Str(String),
    Bool(bool),
    Null,
    Field(String),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Bin(BinOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

#[derive(Debug, Clone, Copy)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, t: &Token) -> ConvertResult<()> {
        if self.peek() == t {
            self.advance();
            Ok(())
        } else {
            Err(expr_error(&format!("expected {t:?}, found {:?}", self.peek())))
        }
    }

    fn parse_ternary(&mut self) -> ConvertResult<Expr> {
        let cond = self.parse_or()?;
        if *self.peek() == Token::Question {
            self.advance();
            let then_branch = self.parse_ternary()?;
            self.expect(&Token::Colon)?;
            let else_branch = self.parse_ternary()?;
            Ok(Expr::Ternary(
                Box::new(cond),
                Box::new(then_branch),
                Box::new(else_branch),
            ))
        } else {
            Ok(cond)
        }
    }

    fn parse_or(&mut self) -> ConvertResult<Expr> {
        let mut left = self.parse_and()?;
        while *self.peek() == Token::OrOr {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ConvertResult<Expr> {
        let mut left = self.parse_equality()?;
        while *self.peek() == Token::AndAnd {
            self.advance();
            let right = self.parse_equality()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> ConvertResult<Expr> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Token::EqEq => BinOp::Eq,
                Token::NotEq => BinOp::Ne,
                _ => break,
            };
            self.advance();
            let right = self.parse_relational()?;
            left = Expr::Bin(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> ConvertResult<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Token::Lt => BinOp::Lt,
                Token::Le => BinOp::Le,
                Token::Gt => BinOp::Gt,
                Token::Ge => BinOp::Ge,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = Expr::Bin(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> ConvertResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::Bin(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> ConvertResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Bin(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> ConvertResult<Expr> {
        match self.peek() {
            Token::Bang => {
                self.advance();
                Ok(Expr::Not(Box::new(self.parse_unary()?)))
            }
            Token::Minus => {
                self.advance();
                Ok(Expr::Neg(Box::new(self.parse_unary()?)))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> ConvertResult<Expr> {
        match self.advance() {
            Token::Num(n) => Ok(Expr::Num(n)),
            Token::Str(s) => Ok(Expr::Str(s)),
            Token::True => Ok(Expr::Bool(true)),
            Token::False => Ok(Expr::Bool(false)),
            Token::Null => Ok(Expr::Null),
            Token::LParen => {
                let inner = self.parse_ternary()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(name) => {
                if *self.peek() == Token::LParen {
                    self.advance();
                    let mut args = Vec::new();
                    if *self.peek() != Token::RParen {
                        args.push(self.parse_ternary()?);
                        while *self.peek() == Token::Comma {
                            self.advance();
                            args.push(self.parse_ternary()?);
                        }
                    }
                    self.expect(&Token::RParen)?;
                    Ok(Expr::Call(name, args))
                } else {
                    Ok(Expr::Field(name))
                }
            }
            other => Err(expr_error(&format!("unexpected token {other:?}"))),
        }
    }
}

fn parse(src: &str) -> ConvertResult<Expr> {
    let tokens = lex(src)?;
    let mut parser = Parser { tokens: &tokens, pos: 0 };
    let expr = parser.parse_ternary()?;
    if *parser.peek() != Token::Eof {
        return Err(expr_error("trailing tokens after expression"));
    }
    Ok(expr)
}

fn as_number(v: &Value) -> ConvertResult<f64> {
    v.as_f64().ok_or_else(|| expr_error("expected a number"))
}

fn as_bool(v: &Value) -> ConvertResult<bool> {
    v.as_bool().ok_or_else(|| expr_error("expected a boolean"))
}

fn as_str(v: &Value) -> ConvertResult<&str> {
    v.as_str().ok_or_else(|| expr_error("expected a string"))
}

fn truthy_compare(op: BinOp, left: &Value, right: &Value) -> ConvertResult<Value> {
    Ok(match op {
        BinOp::Eq => Value::Bool(left == right),
        BinOp::Ne => Value::Bool(left != right),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let ordering = if let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) {
                a.partial_cmp(&b)
            } else if let (Some(a), Some(b)) = (left.as_str(), right.as_str()) {
                Some(a.cmp(b))
            } else {
                return Err(expr_error("comparison requires two numbers or two strings"));
            };
            let ordering = ordering.ok_or_else(|| expr_error("incomparable values (NaN)"))?;
            Value::Bool(match op {
                BinOp::Lt => ordering.is_lt(),
                BinOp::Le => ordering.is_le(),
                BinOp::Gt => ordering.is_gt(),
                BinOp::Ge => ordering.is_ge(),
                _ => unreachable!(),
            })
        }
        _ => unreachable!(),
    })
}

fn eval(expr: &Expr, ctx: &Record) -> ConvertResult<Value> {
    Ok(match expr {
        Expr::Num(n) => Value::from(*n),
        Expr::Str(s) => Value::String(s.clone()),
        Expr::Bool(b) => Value::Bool(*b),
        Expr::Null => Value::Null,
        Expr::Field(name) => ctx.get(name).map(|s| s.to_json()).unwrap_or(Value::Null),
        Expr::Not(inner) => Value::Bool(!as_bool(&eval(inner, ctx)?)?),
        Expr::Neg(inner) => Value::from(-as_number(&eval(inner, ctx)?)?),
        Expr::And(l, r) => {
            let lv = as_bool(&eval(l, ctx)?)?;
            if !lv {
                Value::Bool(false)
            } else {
                Value::Bool(as_bool(&eval(r, ctx)?)?)
            }
        }
        Expr::Or(l, r) => {
            let lv = as_bool(&eval(l, ctx)?)?;
            if lv {
                Value::Bool(true)
            } else {
                Value::Bool(as_bool(&eval(r, ctx)?)?)
            }
        }
        Expr::Ternary(cond, then_branch, else_branch) => {
            if as_bool(&eval(cond, ctx)?)? {
                eval(then_branch, ctx)?
            } else {
                eval(else_branch, ctx)?
            }
        }
        Expr::Bin(op, l, r) => {
            let lv = eval(l, ctx)?;
            let rv = eval(r, ctx)?;
            match op {
                BinOp::Add if lv.is_string() || rv.is_string() => {
                    let mut s = lv.as_str().map(str::to_string).unwrap_or_else(|| lv.to_string());
                    if lv.is_string() {
                        s = as_str(&lv)?.to_string();
                    }
                    let right = if rv.is_string() {
                        as_str(&rv)?.to_string()
                    } else {
                        rv.to_string()
                    };
                    Value::String(s + &right)
                }
                BinOp::Add => Value::from(as_number(&lv)? + as_number(&rv)?),
                BinOp::Sub => Value::from(as_number(&lv)? - as_number(&rv)?),
                BinOp::Mul => Value::from(as_number(&lv)? * as_number(&rv)?),
                BinOp::Div => Value::from(as_number(&lv)? / as_number(&rv)?),
                BinOp::Mod => Value::from(as_number(&lv)? % as_number(&rv)?),
                _ => truthy_compare(*op, &lv, &rv)?,
            }
        }
        Expr::Call(name, args) => {
            let values: Vec<Value> = args.iter().map(|a| eval(a, ctx)).collect::<ConvertResult<_>>()?;
            match name.as_str() {
                "len" => match values.first() {
                    Some(Value::String(s)) => Value::from(s.chars().count() as i64),
                    Some(Value::Array(a)) => Value::from(a.len() as i64),
                    _ => return Err(expr_error("len() expects a string or array")),
                },
                "lower" => Value::String(as_str(values.first().ok_or_else(|| expr_error("lower() expects 1 argument"))?)?.to_lowercase()),
                "upper" => Value::String(as_str(values.first().ok_or_else(|| expr_error("upper() expects 1 argument"))?)?.to_uppercase()),
                "contains" => {
                    let haystack = values.first().ok_or_else(|| expr_error("contains() expects 2 arguments"))?;
                    let needle = values.get(1).ok_or_else(|| expr_error("contains() expects 2 arguments"))?;
                    Value::Bool(as_str(haystack)?.contains(as_str(needle)?))
                }
                other => return Err(expr_error(&format!("unknown function {other}"))),
            }
        }
    })
}

/// Parse and evaluate `source` against `ctx` in one call (compute
/// expressions are small and re-parsed per record rather than cached,
/// matching this crate's "no caching subsystem" scope — callers that care
/// about repeated evaluation cost should hoist parsing themselves).
pub fn eval_expr(source: &str, ctx: &Record) -> ConvertResult<Value> {
    let expr = parse(source)?;
    eval(&expr, ctx)
}
