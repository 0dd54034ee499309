//! Trigger expression compiler.
//!
//! Whitespace-tokenized, whitelist-only recursive descent parser. Every token
//! must resolve to an operator, a numeric literal, a known channel reference
//! or a known scalar symbol; anything else rejects the whole expression.
//!
//! Precedence, lowest first: `or`, `and`, `not`, comparison/crossing,
//! `+ -`, `* / %`.

use crate::domain::error::CompileError;
use crate::domain::expr::{
    ArithOp, BoolExpr, ChannelRef, CmpOp, CompiledExpr, CrossDirection, NumExpr, Process,
    SymbolTable, Transform,
};

pub const DEFAULT_MAX_LEN: usize = 50;

/// Substrings that reject an expression outright.
pub const FORBIDDEN: &[&str] = &[
    "__",
    "import",
    "exec",
    "eval",
    "lambda",
    "getattr",
    "setattr",
    "globals",
    "locals",
    "subprocess",
    ";",
    "`",
];

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Scalar(String),
    Channel(ChannelRef),
    Arith(ArithOp),
    Cmp(CmpOp),
    Cross(CrossDirection),
    And,
    Or,
    Not,
}

pub fn compile(
    text: &str,
    symbols: &SymbolTable,
    max_len: usize,
) -> Result<CompiledExpr, CompileError> {
    let len = text.chars().count();
    if len > max_len {
        return Err(CompileError::TooLong {
            len,
            limit: max_len,
        });
    }
    if let Some(bad) = FORBIDDEN.iter().find(|f| text.contains(*f)) {
        return Err(CompileError::ForbiddenToken {
            token: bad.to_string(),
        });
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Err(CompileError::InvalidExpression {
            expression: text.to_string(),
            token: String::new(),
            position: 0,
            reason: "empty expression".into(),
        });
    }

    let mut tokens = Vec::with_capacity(words.len());
    for (i, word) in words.iter().enumerate() {
        let token = classify(word, symbols).map_err(|reason| CompileError::InvalidExpression {
            expression: text.to_string(),
            token: word.to_string(),
            position: i,
            reason,
        })?;
        tokens.push(token);
    }

    let mut parser = Parser {
        text,
        words: &words,
        tokens,
        pos: 0,
    };
    let root = parser.parse_or()?;
    if parser.pos < parser.tokens.len() {
        return Err(parser.error("unexpected token after complete expression"));
    }
    Ok(CompiledExpr::new(text, root))
}

fn classify(word: &str, symbols: &SymbolTable) -> Result<Token, String> {
    let token = match word {
        "+" => Token::Arith(ArithOp::Add),
        "-" => Token::Arith(ArithOp::Sub),
        "*" => Token::Arith(ArithOp::Mul),
        "/" => Token::Arith(ArithOp::Div),
        "%" => Token::Arith(ArithOp::Mod),
        "<" => Token::Cmp(CmpOp::Lt),
        ">" => Token::Cmp(CmpOp::Gt),
        "==" => Token::Cmp(CmpOp::Eq),
        ">=" => Token::Cmp(CmpOp::Ge),
        "<=" => Token::Cmp(CmpOp::Le),
        "!=" => Token::Cmp(CmpOp::Ne),
        "|>" => Token::Cross(CrossDirection::Above),
        "<|" => Token::Cross(CrossDirection::Below),
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        _ if is_number(word) => Token::Num(
            word.parse()
                .map_err(|_| format!("malformed number '{word}'"))?,
        ),
        _ => classify_reference(word, symbols)?,
    };
    Ok(token)
}

fn is_number(word: &str) -> bool {
    let digits = word.strip_prefix('-').unwrap_or(word);
    let mut parts = digits.splitn(2, '.');
    let int = parts.next().unwrap_or("");
    let frac = parts.next();
    !int.is_empty()
        && int.chars().all(|c| c.is_ascii_digit())
        && frac.is_none_or(|f| !f.is_empty() && f.chars().all(|c| c.is_ascii_digit()))
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `alias[.channel][#process.window]` or a bare scalar symbol.
fn classify_reference(word: &str, symbols: &SymbolTable) -> Result<Token, String> {
    let (head, transform) = match word.split_once('#') {
        Some((head, tail)) => (head, Some(parse_transform(tail)?)),
        None => (word, None),
    };
    let (alias, channel) = match head.split_once('.') {
        Some((a, c)) => (a, Some(c)),
        None => (head, None),
    };
    if !is_identifier(alias) || channel.is_some_and(|c| !is_identifier(c)) {
        return Err(format!("'{word}' is not a recognized token"));
    }

    if symbols.is_scalar(alias) {
        if channel.is_some() || transform.is_some() {
            return Err(format!("scalar '{alias}' takes no channel or transform"));
        }
        return Ok(Token::Scalar(alias.to_string()));
    }

    let channel = symbols.resolve_channel(alias, channel)?;
    Ok(Token::Channel(ChannelRef {
        alias: alias.to_string(),
        channel,
        transform,
    }))
}

fn parse_transform(tail: &str) -> Result<Transform, String> {
    let (name, window) = tail
        .split_once('.')
        .ok_or_else(|| format!("transform '#{tail}' must be #process.window"))?;
    let process = Process::from_name(name)
        .ok_or_else(|| format!("unknown transform '{name}' (expected diff, mean or median)"))?;
    if !window.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("transform window '{window}' must be a positive integer"));
    }
    let window: usize = window
        .parse()
        .map_err(|_| format!("transform window '{window}' must be a positive integer"))?;
    if window == 0 {
        return Err("transform window must be at least 1".into());
    }
    Ok(Transform { process, window })
}

struct Parser<'a> {
    text: &'a str,
    words: &'a [&'a str],
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, reason: &str) -> CompileError {
        let token = self
            .words
            .get(self.pos)
            .map_or_else(|| "end of input".to_string(), |w| w.to_string());
        CompileError::InvalidExpression {
            expression: self.text.to_string(),
            token,
            position: self.pos,
            reason: reason.to_string(),
        }
    }

    fn parse_or(&mut self) -> Result<BoolExpr, CompileError> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let rhs = self.parse_and()?;
            lhs = BoolExpr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<BoolExpr, CompileError> {
        let mut lhs = self.parse_not()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let rhs = self.parse_not()?;
            lhs = BoolExpr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<BoolExpr, CompileError> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            let inner = self.parse_not()?;
            return Ok(BoolExpr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<BoolExpr, CompileError> {
        let lhs = self.parse_additive()?;
        let expr = match self.peek() {
            Some(Token::Cmp(op)) => {
                let op = *op;
                self.pos += 1;
                let rhs = self.parse_additive()?;
                BoolExpr::Compare { op, lhs, rhs }
            }
            Some(Token::Cross(direction)) => {
                let direction = *direction;
                self.pos += 1;
                let rhs = self.parse_additive()?;
                BoolExpr::Cross {
                    direction,
                    lhs,
                    rhs,
                }
            }
            _ => return Err(self.error("expected a comparison or crossing operator")),
        };
        if matches!(self.peek(), Some(Token::Cmp(_) | Token::Cross(_))) {
            return Err(self.error("comparisons cannot be chained"));
        }
        Ok(expr)
    }

    fn parse_additive(&mut self) -> Result<NumExpr, CompileError> {
        let mut lhs = self.parse_term()?;
        while let Some(Token::Arith(op @ (ArithOp::Add | ArithOp::Sub))) = self.peek() {
            let op = *op;
            self.pos += 1;
            let rhs = self.parse_term()?;
            lhs = NumExpr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<NumExpr, CompileError> {
        let mut lhs = self.parse_primary()?;
        while let Some(Token::Arith(op @ (ArithOp::Mul | ArithOp::Div | ArithOp::Mod))) =
            self.peek()
        {
            let op = *op;
            self.pos += 1;
            let rhs = self.parse_primary()?;
            lhs = NumExpr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_primary(&mut self) -> Result<NumExpr, CompileError> {
        match self.peek() {
            Some(Token::Num(_) | Token::Scalar(_) | Token::Channel(_)) => {}
            _ => return Err(self.error("expected a number, channel or parameter")),
        }
        match self.next() {
            Some(Token::Num(v)) => Ok(NumExpr::Literal(v)),
            Some(Token::Scalar(name)) => Ok(NumExpr::Symbol(name)),
            Some(Token::Channel(r)) => Ok(NumExpr::Channel(r)),
            _ => Err(self.error("expected a number, channel or parameter")),
        }
    }
}
