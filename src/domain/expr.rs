//! Trigger expression AST.
//!
//! This module defines the typed syntax tree produced by the expression
//! compiler:
//! - `NumExpr`: numeric series or scalar expressions
//! - `BoolExpr`: per-bar truth expressions (comparisons, crossings, logic)
//! - `ChannelRef`: a resolved `alias.channel` reference with optional transform
//! - `SymbolTable`: the names an expression is allowed to mention

use crate::domain::indicator::IndicatorKind;
use crate::domain::ohlcv::PriceField;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Gt,
    Eq,
    Ge,
    Le,
    Ne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossDirection {
    /// `|>`
    Above,
    /// `<|`
    Below,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Process {
    Diff,
    Mean,
    Median,
}

impl Process {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "diff" => Some(Process::Diff),
            "mean" => Some(Process::Mean),
            "median" => Some(Process::Median),
            _ => None,
        }
    }
}

/// Rolling transform applied to a channel before it enters the expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transform {
    pub process: Process,
    pub window: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRef {
    pub alias: String,
    pub channel: String,
    pub transform: Option<Transform>,
}

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.alias, self.channel)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NumExpr {
    Literal(f64),
    /// A scalar trial parameter, bound at evaluation time.
    Symbol(String),
    Channel(ChannelRef),
    Binary {
        op: ArithOp,
        lhs: Box<NumExpr>,
        rhs: Box<NumExpr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum BoolExpr {
    Compare {
        op: CmpOp,
        lhs: NumExpr,
        rhs: NumExpr,
    },
    Cross {
        direction: CrossDirection,
        lhs: NumExpr,
        rhs: NumExpr,
    },
    And(Box<BoolExpr>, Box<BoolExpr>),
    Or(Box<BoolExpr>, Box<BoolExpr>),
    Not(Box<BoolExpr>),
}

/// A validated expression, ready to evaluate against any channel source.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpr {
    source: String,
    root: BoolExpr,
}

impl CompiledExpr {
    pub(crate) fn new(source: &str, root: BoolExpr) -> Self {
        Self {
            source: source.to_string(),
            root,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> &BoolExpr {
        &self.root
    }

    /// Every channel the expression reads, in first-use order.
    pub fn channel_refs(&self) -> Vec<&ChannelRef> {
        let mut out = Vec::new();
        collect_bool(&self.root, &mut out, &mut Vec::new());
        out
    }

    /// Every scalar symbol the expression needs bound.
    pub fn symbols(&self) -> BTreeSet<&str> {
        let mut syms = Vec::new();
        collect_bool(&self.root, &mut Vec::new(), &mut syms);
        syms.into_iter().collect()
    }
}

fn collect_bool<'a>(expr: &'a BoolExpr, refs: &mut Vec<&'a ChannelRef>, syms: &mut Vec<&'a str>) {
    match expr {
        BoolExpr::Compare { lhs, rhs, .. } | BoolExpr::Cross { lhs, rhs, .. } => {
            collect_num(lhs, refs, syms);
            collect_num(rhs, refs, syms);
        }
        BoolExpr::And(a, b) | BoolExpr::Or(a, b) => {
            collect_bool(a, refs, syms);
            collect_bool(b, refs, syms);
        }
        BoolExpr::Not(inner) => collect_bool(inner, refs, syms),
    }
}

fn collect_num<'a>(expr: &'a NumExpr, refs: &mut Vec<&'a ChannelRef>, syms: &mut Vec<&'a str>) {
    match expr {
        NumExpr::Literal(_) => {}
        NumExpr::Symbol(name) => syms.push(name),
        NumExpr::Channel(r) => {
            if !refs.contains(&r) {
                refs.push(r);
            }
        }
        NumExpr::Binary { lhs, rhs, .. } => {
            collect_num(lhs, refs, syms);
            collect_num(rhs, refs, syms);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ChannelSet {
    channels: Vec<String>,
    default: String,
}

/// Names an expression may reference.
///
/// Price fields of the fastest timeframe are always present; each is an
/// alias whose only channel shares its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolTable {
    aliases: BTreeMap<String, ChannelSet>,
    scalars: BTreeSet<String>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        let aliases = PriceField::ALL
            .iter()
            .map(|f| {
                (
                    f.name().to_string(),
                    ChannelSet {
                        channels: vec![f.name().to_string()],
                        default: f.name().to_string(),
                    },
                )
            })
            .collect();
        Self {
            aliases,
            scalars: BTreeSet::new(),
        }
    }

    pub fn add_indicator(&mut self, alias: &str, kind: IndicatorKind) {
        self.aliases.insert(
            alias.to_string(),
            ChannelSet {
                channels: kind.channels().iter().map(|c| c.to_string()).collect(),
                default: kind.default_channel().to_string(),
            },
        );
    }

    pub fn add_scalar(&mut self, name: &str) {
        self.scalars.insert(name.to_string());
    }

    pub fn is_scalar(&self, name: &str) -> bool {
        self.scalars.contains(name)
    }

    pub fn is_alias(&self, name: &str) -> bool {
        self.aliases.contains_key(name)
    }

    /// Resolve `alias[.channel]` to a concrete channel name.
    pub fn resolve_channel(&self, alias: &str, channel: Option<&str>) -> Result<String, String> {
        let set = self
            .aliases
            .get(alias)
            .ok_or_else(|| format!("unknown symbol '{alias}'"))?;
        match channel {
            None => Ok(set.default.clone()),
            Some(c) if set.channels.iter().any(|k| k == c) => Ok(c.to_string()),
            Some(c) => Err(format!(
                "'{alias}' has no channel '{c}' (available: {})",
                set.channels.join(", ")
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_table_has_price_fields() {
        let table = SymbolTable::new();
        assert_eq!(table.resolve_channel("close", None).unwrap(), "close");
        assert!(table.resolve_channel("close", Some("real")).is_err());
    }

    #[test]
    fn indicator_default_channel() {
        let mut table = SymbolTable::new();
        table.add_indicator("bb", IndicatorKind::Bbands);
        assert_eq!(table.resolve_channel("bb", None).unwrap(), "bandwidth");
        assert_eq!(table.resolve_channel("bb", Some("upper")).unwrap(), "upper");
        let err = table.resolve_channel("bb", Some("hist")).unwrap_err();
        assert!(err.contains("available: lower, middle, upper, bandwidth"));
    }

    #[test]
    fn unknown_alias() {
        let table = SymbolTable::new();
        assert!(table.resolve_channel("nope", None).is_err());
    }

    #[test]
    fn collects_refs_and_symbols() {
        let close = ChannelRef {
            alias: "close".into(),
            channel: "close".into(),
            transform: None,
        };
        let root = BoolExpr::And(
            Box::new(BoolExpr::Compare {
                op: CmpOp::Gt,
                lhs: NumExpr::Channel(close.clone()),
                rhs: NumExpr::Symbol("level".into()),
            }),
            Box::new(BoolExpr::Compare {
                op: CmpOp::Lt,
                lhs: NumExpr::Channel(close.clone()),
                rhs: NumExpr::Literal(5.0),
            }),
        );
        let expr = CompiledExpr::new("close > level and close < 5", root);
        assert_eq!(expr.channel_refs(), vec![&close]);
        assert_eq!(expr.symbols().into_iter().collect::<Vec<_>>(), vec!["level"]);
    }
}
