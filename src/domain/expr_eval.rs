//! Vectorized evaluation of compiled trigger expressions.
//!
//! # Evaluation Semantics
//!
//! - Every expression evaluates to one boolean per bar of the fastest timeframe
//! - Scalars (literals, bound parameters) broadcast against series
//! - Any comparison or crossing with a NaN operand is unknown, not `false`.
//!   `not` keeps unknown unknown; `and`/`or` follow Kleene logic. Unknown
//!   bars emit `false`, so unavailable channels never count as signal truth
//! - `a |> b` is true only where `a[i-1] <= b[i-1]` and `a[i] > b[i]`;
//!   `a <| b` is the mirror image. Both are `false` at index 0
//! - `%` is floored modulo; division by zero follows IEEE-754

use crate::domain::error::OptitraderError;
use crate::domain::expr::{
    ArithOp, BoolExpr, ChannelRef, CmpOp, CompiledExpr, CrossDirection, NumExpr, Process,
    Transform,
};
use crate::domain::indicator::ma::calculate_ma;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

/// Scalar trial parameters, keyed by symbol.
pub type Bindings = BTreeMap<String, f64>;

/// Provider of resolved, aligned channels.
pub trait ChannelSource {
    fn len(&self) -> usize;
    fn channel(&self, alias: &str, channel: &str) -> Option<&[f64]>;
}

/// Channels already aligned onto one index.
#[derive(Debug, Clone, Default)]
pub struct ChannelTable {
    len: usize,
    channels: HashMap<(String, String), Vec<f64>>,
}

impl ChannelTable {
    pub fn new(len: usize) -> Self {
        Self {
            len,
            channels: HashMap::new(),
        }
    }

    pub fn insert(
        &mut self,
        alias: &str,
        channel: &str,
        values: Vec<f64>,
    ) -> Result<(), OptitraderError> {
        if values.len() != self.len {
            return Err(OptitraderError::Data {
                reason: format!(
                    "channel {alias}.{channel} has {} values, index has {}",
                    values.len(),
                    self.len
                ),
            });
        }
        self.channels
            .insert((alias.to_string(), channel.to_string()), values);
        Ok(())
    }
}

impl ChannelSource for ChannelTable {
    fn len(&self) -> usize {
        self.len
    }

    fn channel(&self, alias: &str, channel: &str) -> Option<&[f64]> {
        self.channels
            .get(&(alias.to_string(), channel.to_string()))
            .map(Vec::as_slice)
    }
}

enum Num<'a> {
    Scalar(f64),
    Series(Cow<'a, [f64]>),
}

impl Num<'_> {
    fn at(&self, i: usize) -> f64 {
        match self {
            Num::Scalar(v) => *v,
            Num::Series(s) => s[i],
        }
    }
}

pub fn evaluate(
    expr: &CompiledExpr,
    source: &dyn ChannelSource,
    bindings: &Bindings,
) -> Result<Vec<bool>, OptitraderError> {
    let ctx = Context {
        source,
        bindings,
        expression: expr.source(),
    };
    Ok(ctx
        .eval_bool(expr.root())?
        .into_iter()
        .map(|v| v.unwrap_or(false))
        .collect())
}

/// Per-bar truth value; `None` where an operand is not yet available.
type Truth = Vec<Option<bool>>;

struct Context<'a> {
    source: &'a dyn ChannelSource,
    bindings: &'a Bindings,
    expression: &'a str,
}

impl<'a> Context<'a> {
    fn fail(&self, reason: String) -> OptitraderError {
        OptitraderError::Validation {
            field: format!("expression '{}'", self.expression),
            reason,
        }
    }

    fn eval_bool(&self, expr: &BoolExpr) -> Result<Truth, OptitraderError> {
        let n = self.source.len();
        match expr {
            BoolExpr::Compare { op, lhs, rhs } => {
                let a = self.eval_num(lhs)?;
                let b = self.eval_num(rhs)?;
                Ok((0..n).map(|i| compare(*op, a.at(i), b.at(i))).collect())
            }
            BoolExpr::Cross {
                direction,
                lhs,
                rhs,
            } => {
                let a = self.eval_num(lhs)?;
                let b = self.eval_num(rhs)?;
                Ok((0..n)
                    .map(|i| {
                        if i == 0 {
                            (!a.at(0).is_nan() && !b.at(0).is_nan()).then_some(false)
                        } else {
                            crossed(*direction, a.at(i - 1), b.at(i - 1), a.at(i), b.at(i))
                        }
                    })
                    .collect())
            }
            BoolExpr::And(l, r) => {
                let l = self.eval_bool(l)?;
                let r = self.eval_bool(r)?;
                Ok(l.iter().zip(&r).map(|(a, b)| kleene_and(*a, *b)).collect())
            }
            BoolExpr::Or(l, r) => {
                let l = self.eval_bool(l)?;
                let r = self.eval_bool(r)?;
                Ok(l.iter().zip(&r).map(|(a, b)| kleene_or(*a, *b)).collect())
            }
            BoolExpr::Not(inner) => Ok(self
                .eval_bool(inner)?
                .into_iter()
                .map(|v| v.map(|b| !b))
                .collect()),
        }
    }

    fn eval_num(&self, expr: &NumExpr) -> Result<Num<'a>, OptitraderError> {
        match expr {
            NumExpr::Literal(v) => Ok(Num::Scalar(*v)),
            NumExpr::Symbol(name) => self
                .bindings
                .get(name)
                .map(|v| Num::Scalar(*v))
                .ok_or_else(|| self.fail(format!("parameter '{name}' is not bound"))),
            NumExpr::Channel(r) => self.channel(r),
            NumExpr::Binary { op, lhs, rhs } => {
                let a = self.eval_num(lhs)?;
                let b = self.eval_num(rhs)?;
                Ok(match (&a, &b) {
                    (Num::Scalar(x), Num::Scalar(y)) => Num::Scalar(arith(*op, *x, *y)),
                    _ => Num::Series(Cow::Owned(
                        (0..self.source.len())
                            .map(|i| arith(*op, a.at(i), b.at(i)))
                            .collect(),
                    )),
                })
            }
        }
    }

    fn channel(&self, r: &ChannelRef) -> Result<Num<'a>, OptitraderError> {
        let values = self
            .source
            .channel(&r.alias, &r.channel)
            .ok_or_else(|| self.fail(format!("channel {r} is not available")))?;
        Ok(match r.transform {
            None => Num::Series(Cow::Borrowed(values)),
            Some(t) => Num::Series(Cow::Owned(apply_transform(t, values))),
        })
    }
}

fn compare(op: CmpOp, a: f64, b: f64) -> Option<bool> {
    if a.is_nan() || b.is_nan() {
        return None;
    }
    Some(match op {
        CmpOp::Lt => a < b,
        CmpOp::Gt => a > b,
        CmpOp::Eq => a == b,
        CmpOp::Ge => a >= b,
        CmpOp::Le => a <= b,
        CmpOp::Ne => a != b,
    })
}

fn crossed(direction: CrossDirection, a_prev: f64, b_prev: f64, a: f64, b: f64) -> Option<bool> {
    if [a_prev, b_prev, a, b].iter().any(|v| v.is_nan()) {
        return None;
    }
    Some(match direction {
        CrossDirection::Above => a_prev <= b_prev && a > b,
        CrossDirection::Below => a_prev >= b_prev && a < b,
    })
}

fn kleene_and(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    }
}

fn kleene_or(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        _ => None,
    }
}

fn arith(op: ArithOp, a: f64, b: f64) -> f64 {
    match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => a / b,
        ArithOp::Mod => {
            if b == 0.0 {
                f64::NAN
            } else {
                a - b * (a / b).floor()
            }
        }
    }
}

/// Rolling transform over a channel. Incomplete windows and windows holding
/// NaN produce NaN.
pub fn apply_transform(t: Transform, values: &[f64]) -> Vec<f64> {
    let w = t.window;
    match t.process {
        Process::Diff => values
            .iter()
            .enumerate()
            .map(|(i, v)| if i < w { f64::NAN } else { v - values[i - w] })
            .collect(),
        Process::Mean => calculate_ma(values, w),
        Process::Median => (0..values.len())
            .map(|i| {
                if i + 1 < w {
                    return f64::NAN;
                }
                let mut window: Vec<f64> = values[i + 1 - w..=i].to_vec();
                if window.iter().any(|v| v.is_nan()) {
                    return f64::NAN;
                }
                window.sort_by(f64::total_cmp);
                if w % 2 == 1 {
                    window[w / 2]
                } else {
                    (window[w / 2 - 1] + window[w / 2]) / 2.0
                }
            })
            .collect(),
    }
}
