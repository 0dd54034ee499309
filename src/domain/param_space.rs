//! Parameter search space.
//!
//! A tunable symbol is declared as a fixed scalar, a `[low, high]` pair or a
//! `[low, high, step]` triple. All-integer bounds give integer suggestions;
//! any float bound makes the whole range float.

use crate::domain::error::OptitraderError;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Decimal places kept when snapping float values to a step grid.
const GRID_DECIMALS: f64 = 1e12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
}

impl ParamValue {
    pub fn as_f64(self) -> f64 {
        match self {
            ParamValue::Int(v) => v as f64,
            ParamValue::Float(v) => v,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
        }
    }
}

/// One complete assignment of every tunable symbol.
pub type ParamAssignment = BTreeMap<String, ParamValue>;

#[derive(Debug, Clone, PartialEq)]
pub enum ParamSpec {
    Fixed(ParamValue),
    Int { low: i64, high: i64, step: i64 },
    Float { low: f64, high: f64, step: Option<f64> },
}

impl ParamSpec {
    /// Parse a request value: a number, `[low, high]` or `[low, high, step]`.
    pub fn from_json(name: &str, value: &Value) -> Result<Self, OptitraderError> {
        let invalid = |reason: String| OptitraderError::InvalidParameterRange {
            name: name.to_string(),
            reason,
        };

        match value {
            Value::Number(n) => {
                let v = number_value(n).ok_or_else(|| invalid(format!("{n} is not finite")))?;
                Ok(ParamSpec::Fixed(v))
            }
            Value::Array(items) => {
                if items.len() != 2 && items.len() != 3 {
                    return Err(invalid(format!(
                        "expected [low, high] or [low, high, step], got {} elements",
                        items.len()
                    )));
                }
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    let v = match item {
                        Value::Number(n) => number_value(n),
                        _ => None,
                    }
                    .ok_or_else(|| invalid(format!("'{item}' is not a number")))?;
                    values.push(v);
                }
                Self::range(&values).map_err(invalid)
            }
            other => Err(invalid(format!(
                "expected a number or a range array, got {other}"
            ))),
        }
    }

    fn range(values: &[ParamValue]) -> Result<Self, String> {
        let all_int = values.iter().all(|v| matches!(v, ParamValue::Int(_)));
        if all_int {
            let ints: Vec<i64> = values
                .iter()
                .map(|v| match v {
                    ParamValue::Int(i) => *i,
                    ParamValue::Float(f) => *f as i64,
                })
                .collect();
            let (low, high) = (ints[0], ints[1]);
            let step = ints.get(2).copied().unwrap_or(1);
            if low > high {
                return Err(format!("low {low} exceeds high {high}"));
            }
            if step <= 0 {
                return Err(format!("step must be positive, got {step}"));
            }
            return Ok(ParamSpec::Int { low, high, step });
        }

        let floats: Vec<f64> = values.iter().map(|v| v.as_f64()).collect();
        let (low, high) = (floats[0], floats[1]);
        let step = floats.get(2).copied();
        if low > high {
            return Err(format!("low {low} exceeds high {high}"));
        }
        if let Some(s) = step {
            if s <= 0.0 {
                return Err(format!("step must be positive, got {s}"));
            }
        }
        Ok(ParamSpec::Float { low, high, step })
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self, ParamSpec::Fixed(_))
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ParamSpec::Int { .. } | ParamSpec::Fixed(ParamValue::Int(_))
        )
    }

    pub fn low(&self) -> f64 {
        match self {
            ParamSpec::Fixed(v) => v.as_f64(),
            ParamSpec::Int { low, .. } => *low as f64,
            ParamSpec::Float { low, .. } => *low,
        }
    }

    pub fn high(&self) -> f64 {
        match self {
            ParamSpec::Fixed(v) => v.as_f64(),
            ParamSpec::Int { high, .. } => *high as f64,
            ParamSpec::Float { high, .. } => *high,
        }
    }

    /// Number of grid points above `low`, for stepped ranges.
    pub fn grid_steps(&self) -> Option<u64> {
        match self {
            ParamSpec::Fixed(_) => Some(0),
            ParamSpec::Int { low, high, step } => Some(((high - low) / step) as u64),
            ParamSpec::Float {
                low,
                high,
                step: Some(step),
            } => Some(((high - low) / step + 1e-9).floor() as u64),
            ParamSpec::Float { step: None, .. } => None,
        }
    }

    /// The `k`-th grid point.
    pub fn grid_point(&self, k: u64) -> ParamValue {
        match self {
            ParamSpec::Fixed(v) => *v,
            ParamSpec::Int { low, step, .. } => ParamValue::Int(low + step * k as i64),
            ParamSpec::Float { low, step, .. } => {
                let v = low + step.unwrap_or(0.0) * k as f64;
                ParamValue::Float((v * GRID_DECIMALS).round() / GRID_DECIMALS)
            }
        }
    }

    /// Project an arbitrary real onto the nearest legal value.
    pub fn snap(&self, x: f64) -> ParamValue {
        match self {
            ParamSpec::Fixed(v) => *v,
            ParamSpec::Float {
                low,
                high,
                step: None,
            } => ParamValue::Float(x.clamp(*low, *high)),
            _ => {
                let steps = self.grid_steps().unwrap_or(0);
                let step = match self {
                    ParamSpec::Int { step, .. } => *step as f64,
                    ParamSpec::Float { step, .. } => step.unwrap_or(1.0),
                    ParamSpec::Fixed(_) => 1.0,
                };
                let k = ((x - self.low()) / step).round().clamp(0.0, steps as f64);
                self.grid_point(k as u64)
            }
        }
    }

    pub fn contains(&self, value: &ParamValue) -> bool {
        match (self, value) {
            (ParamSpec::Fixed(f), v) => f == v,
            (ParamSpec::Int { low, high, step }, ParamValue::Int(v)) => {
                v >= low && v <= high && (v - low) % step == 0
            }
            (ParamSpec::Float { low, high, step }, ParamValue::Float(v)) => {
                if *v < *low || *v > *high {
                    return false;
                }
                match step {
                    None => true,
                    Some(s) => {
                        let k = ((v - low) / s).round();
                        (low + k * s - v).abs() < 1e-9
                    }
                }
            }
            _ => false,
        }
    }
}

fn number_value(n: &serde_json::Number) -> Option<ParamValue> {
    if let Some(i) = n.as_i64() {
        return Some(ParamValue::Int(i));
    }
    n.as_f64().filter(|f| f.is_finite()).map(ParamValue::Float)
}

/// Every tunable symbol of a study, by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchSpace {
    params: BTreeMap<String, ParamSpec>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, spec: ParamSpec) -> Result<(), OptitraderError> {
        let name = name.into();
        if self.params.contains_key(&name) {
            return Err(OptitraderError::Validation {
                field: name,
                reason: "parameter declared twice".into(),
            });
        }
        self.params.insert(name, spec);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.params.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamSpec)> {
        self.params.iter()
    }

    /// Parameters the sampler must choose.
    pub fn ranged(&self) -> impl Iterator<Item = (&String, &ParamSpec)> {
        self.params.iter().filter(|(_, s)| !s.is_fixed())
    }

    pub fn fixed_assignment(&self) -> ParamAssignment {
        self.params
            .iter()
            .filter_map(|(k, s)| match s {
                ParamSpec::Fixed(v) => Some((k.clone(), *v)),
                _ => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(v: Value) -> ParamSpec {
        ParamSpec::from_json("p", &v).unwrap()
    }

    #[test]
    fn scalar_is_fixed() {
        assert_eq!(spec(json!(14)), ParamSpec::Fixed(ParamValue::Int(14)));
        assert_eq!(spec(json!(0.5)), ParamSpec::Fixed(ParamValue::Float(0.5)));
    }

    #[test]
    fn integer_pair() {
        assert_eq!(
            spec(json!([10, 20])),
            ParamSpec::Int {
                low: 10,
                high: 20,
                step: 1
            }
        );
    }

    #[test]
    fn float_pair() {
        assert_eq!(
            spec(json!([10.0, 20.0])),
            ParamSpec::Float {
                low: 10.0,
                high: 20.0,
                step: None
            }
        );
        assert!(!spec(json!([10, 20.5])).is_integer());
    }

    #[test]
    fn stepped_triple() {
        assert_eq!(
            spec(json!([0, 1, 0.25])),
            ParamSpec::Float {
                low: 0.0,
                high: 1.0,
                step: Some(0.25)
            }
        );
        assert_eq!(
            spec(json!([10, 30, 5])),
            ParamSpec::Int {
                low: 10,
                high: 30,
                step: 5
            }
        );
    }

    #[test]
    fn rejects_bad_shapes() {
        for bad in [
            json!([1]),
            json!([1, 2, 3, 4]),
            json!([]),
            json!("10"),
            json!([1, "x"]),
            json!([5, 1]),
            json!([1, 5, 0]),
            json!([0.0, 1.0, -0.1]),
            json!(null),
        ] {
            let res = ParamSpec::from_json("p", &bad);
            assert!(
                matches!(res, Err(OptitraderError::InvalidParameterRange { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn grid_points_of_float_step() {
        let s = spec(json!([0, 1, 0.25]));
        assert_eq!(s.grid_steps(), Some(4));
        let points: Vec<f64> = (0..=4).map(|k| s.grid_point(k).as_f64()).collect();
        assert_eq!(points, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn grid_point_rounds_float_noise() {
        let s = spec(json!([0.0, 1.0, 0.1]));
        assert_eq!(s.grid_point(3), ParamValue::Float(0.3));
    }

    #[test]
    fn snap_to_grid() {
        let s = spec(json!([10, 20]));
        assert_eq!(s.snap(14.6), ParamValue::Int(15));
        assert_eq!(s.snap(-3.0), ParamValue::Int(10));
        assert_eq!(s.snap(99.0), ParamValue::Int(20));

        let s = spec(json!([0, 1, 0.25]));
        assert_eq!(s.snap(0.6), ParamValue::Float(0.5));
        assert_eq!(s.snap(0.9), ParamValue::Float(1.0));

        let s = spec(json!([1.0, 2.0]));
        assert_eq!(s.snap(1.2345), ParamValue::Float(1.2345));
        assert_eq!(s.snap(5.0), ParamValue::Float(2.0));
    }

    #[test]
    fn contains_respects_type_and_grid() {
        let s = spec(json!([10, 30, 5]));
        assert!(s.contains(&ParamValue::Int(15)));
        assert!(!s.contains(&ParamValue::Int(16)));
        assert!(!s.contains(&ParamValue::Float(15.0)));
    }

    #[test]
    fn search_space_splits_fixed_and_ranged() {
        let mut space = SearchSpace::new();
        space.insert("a.window", spec(json!([10, 20]))).unwrap();
        space.insert("fee", spec(json!(0.001))).unwrap();
        assert_eq!(space.ranged().count(), 1);
        let fixed = space.fixed_assignment();
        assert_eq!(fixed.get("fee"), Some(&ParamValue::Float(0.001)));
        assert!(space.insert("fee", spec(json!(0.002))).is_err());
    }
}
