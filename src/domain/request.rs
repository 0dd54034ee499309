//! Study requests and their validation.
//!
//! A [`StudyRequest`] is the JSON boundary. [`StudyRequest::validate`] turns
//! it into a [`StudyPlan`] or rejects it before any data is fetched.

use crate::domain::error::OptitraderError;
use crate::domain::evaluator::{Normalize, StrategyPlan};
use crate::domain::expr::{Process, SymbolTable};
use crate::domain::expr_parser::compile;
use crate::domain::indicator::IndicatorKind;
use crate::domain::objective::Objective;
use crate::domain::ohlcv::PriceField;
use crate::domain::param_space::{ParamSpec, SearchSpace};
use crate::domain::settings::{CrossValidationSettings, Limits};
use crate::domain::simulation::{RISK_PARAMS, TradeDirection};
use crate::domain::timeframe::Timeframe;
use chrono::{FixedOffset, NaiveDateTime, TimeZone};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

pub use crate::domain::evaluator::{CompiledPair, ResolvedIndicator};

pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M";
pub const MIN_ALIAS_LEN: usize = 3;
pub const MAX_ALIAS_LEN: usize = 20;

const FLOW_WORDS: [&str; 3] = ["and", "or", "not"];

#[derive(Debug, Clone, Deserialize)]
pub struct StudyRequest {
    pub symbol: String,
    pub testing_period: TestingPeriod,
    /// Base timeframe; required when no indicator names one.
    #[serde(default)]
    pub timeframe: Option<String>,
    #[serde(default)]
    pub indicators: Vec<IndicatorSpec>,
    #[serde(default)]
    pub custom_ranges: BTreeMap<String, Value>,
    pub trigger_pairs: Vec<TriggerPair>,
    #[serde(default)]
    pub risk: RiskRanges,
    pub n_trials: usize,
    pub objective: String,
    #[serde(default)]
    pub cross_validation: bool,
    #[serde(default)]
    pub n_folds: Option<usize>,
    #[serde(default)]
    pub split_fraction: Option<f64>,
    #[serde(default)]
    pub direction: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TestingPeriod {
    pub start: String,
    pub end: String,
    #[serde(default = "default_tz")]
    pub tz: String,
}

fn default_tz() -> String {
    "UTC".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndicatorSpec {
    pub alias: String,
    #[serde(rename = "indicator")]
    pub kind: String,
    pub timeframe: String,
    #[serde(default)]
    pub normalize: Normalize,
    /// Indicator parameters: a fixed number, `[low, high]` or `[low, high, step]`.
    #[serde(flatten)]
    pub params: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TriggerPair {
    pub alias: String,
    pub entry: String,
    pub exit: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RiskRanges {
    pub sl_stop: Option<Value>,
    pub tp_stop: Option<Value>,
    pub tsl_stop: Option<Value>,
    pub fee: Option<Value>,
    pub slippage: Option<Value>,
}

impl RiskRanges {
    fn entries(&self) -> [(&'static str, Option<&Value>); 5] {
        [
            ("sl_stop", self.sl_stop.as_ref()),
            ("tp_stop", self.tp_stop.as_ref()),
            ("tsl_stop", self.tsl_stop.as_ref()),
            ("fee", self.fee.as_ref()),
            ("slippage", self.slippage.as_ref()),
        ]
    }
}

/// A validated, compiled study.
#[derive(Debug, Clone)]
pub struct StudyPlan {
    pub symbol: String,
    /// UTC bounds of the testing period.
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub timeframes: BTreeSet<Timeframe>,
    pub strategy: StrategyPlan,
    pub space: SearchSpace,
    pub n_trials: usize,
    pub cross_validation: bool,
    pub n_folds: usize,
    pub split_fraction: f64,
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> OptitraderError {
    OptitraderError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

impl TestingPeriod {
    /// Parse both bounds and convert them to UTC.
    pub fn resolve(&self) -> Result<(NaiveDateTime, NaiveDateTime), OptitraderError> {
        let offset = parse_tz(&self.tz)?;
        let start = parse_local("testing_period.start", &self.start, &offset)?;
        let end = parse_local("testing_period.end", &self.end, &offset)?;
        if start >= end {
            return Err(invalid(
                "testing_period",
                format!("start {} must be before end {}", self.start, self.end),
            ));
        }
        Ok((start, end))
    }
}

/// `UTC`/`Z` or a fixed `±HH:MM` offset.
fn parse_tz(tz: &str) -> Result<FixedOffset, OptitraderError> {
    let bad = || invalid("testing_period.tz", format!("'{tz}' is not UTC or a ±HH:MM offset"));
    let tz = tz.trim();
    if tz.eq_ignore_ascii_case("utc") || tz == "Z" {
        return FixedOffset::east_opt(0).ok_or_else(bad);
    }
    let (sign, rest) = match tz.as_bytes().first() {
        Some(b'+') => (1, &tz[1..]),
        Some(b'-') => (-1, &tz[1..]),
        _ => return Err(bad()),
    };
    let (hh, mm) = rest.split_once(':').ok_or_else(bad)?;
    let hours: i32 = hh.parse().map_err(|_| bad())?;
    let minutes: i32 = mm.parse().map_err(|_| bad())?;
    if hh.len() != 2 || mm.len() != 2 || hours > 23 || minutes > 59 {
        return Err(bad());
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(bad)
}

fn parse_local(
    field: &str,
    text: &str,
    offset: &FixedOffset,
) -> Result<NaiveDateTime, OptitraderError> {
    let local = NaiveDateTime::parse_from_str(text.trim(), TIME_FORMAT)
        .map_err(|_| invalid(field, format!("'{text}' is not in YYYY-MM-DD HH:MM format")))?;
    offset
        .from_local_datetime(&local)
        .single()
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| invalid(field, format!("'{text}' is ambiguous in the given offset")))
}

fn is_reserved(name: &str) -> bool {
    PriceField::from_name(name).is_some()
        || FLOW_WORDS.contains(&name)
        || IndicatorKind::from_name(name).is_some()
        || Process::from_name(name).is_some()
        || RISK_PARAMS.contains(&name)
}

fn validate_identifier(field: &str, name: &str) -> Result<(), OptitraderError> {
    let mut chars = name.chars();
    let starts_alpha = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    if !starts_alpha || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(invalid(
            field,
            format!("'{name}' must start with a letter and contain only letters, digits and '_'"),
        ));
    }
    if name.contains("__") {
        return Err(invalid(field, format!("'{name}' must not contain '__'")));
    }
    if is_reserved(name) {
        return Err(invalid(field, format!("'{name}' is a reserved word")));
    }
    Ok(())
}

fn validate_alias(alias: &str) -> Result<(), OptitraderError> {
    let len = alias.chars().count();
    if !(MIN_ALIAS_LEN..=MAX_ALIAS_LEN).contains(&len) {
        return Err(invalid(
            "alias",
            format!("'{alias}' must be {MIN_ALIAS_LEN} to {MAX_ALIAS_LEN} characters"),
        ));
    }
    validate_identifier("alias", alias)
}

impl StudyRequest {
    pub fn from_json(text: &str) -> Result<Self, OptitraderError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn validate(
        &self,
        limits: &Limits,
        cv: &CrossValidationSettings,
    ) -> Result<StudyPlan, OptitraderError> {
        if self.symbol.trim().is_empty() {
            return Err(invalid("symbol", "must not be empty"));
        }
        let (start, end) = self.testing_period.resolve()?;

        if self.n_trials == 0 || self.n_trials > limits.max_trials {
            return Err(invalid(
                "n_trials",
                format!("must be between 1 and {}, got {}", limits.max_trials, self.n_trials),
            ));
        }
        let objective: Objective = self.objective.parse()?;
        let direction = match self.direction.as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("long") => TradeDirection::Long,
            Some("short") => TradeDirection::Short,
            Some(other) => {
                return Err(invalid(
                    "direction",
                    format!("'{other}' is not supported; accepted values are 'long' and 'short'"),
                ));
            }
        };

        if self.indicators.len() > limits.max_indicators {
            return Err(invalid(
                "indicators",
                format!(
                    "{} indicators exceed the limit of {}",
                    self.indicators.len(),
                    limits.max_indicators
                ),
            ));
        }

        let mut timeframes = BTreeSet::new();
        if let Some(tf) = &self.timeframe {
            timeframes.insert(tf.parse::<Timeframe>()?);
        }

        let mut space = SearchSpace::new();
        let mut symbols = SymbolTable::new();
        let mut indicators = Vec::with_capacity(self.indicators.len());
        let mut seen = BTreeSet::new();

        for spec in &self.indicators {
            let resolved = resolve_indicator(spec, &mut space)?;
            if !seen.insert(spec.alias.clone()) {
                return Err(invalid("alias", format!("'{}' is declared twice", spec.alias)));
            }
            symbols.add_indicator(&resolved.alias, resolved.kind);
            timeframes.insert(resolved.timeframe.clone());
            indicators.push(resolved);
        }

        if timeframes.is_empty() {
            return Err(invalid(
                "timeframe",
                "a base timeframe is required when no indicator declares one",
            ));
        }

        let mut scalars = Vec::with_capacity(self.custom_ranges.len());
        for (name, value) in &self.custom_ranges {
            validate_identifier("custom_ranges", name)?;
            if seen.contains(name) {
                return Err(invalid(
                    "custom_ranges",
                    format!("'{name}' collides with an indicator alias"),
                ));
            }
            space.insert(name.clone(), ParamSpec::from_json(name, value)?)?;
            symbols.add_scalar(name);
            scalars.push(name.clone());
        }

        for (name, value) in self.risk.entries() {
            let Some(value) = value else { continue };
            let spec = ParamSpec::from_json(name, value)?;
            if spec.low() < 0.0 {
                return Err(OptitraderError::InvalidParameterRange {
                    name: name.to_string(),
                    reason: "risk parameters must be non-negative".into(),
                });
            }
            space.insert(name, spec)?;
        }

        if self.trigger_pairs.is_empty() {
            return Err(invalid("trigger_pairs", "at least one trigger pair is required"));
        }
        let mut pairs = Vec::with_capacity(self.trigger_pairs.len());
        for pair in &self.trigger_pairs {
            let compile_side = |side: &str, text: &str| {
                compile(text, &symbols, limits.max_expression_len).map_err(|source| {
                    OptitraderError::Compile {
                        pair: pair.alias.clone(),
                        side: side.to_string(),
                        source,
                    }
                })
            };
            pairs.push(CompiledPair {
                alias: pair.alias.clone(),
                entry: compile_side("entry", &pair.entry)?,
                exit: compile_side("exit", &pair.exit)?,
            });
        }

        let span = (end - start).num_seconds();
        for tf in &timeframes {
            let periods = span / tf.seconds();
            if periods > limits.max_periods_per_timeframe as i64 {
                return Err(invalid(
                    "testing_period",
                    format!(
                        "{periods} {tf} periods exceed the limit of {}",
                        limits.max_periods_per_timeframe
                    ),
                ));
            }
        }

        let n_folds = self.n_folds.unwrap_or(cv.n_folds);
        if n_folds == 0 {
            return Err(invalid("n_folds", "must be at least 1"));
        }
        let split_fraction = self.split_fraction.unwrap_or(cv.split_fraction);
        if !(split_fraction > 0.0 && split_fraction < 1.0) {
            return Err(invalid("split_fraction", "must be strictly between 0 and 1"));
        }

        Ok(StudyPlan {
            symbol: self.symbol.trim().to_string(),
            start,
            end,
            timeframes,
            strategy: StrategyPlan {
                indicators,
                pairs,
                scalars,
                objective,
                direction,
            },
            space,
            n_trials: self.n_trials,
            cross_validation: self.cross_validation,
            n_folds,
            split_fraction,
        })
    }
}

fn resolve_indicator(
    spec: &IndicatorSpec,
    space: &mut SearchSpace,
) -> Result<ResolvedIndicator, OptitraderError> {
    validate_alias(&spec.alias)?;
    let kind = IndicatorKind::from_name(&spec.kind).ok_or_else(|| {
        OptitraderError::UnknownIndicator {
            alias: spec.alias.clone(),
            name: spec.kind.clone(),
        }
    })?;
    let timeframe: Timeframe = spec.timeframe.parse()?;

    if let Normalize::Channels(list) = &spec.normalize {
        if let Some(bad) = list.iter().find(|c| !kind.channels().contains(&c.as_str())) {
            return Err(invalid(
                "normalize",
                format!(
                    "{kind} has no channel '{bad}' (available: {})",
                    kind.channels().join(", ")
                ),
            ));
        }
    }

    for (name, value) in &spec.params {
        let key = format!("{}.{}", spec.alias, name);
        let def = kind.param(name).ok_or_else(|| OptitraderError::InvalidParameterRange {
            name: key.clone(),
            reason: format!("{kind} has no parameter '{name}'"),
        })?;
        let range = ParamSpec::from_json(&key, value)?;
        if def.integer && !range.is_integer() {
            return Err(OptitraderError::InvalidParameterRange {
                name: key,
                reason: "must be an integer or an integer range".into(),
            });
        }
        if range.low() <= 0.0 {
            return Err(OptitraderError::InvalidParameterRange {
                name: key,
                reason: "must be positive".into(),
            });
        }
        space.insert(key, range)?;
    }

    Ok(ResolvedIndicator {
        alias: spec.alias.clone(),
        kind,
        timeframe,
        normalize: spec.normalize.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_request() -> Value {
        json!({
            "symbol": "BTCUSDT",
            "testing_period": {"start": "2024-01-01 00:00", "end": "2024-03-01 00:00"},
            "indicators": [
                {"alias": "slow_ma", "indicator": "ma", "timeframe": "1h", "window": [10, 20]}
            ],
            "trigger_pairs": [
                {"alias": "main", "entry": "close > slow_ma", "exit": "close < slow_ma"}
            ],
            "n_trials": 5,
            "objective": "total_return"
        })
    }

    fn validate(v: Value) -> Result<StudyPlan, OptitraderError> {
        let req: StudyRequest = serde_json::from_value(v).unwrap();
        req.validate(&Limits::default(), &CrossValidationSettings::default())
    }

    #[test]
    fn valid_request_produces_plan() {
        let plan = validate(base_request()).unwrap();
        assert_eq!(plan.symbol, "BTCUSDT");
        assert_eq!(plan.n_trials, 5);
        assert_eq!(plan.strategy.objective, Objective::TotalReturn);
        assert_eq!(plan.strategy.direction, TradeDirection::Long);
        assert!(matches!(
            plan.space.get("slow_ma.window"),
            Some(ParamSpec::Int { low: 10, high: 20, .. })
        ));
        assert_eq!(plan.timeframes.len(), 1);
        assert_eq!(plan.n_folds, 3);
    }

    #[test]
    fn timezone_offset_shifts_to_utc() {
        let mut v = base_request();
        v["testing_period"]["tz"] = json!("+02:00");
        let plan = validate(v).unwrap();
        assert_eq!(plan.start.format("%Y-%m-%d %H:%M").to_string(), "2023-12-31 22:00");
    }

    #[test]
    fn bad_timezone_rejected() {
        let mut v = base_request();
        v["testing_period"]["tz"] = json!("Mars/Olympus");
        assert!(matches!(validate(v), Err(OptitraderError::Validation { .. })));
    }

    #[test]
    fn start_after_end_rejected() {
        let mut v = base_request();
        v["testing_period"]["start"] = json!("2024-05-01 00:00");
        assert!(validate(v).is_err());
    }

    #[test]
    fn alias_rules() {
        for bad in ["ab", "1abc", "has space", "close", "rsi", "a_very_long_alias_name_here", "my__ma"] {
            let mut v = base_request();
            v["indicators"][0]["alias"] = json!(bad);
            assert!(validate(v).is_err(), "alias '{bad}' should be rejected");
        }
    }

    #[test]
    fn duplicate_alias_rejected() {
        let mut v = base_request();
        let ind = v["indicators"][0].clone();
        v["indicators"].as_array_mut().unwrap().push(ind);
        assert!(validate(v).is_err());
    }

    #[test]
    fn unknown_indicator_rejected() {
        let mut v = base_request();
        v["indicators"][0]["indicator"] = json!("ichimoku");
        assert!(matches!(validate(v), Err(OptitraderError::UnknownIndicator { .. })));
    }

    #[test]
    fn unknown_parameter_rejected() {
        let mut v = base_request();
        v["indicators"][0]["timeperiod"] = json!(5);
        assert!(matches!(
            validate(v),
            Err(OptitraderError::InvalidParameterRange { .. })
        ));
    }

    #[test]
    fn float_range_for_integer_param_rejected() {
        let mut v = base_request();
        v["indicators"][0]["window"] = json!([10.5, 20.0]);
        assert!(matches!(
            validate(v),
            Err(OptitraderError::InvalidParameterRange { .. })
        ));
    }

    #[test]
    fn bad_range_tuple_rejected() {
        let mut v = base_request();
        v["indicators"][0]["window"] = json!([10, 20, 2, 4]);
        assert!(matches!(
            validate(v),
            Err(OptitraderError::InvalidParameterRange { .. })
        ));
    }

    #[test]
    fn unsupported_objective_rejected() {
        let mut v = base_request();
        v["objective"] = json!("profit_factor");
        assert!(matches!(
            validate(v),
            Err(OptitraderError::UnsupportedObjective { .. })
        ));
    }

    #[test]
    fn compile_error_names_pair_and_side() {
        let mut v = base_request();
        v["trigger_pairs"][0]["exit"] = json!("close < fast_ma");
        match validate(v) {
            Err(OptitraderError::Compile { pair, side, .. }) => {
                assert_eq!(pair, "main");
                assert_eq!(side, "exit");
            }
            other => panic!("expected compile error, got {other:?}"),
        }
    }

    #[test]
    fn forbidden_token_rejected() {
        let mut v = base_request();
        v["trigger_pairs"][0]["entry"] = json!("close > __import__");
        assert!(matches!(validate(v), Err(OptitraderError::Compile { .. })));
    }

    #[test]
    fn trial_limit_enforced() {
        let mut v = base_request();
        v["n_trials"] = json!(5000);
        assert!(validate(v).is_err());
        let mut v = base_request();
        v["n_trials"] = json!(0);
        assert!(validate(v).is_err());
    }

    #[test]
    fn indicator_limit_enforced() {
        let mut v = base_request();
        let indicators: Vec<Value> = (0..11)
            .map(|i| json!({"alias": format!("ma{i:02}"), "indicator": "ma", "timeframe": "1h"}))
            .collect();
        v["indicators"] = json!(indicators);
        assert!(validate(v).is_err());
    }

    #[test]
    fn period_limit_enforced() {
        let mut v = base_request();
        v["indicators"][0]["timeframe"] = json!("1m");
        v["testing_period"]["end"] = json!("2024-12-31 00:00");
        assert!(validate(v).is_err());
    }

    #[test]
    fn custom_ranges_become_scalars() {
        let mut v = base_request();
        v["custom_ranges"] = json!({"level": [0.0, 1.0]});
        v["trigger_pairs"][0]["entry"] = json!("close > slow_ma * level");
        let plan = validate(v).unwrap();
        assert_eq!(plan.strategy.scalars, vec!["level".to_string()]);
        assert!(plan.space.get("level").is_some());
    }

    #[test]
    fn risk_ranges_join_space() {
        let mut v = base_request();
        v["risk"] = json!({"sl_stop": [0.01, 0.1], "fee": 0.001});
        let plan = validate(v).unwrap();
        assert!(plan.space.get("sl_stop").is_some());
        assert!(plan.space.get("fee").unwrap().is_fixed());
    }

    #[test]
    fn negative_risk_rejected() {
        let mut v = base_request();
        v["risk"] = json!({"fee": -0.1});
        assert!(validate(v).is_err());
    }

    #[test]
    fn price_only_strategy_needs_timeframe() {
        let mut v = base_request();
        v["indicators"] = json!([]);
        v["trigger_pairs"][0] = json!({"alias": "p", "entry": "close > 100", "exit": "close < 90"});
        assert!(validate(v.clone()).is_err());
        v["timeframe"] = json!("4h");
        assert!(validate(v).is_ok());
    }

    #[test]
    fn normalize_channels_checked() {
        let mut v = base_request();
        v["indicators"][0]["normalize"] = json!(["upper"]);
        assert!(validate(v).is_err());
        let mut v = base_request();
        v["indicators"][0]["normalize"] = json!(true);
        let plan = validate(v).unwrap();
        assert_eq!(plan.strategy.indicators[0].normalize, Normalize::All(true));
    }

    #[test]
    fn short_direction_and_cv_overrides() {
        let mut v = base_request();
        v["direction"] = json!("short");
        v["cross_validation"] = json!(true);
        v["n_folds"] = json!(4);
        v["split_fraction"] = json!(0.6);
        let plan = validate(v).unwrap();
        assert_eq!(plan.strategy.direction, TradeDirection::Short);
        assert!(plan.cross_validation);
        assert_eq!(plan.n_folds, 4);
        assert_eq!(plan.split_fraction, 0.6);

        let mut v = base_request();
        v["direction"] = json!("both");
        let err = validate(v).unwrap_err();
        assert!(matches!(err, OptitraderError::Validation { .. }));
        let msg = err.to_string();
        assert!(msg.contains("'both'") && msg.contains("'long'") && msg.contains("'short'"), "{msg}");
    }
}
