//! Technical indicator library.
//!
//! - `IndicatorKind`: indicator identity, its channels and parameter table
//! - `IndicatorParams`: a fully resolved parameter set (defaults plus trial values)
//! - `IndicatorOutput`: named channels, each a dense series with NaN warmup

pub mod adx;
pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod ma;
pub mod macd;
pub mod mfi;
pub mod mom;
pub mod rsi;

use crate::domain::error::OptitraderError;
use crate::domain::ohlcv::OhlcvBar;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// One tunable input of an indicator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamDef {
    pub name: &'static str,
    pub default: f64,
    /// Window-like parameters must be positive integers.
    pub integer: bool,
}

const fn window(name: &'static str, default: f64) -> ParamDef {
    ParamDef {
        name,
        default,
        integer: true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorKind {
    Ma,
    Ema,
    Rsi,
    Mom,
    Atr,
    Adx,
    Bbands,
    Macd,
    Mfi,
}

impl IndicatorKind {
    pub const ALL: [IndicatorKind; 9] = [
        IndicatorKind::Ma,
        IndicatorKind::Ema,
        IndicatorKind::Rsi,
        IndicatorKind::Mom,
        IndicatorKind::Atr,
        IndicatorKind::Adx,
        IndicatorKind::Bbands,
        IndicatorKind::Macd,
        IndicatorKind::Mfi,
    ];

    pub fn name(self) -> &'static str {
        match self {
            IndicatorKind::Ma => "ma",
            IndicatorKind::Ema => "ema",
            IndicatorKind::Rsi => "rsi",
            IndicatorKind::Mom => "mom",
            IndicatorKind::Atr => "atr",
            IndicatorKind::Adx => "adx",
            IndicatorKind::Bbands => "bbands",
            IndicatorKind::Macd => "macd",
            IndicatorKind::Mfi => "mfi",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        Self::ALL.into_iter().find(|k| k.name() == lower)
    }

    pub fn channels(self) -> &'static [&'static str] {
        match self {
            IndicatorKind::Ma => &["ma"],
            IndicatorKind::Bbands => &["lower", "middle", "upper", "bandwidth"],
            IndicatorKind::Macd => &["macd", "signal", "hist"],
            _ => &["real"],
        }
    }

    pub fn default_channel(self) -> &'static str {
        match self {
            IndicatorKind::Ma => "ma",
            IndicatorKind::Bbands => "bandwidth",
            IndicatorKind::Macd => "hist",
            _ => "real",
        }
    }

    pub fn params(self) -> &'static [ParamDef] {
        const MA: [ParamDef; 1] = [window("window", 30.0)];
        const EMA: [ParamDef; 1] = [window("timeperiod", 30.0)];
        const PERIOD_14: [ParamDef; 1] = [window("timeperiod", 14.0)];
        const MOM: [ParamDef; 1] = [window("timeperiod", 10.0)];
        const BBANDS: [ParamDef; 2] = [
            window("window", 20.0),
            ParamDef {
                name: "alpha",
                default: 2.0,
                integer: false,
            },
        ];
        const MACD: [ParamDef; 3] = [
            window("fast_window", 12.0),
            window("slow_window", 26.0),
            window("signal_window", 9.0),
        ];
        match self {
            IndicatorKind::Ma => &MA,
            IndicatorKind::Ema => &EMA,
            IndicatorKind::Mom => &MOM,
            IndicatorKind::Rsi | IndicatorKind::Atr | IndicatorKind::Adx | IndicatorKind::Mfi => {
                &PERIOD_14
            }
            IndicatorKind::Bbands => &BBANDS,
            IndicatorKind::Macd => &MACD,
        }
    }

    pub fn param(self, name: &str) -> Option<&'static ParamDef> {
        self.params().iter().find(|p| p.name == name)
    }

    pub fn compute(
        self,
        bars: &[OhlcvBar],
        params: &IndicatorParams,
    ) -> Result<IndicatorOutput, OptitraderError> {
        let close: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let mut out = IndicatorOutput::default();
        match self {
            IndicatorKind::Ma => {
                out.insert("ma", ma::calculate_ma(&close, params.period("window")?));
            }
            IndicatorKind::Ema => {
                out.insert("real", ema::calculate_ema(&close, params.period("timeperiod")?));
            }
            IndicatorKind::Rsi => {
                out.insert("real", rsi::calculate_rsi(&close, params.period("timeperiod")?));
            }
            IndicatorKind::Mom => {
                out.insert("real", mom::calculate_mom(&close, params.period("timeperiod")?));
            }
            IndicatorKind::Atr => {
                out.insert("real", atr::calculate_atr(bars, params.period("timeperiod")?));
            }
            IndicatorKind::Adx => {
                out.insert("real", adx::calculate_adx(bars, params.period("timeperiod")?));
            }
            IndicatorKind::Mfi => {
                out.insert("real", mfi::calculate_mfi(bars, params.period("timeperiod")?));
            }
            IndicatorKind::Bbands => {
                let bands = bollinger::calculate_bbands(
                    &close,
                    params.period("window")?,
                    params.value("alpha")?,
                );
                out.insert("lower", bands.lower);
                out.insert("middle", bands.middle);
                out.insert("upper", bands.upper);
                out.insert("bandwidth", bands.bandwidth);
            }
            IndicatorKind::Macd => {
                let lines = macd::calculate_macd(
                    &close,
                    params.period("fast_window")?,
                    params.period("slow_window")?,
                    params.period("signal_window")?,
                );
                out.insert("macd", lines.macd);
                out.insert("signal", lines.signal);
                out.insert("hist", lines.hist);
            }
        }
        Ok(out)
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolved parameter values for one indicator run.
///
/// Always holds every parameter of its kind, so two runs that differ only in
/// which values were given explicitly resolve to the same set.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorParams {
    kind: IndicatorKind,
    values: BTreeMap<&'static str, f64>,
}

impl IndicatorParams {
    /// Kind defaults overlaid with `overrides`.
    pub fn resolve(
        kind: IndicatorKind,
        overrides: &BTreeMap<String, f64>,
    ) -> Result<Self, OptitraderError> {
        for name in overrides.keys() {
            if kind.param(name).is_none() {
                return Err(OptitraderError::InvalidParameterRange {
                    name: name.clone(),
                    reason: format!("{kind} has no parameter '{name}'"),
                });
            }
        }

        let mut values = BTreeMap::new();
        for def in kind.params() {
            let value = overrides.get(def.name).copied().unwrap_or(def.default);
            if !value.is_finite() || value <= 0.0 {
                return Err(OptitraderError::InvalidParameterRange {
                    name: def.name.to_string(),
                    reason: format!("must be positive, got {value}"),
                });
            }
            if def.integer && value.fract() != 0.0 {
                return Err(OptitraderError::InvalidParameterRange {
                    name: def.name.to_string(),
                    reason: format!("must be an integer, got {value}"),
                });
            }
            values.insert(def.name, value);
        }
        Ok(Self { kind, values })
    }

    pub fn kind(&self) -> IndicatorKind {
        self.kind
    }

    pub fn value(&self, name: &str) -> Result<f64, OptitraderError> {
        self.values
            .get(name)
            .copied()
            .ok_or_else(|| OptitraderError::InvalidParameterRange {
                name: name.to_string(),
                reason: format!("{} has no parameter '{name}'", self.kind),
            })
    }

    pub fn period(&self, name: &str) -> Result<usize, OptitraderError> {
        Ok(self.value(name)? as usize)
    }

    /// Stable textual form, e.g. `alpha=2,window=20`.
    pub fn canonical(&self) -> String {
        self.values
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Named output channels of one indicator run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorOutput {
    channels: BTreeMap<&'static str, Vec<f64>>,
}

impl IndicatorOutput {
    pub fn insert(&mut self, channel: &'static str, values: Vec<f64>) {
        self.channels.insert(channel, values);
    }

    pub fn channel(&self, name: &str) -> Option<&[f64]> {
        self.channels.get(name).map(Vec::as_slice)
    }

    pub fn channel_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.channels.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn make_bars(n: usize) -> Vec<OhlcvBar> {
        let t0 = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        (0..n)
            .map(|i| {
                let c = 100.0 + (i as f64 * 0.7).sin() * 5.0;
                OhlcvBar {
                    timestamp: t0 + Duration::hours(i as i64),
                    open: c,
                    high: c + 1.0,
                    low: c - 1.0,
                    close: c,
                    volume: 1000.0 + i as f64,
                }
            })
            .collect()
    }

    fn overrides(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn names_round_trip() {
        for kind in IndicatorKind::ALL {
            assert_eq!(IndicatorKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(IndicatorKind::from_name("BBANDS"), Some(IndicatorKind::Bbands));
        assert_eq!(IndicatorKind::from_name("vwap"), None);
    }

    #[test]
    fn default_channel_is_listed() {
        for kind in IndicatorKind::ALL {
            assert!(kind.channels().contains(&kind.default_channel()), "{kind}");
        }
    }

    #[test]
    fn compute_emits_every_channel() {
        let bars = make_bars(80);
        for kind in IndicatorKind::ALL {
            let params = IndicatorParams::resolve(kind, &BTreeMap::new()).unwrap();
            let out = kind.compute(&bars, &params).unwrap();
            let names: Vec<&str> = out.channel_names().collect();
            let mut expected: Vec<&str> = kind.channels().to_vec();
            expected.sort();
            assert_eq!(names, expected, "{kind}");
            for name in names {
                assert_eq!(out.channel(name).unwrap().len(), 80);
            }
        }
    }

    #[test]
    fn resolve_fills_defaults() {
        let params =
            IndicatorParams::resolve(IndicatorKind::Bbands, &overrides(&[("window", 10.0)]))
                .unwrap();
        assert_eq!(params.value("window").unwrap(), 10.0);
        assert_eq!(params.value("alpha").unwrap(), 2.0);
        assert_eq!(params.canonical(), "alpha=2,window=10");
    }

    #[test]
    fn explicit_default_equals_implicit_default() {
        let a = IndicatorParams::resolve(IndicatorKind::Ma, &BTreeMap::new()).unwrap();
        let b = IndicatorParams::resolve(IndicatorKind::Ma, &overrides(&[("window", 30.0)]))
            .unwrap();
        assert_eq!(a.canonical(), b.canonical());
    }

    #[test]
    fn resolve_rejects_unknown_param() {
        let err = IndicatorParams::resolve(IndicatorKind::Rsi, &overrides(&[("window", 3.0)]));
        assert!(matches!(
            err,
            Err(OptitraderError::InvalidParameterRange { .. })
        ));
    }

    #[test]
    fn resolve_rejects_fractional_window() {
        let err = IndicatorParams::resolve(IndicatorKind::Ma, &overrides(&[("window", 10.5)]));
        assert!(err.is_err());
        let ok = IndicatorParams::resolve(IndicatorKind::Bbands, &overrides(&[("alpha", 1.5)]));
        assert!(ok.is_ok());
    }

    #[test]
    fn resolve_rejects_non_positive() {
        assert!(IndicatorParams::resolve(IndicatorKind::Ma, &overrides(&[("window", 0.0)])).is_err());
    }
}
