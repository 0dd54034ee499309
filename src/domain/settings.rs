//! Engine settings and their validation.
//!
//! Every key has a default, so an empty configuration is valid. Values that
//! are present are checked by [`validate_engine_config`] before use.

use crate::domain::error::OptitraderError;
use crate::domain::expr_parser::DEFAULT_MAX_LEN;
use crate::domain::sampler::{SamplerKind, TpeConfig};
use crate::ports::config_port::ConfigPort;
use std::path::PathBuf;

pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_SENTINEL: f64 = 1e10;
pub const DEFAULT_MAX_INDICATORS: usize = 10;
pub const DEFAULT_MAX_TRIALS: usize = 1000;
pub const DEFAULT_MAX_PERIODS: usize = 100_000;
pub const DEFAULT_N_FOLDS: usize = 3;
pub const DEFAULT_SPLIT_FRACTION: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct Limits {
    pub max_expression_len: usize,
    pub max_indicators: usize,
    pub max_trials: usize,
    pub max_periods_per_timeframe: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_expression_len: DEFAULT_MAX_LEN,
            max_indicators: DEFAULT_MAX_INDICATORS,
            max_trials: DEFAULT_MAX_TRIALS,
            max_periods_per_timeframe: DEFAULT_MAX_PERIODS,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrossValidationSettings {
    pub n_folds: usize,
    pub split_fraction: f64,
    pub parallel: bool,
}

impl Default for CrossValidationSettings {
    fn default() -> Self {
        Self {
            n_folds: DEFAULT_N_FOLDS,
            split_fraction: DEFAULT_SPLIT_FRACTION,
            parallel: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub seed: u64,
    pub sampler: SamplerKind,
    pub tpe: TpeConfig,
    /// Magnitude of the score substituted for non-finite or failed trials.
    pub non_finite_sentinel: f64,
    pub limits: Limits,
    pub cross_validation: CrossValidationSettings,
    pub data_dir: PathBuf,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            sampler: SamplerKind::Tpe,
            tpe: TpeConfig::default(),
            non_finite_sentinel: DEFAULT_SENTINEL,
            limits: Limits::default(),
            cross_validation: CrossValidationSettings::default(),
            data_dir: PathBuf::from("data"),
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, OptitraderError> {
        validate_engine_config(config)?;
        let d = Self::default();
        let sampler = match config.get_string("engine", "sampler") {
            Some(s) => s.parse()?,
            None => d.sampler,
        };
        Ok(Self {
            seed: config.get_int("engine", "seed", d.seed as i64) as u64,
            sampler,
            tpe: TpeConfig {
                n_startup_trials: get_usize(config, "engine", "n_startup_trials", d.tpe.n_startup_trials),
                gamma: config.get_double("engine", "gamma", d.tpe.gamma),
                n_candidates: get_usize(config, "engine", "n_candidates", d.tpe.n_candidates),
            },
            non_finite_sentinel: config.get_double("engine", "non_finite_sentinel", d.non_finite_sentinel),
            limits: Limits {
                max_expression_len: get_usize(config, "limits", "max_expression_len", d.limits.max_expression_len),
                max_indicators: get_usize(config, "limits", "max_indicators", d.limits.max_indicators),
                max_trials: get_usize(config, "limits", "max_trials", d.limits.max_trials),
                max_periods_per_timeframe: get_usize(
                    config,
                    "limits",
                    "max_periods_per_timeframe",
                    d.limits.max_periods_per_timeframe,
                ),
            },
            cross_validation: CrossValidationSettings {
                n_folds: get_usize(config, "cross_validation", "n_folds", d.cross_validation.n_folds),
                split_fraction: config.get_double(
                    "cross_validation",
                    "split_fraction",
                    d.cross_validation.split_fraction,
                ),
                parallel: config.get_bool("cross_validation", "parallel", d.cross_validation.parallel),
            },
            data_dir: config
                .get_string("data", "dir")
                .map(PathBuf::from)
                .unwrap_or(d.data_dir),
        })
    }
}

fn get_usize(config: &dyn ConfigPort, section: &str, key: &str, default: usize) -> usize {
    config.get_int(section, key, default as i64).max(0) as usize
}

pub fn validate_engine_config(config: &dyn ConfigPort) -> Result<(), OptitraderError> {
    validate_seed(config)?;
    validate_sampler(config)?;
    validate_tpe(config)?;
    validate_sentinel(config)?;
    validate_limits(config)?;
    validate_cross_validation(config)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: &str) -> OptitraderError {
    OptitraderError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn validate_seed(config: &dyn ConfigPort) -> Result<(), OptitraderError> {
    if config.get_int("engine", "seed", 0) < 0 {
        return Err(invalid("engine", "seed", "seed must be non-negative"));
    }
    Ok(())
}

fn validate_sampler(config: &dyn ConfigPort) -> Result<(), OptitraderError> {
    if let Some(s) = config.get_string("engine", "sampler") {
        s.parse::<SamplerKind>()?;
    }
    Ok(())
}

fn validate_tpe(config: &dyn ConfigPort) -> Result<(), OptitraderError> {
    let gamma = config.get_double("engine", "gamma", 0.25);
    if gamma <= 0.0 || gamma >= 1.0 {
        return Err(invalid("engine", "gamma", "gamma must be between 0 and 1"));
    }
    if config.get_int("engine", "n_startup_trials", 10) < 0 {
        return Err(invalid(
            "engine",
            "n_startup_trials",
            "n_startup_trials must be non-negative",
        ));
    }
    if config.get_int("engine", "n_candidates", 24) < 1 {
        return Err(invalid(
            "engine",
            "n_candidates",
            "n_candidates must be at least 1",
        ));
    }
    Ok(())
}

fn validate_sentinel(config: &dyn ConfigPort) -> Result<(), OptitraderError> {
    let value = config.get_double("engine", "non_finite_sentinel", DEFAULT_SENTINEL);
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid(
            "engine",
            "non_finite_sentinel",
            "non_finite_sentinel must be a positive finite number",
        ));
    }
    Ok(())
}

fn validate_limits(config: &dyn ConfigPort) -> Result<(), OptitraderError> {
    for (key, default) in [
        ("max_expression_len", DEFAULT_MAX_LEN),
        ("max_indicators", DEFAULT_MAX_INDICATORS),
        ("max_trials", DEFAULT_MAX_TRIALS),
        ("max_periods_per_timeframe", DEFAULT_MAX_PERIODS),
    ] {
        if config.get_int("limits", key, default as i64) < 1 {
            return Err(invalid("limits", key, &format!("{key} must be at least 1")));
        }
    }
    Ok(())
}

fn validate_cross_validation(config: &dyn ConfigPort) -> Result<(), OptitraderError> {
    if config.get_int("cross_validation", "n_folds", DEFAULT_N_FOLDS as i64) < 1 {
        return Err(invalid(
            "cross_validation",
            "n_folds",
            "n_folds must be at least 1",
        ));
    }
    let split = config.get_double("cross_validation", "split_fraction", DEFAULT_SPLIT_FRACTION);
    if split <= 0.0 || split >= 1.0 {
        return Err(invalid(
            "cross_validation",
            "split_fraction",
            "split_fraction must be between 0 and 1",
        ));
    }
    Ok(())
}
