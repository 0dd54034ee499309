//! Walk-forward cross-validation.
//!
//! A window rolls across the fastest index; each window is split into a
//! train prefix and a test suffix. Parameters chosen on train are scored
//! out-of-sample on test, and an independent search on test gives the
//! oracle score for comparison.

use crate::domain::error::OptitraderError;
use crate::domain::evaluator::{Evaluator, StrategyPlan, TrialObjective};
use crate::domain::indicator_cache::IndicatorRunCache;
use crate::domain::param_space::{ParamAssignment, SearchSpace};
use crate::domain::sampler::{build_sampler, SamplerKind, TpeConfig};
use crate::domain::series::DataScope;
use crate::domain::study::{Optimizer, TrialError};
use crate::ports::simulation_port::SimulationPort;
use chrono::NaiveDateTime;
use rayon::prelude::*;
use serde::Serialize;
use std::ops::Range;

/// Minimum bars in a train segment.
pub const MIN_TRAIN_BARS: usize = 2;
/// Minimum bars in a test segment.
pub const MIN_TEST_BARS: usize = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub index: usize,
    pub train: Range<usize>,
    pub test: Range<usize>,
}

/// Split `index` into `n_folds` rolling train/test windows.
pub fn split(
    index: &[NaiveDateTime],
    n_folds: usize,
    split_fraction: f64,
) -> Result<Vec<Fold>, OptitraderError> {
    if n_folds == 0 {
        return Err(OptitraderError::Validation {
            field: "n_folds".into(),
            reason: "at least one fold is required".into(),
        });
    }
    if !(split_fraction > 0.0 && split_fraction < 1.0) {
        return Err(OptitraderError::Validation {
            field: "split_fraction".into(),
            reason: format!("must be strictly between 0 and 1, got {split_fraction}"),
        });
    }
    if let Some(pos) = index.windows(2).position(|w| w[0] >= w[1]) {
        return Err(OptitraderError::Data {
            reason: format!("index is not strictly increasing at position {}", pos + 1),
        });
    }

    let len = index.len();
    let window = len / n_folds;
    let train_len = (window as f64 * split_fraction).floor() as usize;
    let minimum = n_folds * (MIN_TRAIN_BARS + MIN_TEST_BARS);
    if train_len < MIN_TRAIN_BARS || window.saturating_sub(train_len) < MIN_TEST_BARS {
        return Err(OptitraderError::InsufficientData {
            context: format!("{n_folds} walk-forward folds at split {split_fraction}"),
            bars: len,
            minimum,
        });
    }

    let span = len - window;
    Ok((0..n_folds)
        .map(|k| {
            let start = if n_folds == 1 {
                0
            } else {
                k * span / (n_folds - 1)
            };
            Fold {
                index: k,
                train: start..start + train_len,
                test: start + train_len..start + window,
            }
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoldRecord {
    pub fold_index: usize,
    pub train_start: NaiveDateTime,
    pub train_end: NaiveDateTime,
    pub test_start: NaiveDateTime,
    pub test_end: NaiveDateTime,
    pub train_best_score: f64,
    pub train_best_params: ParamAssignment,
    pub test_actual_score: f64,
    pub test_best_score: f64,
    pub test_best_params: ParamAssignment,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossValidationReport {
    pub folds: Vec<FoldRecord>,
    /// Train-selected parameters of the chronologically last fold.
    pub recommended_params: ParamAssignment,
}

#[derive(Debug, Clone)]
pub struct WalkForwardConfig {
    pub n_folds: usize,
    pub split_fraction: f64,
    pub parallel: bool,
    pub n_trials: usize,
    pub seed: u64,
    pub sampler: SamplerKind,
    pub tpe: TpeConfig,
    pub sentinel: f64,
}

pub struct WalkForward<'a> {
    plan: &'a StrategyPlan,
    space: &'a SearchSpace,
    simulator: &'a dyn SimulationPort,
    config: WalkForwardConfig,
}

impl<'a> WalkForward<'a> {
    pub fn new(
        plan: &'a StrategyPlan,
        space: &'a SearchSpace,
        simulator: &'a dyn SimulationPort,
        config: WalkForwardConfig,
    ) -> Self {
        Self {
            plan,
            space,
            simulator,
            config,
        }
    }

    pub fn run(&self, scope: &DataScope) -> Result<CrossValidationReport, OptitraderError> {
        let index = scope.index();
        let windows = split(&index, self.config.n_folds, self.config.split_fraction)?;
        tracing::info!(
            folds = windows.len(),
            bars = index.len(),
            parallel = self.config.parallel,
            "starting walk-forward validation"
        );

        let results: Vec<Result<FoldRecord, OptitraderError>> = if self.config.parallel {
            windows
                .par_iter()
                .map(|w| self.run_fold(scope, &index, w))
                .collect()
        } else {
            windows
                .iter()
                .map(|w| self.run_fold(scope, &index, w))
                .collect()
        };
        let mut folds = results.into_iter().collect::<Result<Vec<_>, _>>()?;
        folds.sort_by_key(|f| f.fold_index);

        let recommended_params = folds
            .last()
            .map(|f| f.train_best_params.clone())
            .unwrap_or_default();
        Ok(CrossValidationReport {
            folds,
            recommended_params,
        })
    }

    fn optimizer(&self, fold: usize, oracle: bool) -> Optimizer<'a> {
        let seed = search_seed(self.config.seed, self.config.n_folds, fold, oracle);
        Optimizer::new(
            self.space,
            self.plan.objective.direction(),
            self.config.sentinel,
            build_sampler(self.config.sampler, self.config.tpe, seed),
        )
    }

    fn run_fold(
        &self,
        scope: &DataScope,
        index: &[NaiveDateTime],
        window: &Fold,
    ) -> Result<FoldRecord, OptitraderError> {
        let train_scope = scope.slice(window.train.clone())?;
        let test_scope = scope.slice(window.test.clone())?;
        let mut cache = IndicatorRunCache::new();

        let train_eval = Evaluator::new(self.plan, self.simulator, &train_scope);
        let train = self
            .optimizer(window.index, false)
            .optimize(&train_eval, &mut cache, self.config.n_trials)?;
        let train_best_params = train.best_params().clone();

        let test_eval = Evaluator::new(self.plan, self.simulator, &test_scope);
        let test_actual_score = match test_eval.evaluate(&train_best_params, &mut cache) {
            Ok(evaluation) => evaluation.score,
            Err(TrialError::Recoverable(reason)) => {
                tracing::warn!(fold = window.index, %reason, "out-of-sample evaluation failed");
                f64::NAN
            }
            Err(TrialError::Fatal(err)) => return Err(err),
        };

        let oracle = self
            .optimizer(window.index, true)
            .optimize(&test_eval, &mut cache, self.config.n_trials)?;
        cache.clear();

        let record = FoldRecord {
            fold_index: window.index,
            train_start: index[window.train.start],
            train_end: index[window.train.end - 1],
            test_start: index[window.test.start],
            test_end: index[window.test.end - 1],
            train_best_score: train.best_value(),
            train_best_params,
            test_actual_score,
            test_best_score: oracle.best_value(),
            test_best_params: oracle.best_params().clone(),
        };
        tracing::info!(
            fold = record.fold_index,
            train_best = record.train_best_score,
            test_actual = record.test_actual_score,
            test_best = record.test_best_score,
            "fold complete"
        );
        Ok(record)
    }
}

/// Sampler seed for one search. Train searches use `seed + fold` and oracle
/// searches `seed + n_folds + fold`, so no two searches share a sequence.
fn search_seed(seed: u64, n_folds: usize, fold: usize, oracle: bool) -> u64 {
    let offset = if oracle { n_folds + fold } else { fold };
    seed.wrapping_add(offset as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use proptest::prelude::*;

    fn index(n: usize) -> Vec<NaiveDateTime> {
        let t0 = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        (0..n).map(|i| t0 + Duration::hours(i as i64)).collect()
    }

    #[test]
    fn three_even_folds() {
        let folds = split(&index(90), 3, 0.5).unwrap();
        assert_eq!(folds.len(), 3);
        assert_eq!(folds[0].train, 0..15);
        assert_eq!(folds[0].test, 15..30);
        assert_eq!(folds[1].train, 30..45);
        assert_eq!(folds[2].test, 75..90);
    }

    #[test]
    fn windows_roll_over_remainder() {
        let folds = split(&index(100), 3, 0.5).unwrap();
        // window 33, span 67
        assert_eq!(folds[0].train.start, 0);
        assert_eq!(folds[1].train.start, 33);
        assert_eq!(folds[2].train.start, 67);
        assert_eq!(folds[2].test.end, 100);
    }

    #[test]
    fn single_fold_uses_prefix() {
        let folds = split(&index(10), 1, 0.7).unwrap();
        assert_eq!(folds, vec![Fold { index: 0, train: 0..7, test: 7..10 }]);
    }

    #[test]
    fn too_few_bars_fails() {
        let err = split(&index(5), 3, 0.5).unwrap_err();
        assert!(matches!(err, OptitraderError::InsufficientData { .. }));
    }

    #[test]
    fn non_increasing_index_fails() {
        let mut idx = index(20);
        idx.swap(3, 4);
        assert!(matches!(split(&idx, 2, 0.5), Err(OptitraderError::Data { .. })));
    }

    #[test]
    fn bad_fraction_fails() {
        assert!(split(&index(20), 2, 1.0).is_err());
        assert!(split(&index(20), 2, 0.0).is_err());
        assert!(split(&index(20), 0, 0.5).is_err());
    }

    #[test]
    fn every_search_gets_its_own_seed() {
        let n_folds = 4;
        let mut seeds: Vec<u64> = (0..n_folds)
            .flat_map(|f| [false, true].map(|oracle| search_seed(42, n_folds, f, oracle)))
            .collect();
        assert_eq!(search_seed(42, n_folds, 1, false), 43);
        assert_eq!(search_seed(42, n_folds, 1, true), 47);
        seeds.sort_unstable();
        seeds.dedup();
        assert_eq!(seeds.len(), 2 * n_folds);
        assert_eq!(search_seed(u64::MAX, 2, 1, true), 2);
    }

    proptest! {
        #[test]
        fn train_precedes_test(len in 6usize..500, n_folds in 1usize..6, frac in 0.2f64..0.8) {
            let idx = index(len);
            if let Ok(folds) = split(&idx, n_folds, frac) {
                prop_assert_eq!(folds.len(), n_folds);
                for f in &folds {
                    prop_assert!(f.train.len() >= MIN_TRAIN_BARS);
                    prop_assert!(!f.test.is_empty());
                    prop_assert!(f.test.end <= len);
                    prop_assert!(idx[f.train.end - 1] < idx[f.test.start]);
                }
                for w in folds.windows(2) {
                    prop_assert!(w[0].train.start <= w[1].train.start);
                }
            }
        }
    }
}
