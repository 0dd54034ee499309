//! Sequential optimizer loop.
//!
//! Trials run strictly in order: each suggestion conditions on the full
//! history of reported scores. Non-finite and recoverably failed trials are
//! reported with an unfavorable sentinel so they rank last without
//! stopping the search.

use crate::domain::error::OptitraderError;
use crate::domain::evaluator::{Evaluation, TrialObjective};
use crate::domain::indicator_cache::IndicatorRunCache;
use crate::domain::objective::StudyDirection;
use crate::domain::param_space::{ParamAssignment, SearchSpace};
use crate::domain::sampler::Sampler;

#[derive(Debug, Clone, PartialEq)]
pub enum TrialState {
    Complete,
    NonFinite,
    Failed(String),
}

impl TrialState {
    pub fn name(&self) -> &'static str {
        match self {
            TrialState::Complete => "complete",
            TrialState::NonFinite => "non_finite",
            TrialState::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trial {
    pub number: usize,
    pub params: ParamAssignment,
    /// Score reported to the sampler, after sentinel substitution.
    pub value: f64,
    /// Score as produced by the objective, possibly NaN.
    pub raw_value: f64,
    pub state: TrialState,
    pub evaluation: Option<Evaluation>,
}

/// Failure of a single trial evaluation.
#[derive(Debug, thiserror::Error)]
pub enum TrialError {
    /// The trial is recorded with the sentinel and the search continues.
    #[error("{0}")]
    Recoverable(String),
    /// The whole study aborts.
    #[error(transparent)]
    Fatal(OptitraderError),
}

impl From<OptitraderError> for TrialError {
    fn from(err: OptitraderError) -> Self {
        match err {
            OptitraderError::Simulation { .. }
            | OptitraderError::InsufficientData { .. }
            | OptitraderError::InvalidParameterRange { .. } => {
                TrialError::Recoverable(err.to_string())
            }
            other => TrialError::Fatal(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StudyResult {
    pub direction: StudyDirection,
    pub trials: Vec<Trial>,
    best: usize,
}

impl StudyResult {
    pub fn best_trial(&self) -> &Trial {
        &self.trials[self.best]
    }

    pub fn best_value(&self) -> f64 {
        self.best_trial().value
    }

    pub fn best_params(&self) -> &ParamAssignment {
        &self.best_trial().params
    }
}

/// Index of the best reported value; ties keep the earliest trial. Reported
/// values are always finite.
fn best_index(trials: &[Trial], direction: StudyDirection) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, t) in trials.iter().enumerate() {
        let better = match best {
            None => true,
            Some(b) => direction.is_better(t.value, trials[b].value),
        };
        if better {
            best = Some(i);
        }
    }
    best
}

pub struct Optimizer<'a> {
    space: &'a SearchSpace,
    direction: StudyDirection,
    sentinel: f64,
    sampler: Box<dyn Sampler>,
}

impl<'a> Optimizer<'a> {
    pub fn new(
        space: &'a SearchSpace,
        direction: StudyDirection,
        sentinel_magnitude: f64,
        sampler: Box<dyn Sampler>,
    ) -> Self {
        Self {
            space,
            direction,
            sentinel: direction.sentinel(sentinel_magnitude),
            sampler,
        }
    }

    /// Merge fixed values with a fresh suggestion, evaluate and record.
    pub fn run_trial(
        &mut self,
        number: usize,
        history: &[Trial],
        objective: &dyn TrialObjective,
        cache: &mut IndicatorRunCache,
    ) -> Result<Trial, OptitraderError> {
        let mut params = self.space.fixed_assignment();
        params.extend(self.sampler.suggest(self.space, history, self.direction));

        let trial = match objective.evaluate(&params, cache) {
            Ok(evaluation) if evaluation.score.is_finite() => Trial {
                number,
                params,
                value: evaluation.score,
                raw_value: evaluation.score,
                state: TrialState::Complete,
                evaluation: Some(evaluation),
            },
            Ok(evaluation) => {
                tracing::warn!(
                    trial = number,
                    score = evaluation.score,
                    sentinel = self.sentinel,
                    "non-finite objective, reporting sentinel"
                );
                Trial {
                    number,
                    params,
                    value: self.sentinel,
                    raw_value: evaluation.score,
                    state: TrialState::NonFinite,
                    evaluation: Some(evaluation),
                }
            }
            Err(TrialError::Recoverable(reason)) => {
                tracing::warn!(trial = number, %reason, "trial failed, reporting sentinel");
                Trial {
                    number,
                    params,
                    value: self.sentinel,
                    raw_value: f64::NAN,
                    state: TrialState::Failed(reason),
                    evaluation: None,
                }
            }
            Err(TrialError::Fatal(err)) => return Err(err),
        };

        tracing::debug!(
            trial = number,
            value = trial.value,
            params = ?trial.params,
            "trial finished"
        );
        Ok(trial)
    }

    /// Run `n_trials` trials in order. The cache is cleared once the search
    /// completes.
    pub fn optimize(
        &mut self,
        objective: &dyn TrialObjective,
        cache: &mut IndicatorRunCache,
        n_trials: usize,
    ) -> Result<StudyResult, OptitraderError> {
        if n_trials == 0 {
            return Err(OptitraderError::Validation {
                field: "n_trials".into(),
                reason: "at least one trial is required".into(),
            });
        }

        let mut trials: Vec<Trial> = Vec::with_capacity(n_trials);
        for number in 0..n_trials {
            let trial = self.run_trial(number, &trials, objective, cache)?;
            trials.push(trial);
        }
        cache.clear();

        let best = best_index(&trials, self.direction).unwrap_or(0);
        let result = StudyResult {
            direction: self.direction,
            trials,
            best,
        };
        tracing::info!(
            trials = n_trials,
            best_trial = best,
            best_value = result.best_value(),
            "study complete"
        );
        Ok(result)
    }
}
