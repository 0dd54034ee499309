//! Study responses.

use crate::domain::evaluator::Evaluation;
use crate::domain::metrics::Metrics;
use crate::domain::objective::{Objective, StudyDirection};
use crate::domain::param_space::ParamAssignment;
use crate::domain::simulation::OrderSide;
use crate::domain::study::{StudyResult, Trial, TrialState};
use crate::domain::walk_forward::CrossValidationReport;
use chrono::NaiveDateTime;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudyResponse {
    pub symbol: String,
    pub objective: Objective,
    pub direction: StudyDirection,
    pub best_params: ParamAssignment,
    pub best_objective_value: f64,
    pub best_stats: Option<Metrics>,
    pub latest_signal: Option<LatestSignal>,
    pub trials: Vec<TrialSummary>,
    pub cross_validation: Option<CrossValidationReport>,
}

/// The last order placed under the selected parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestSignal {
    pub side: OrderSide,
    pub price: f64,
    pub timestamp: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialSummary {
    pub number: usize,
    pub params: ParamAssignment,
    pub value: f64,
    /// `None` when the objective was not finite.
    pub raw_value: Option<f64>,
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl From<&Trial> for TrialSummary {
    fn from(t: &Trial) -> Self {
        Self {
            number: t.number,
            params: t.params.clone(),
            value: t.value,
            raw_value: t.raw_value.is_finite().then_some(t.raw_value),
            state: t.state.name(),
            failure: match &t.state {
                TrialState::Failed(reason) => Some(reason.clone()),
                _ => None,
            },
        }
    }
}

fn latest_signal(evaluation: Option<&Evaluation>) -> Option<LatestSignal> {
    evaluation
        .and_then(|e| e.simulation.last_order())
        .map(|o| LatestSignal {
            side: o.side,
            price: o.price,
            timestamp: o.timestamp,
        })
}

impl StudyResponse {
    pub fn from_study(symbol: &str, objective: Objective, result: &StudyResult) -> Self {
        let best = result.best_trial();
        let evaluation = best.evaluation.as_ref();
        Self {
            symbol: symbol.to_string(),
            objective,
            direction: result.direction,
            best_params: best.params.clone(),
            best_objective_value: best.value,
            best_stats: evaluation.map(|e| e.simulation.metrics.clone()),
            latest_signal: latest_signal(evaluation),
            trials: result.trials.iter().map(TrialSummary::from).collect(),
            cross_validation: None,
        }
    }

    /// Response for a cross-validated study. `evaluation` is the recommended
    /// parameters scored over the whole testing period, when available.
    pub fn from_cross_validation(
        symbol: &str,
        objective: Objective,
        report: CrossValidationReport,
        evaluation: Option<&Evaluation>,
    ) -> Self {
        let best_objective_value = report
            .folds
            .last()
            .map_or(f64::NAN, |f| f.train_best_score);
        Self {
            symbol: symbol.to_string(),
            objective,
            direction: objective.direction(),
            best_params: report.recommended_params.clone(),
            best_objective_value,
            best_stats: evaluation.map(|e| e.simulation.metrics.clone()),
            latest_signal: latest_signal(evaluation),
            trials: Vec::new(),
            cross_validation: Some(report),
        }
    }

    /// Human-readable one-screen summary.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "{} {} ({:?}): best {:.6}\n",
            self.symbol, self.objective, self.direction, self.best_objective_value
        );
        for (k, v) in &self.best_params {
            out.push_str(&format!("  {k} = {v}\n"));
        }
        if let Some(cv) = &self.cross_validation {
            out.push_str("  fold  train_best  test_actual  test_best\n");
            for f in &cv.folds {
                out.push_str(&format!(
                    "  {:>4}  {:>10.4}  {:>11.4}  {:>9.4}\n",
                    f.fold_index, f.train_best_score, f.test_actual_score, f.test_best_score
                ));
            }
        }
        if let Some(s) = &self.latest_signal {
            out.push_str(&format!("  latest signal: {:?} at {} @ {:.4}\n", s.side, s.timestamp, s.price));
        }
        out
    }
}
