//! End-to-end study pipeline: validate, fetch, search, respond.

use crate::domain::error::OptitraderError;
use crate::domain::evaluator::{Evaluator, TrialObjective};
use crate::domain::indicator_cache::IndicatorRunCache;
use crate::domain::request::{StudyPlan, StudyRequest};
use crate::domain::response::StudyResponse;
use crate::domain::sampler::build_sampler;
use crate::domain::series::{DataScope, PriceSeries};
use crate::domain::settings::EngineSettings;
use crate::domain::study::{Optimizer, TrialError};
use crate::domain::walk_forward::{WalkForward, WalkForwardConfig};
use crate::ports::data_port::DataPort;
use crate::ports::simulation_port::SimulationPort;
use std::collections::BTreeMap;

/// Fetch every timeframe the plan needs.
pub fn load_scope(plan: &StudyPlan, data: &dyn DataPort) -> Result<DataScope, OptitraderError> {
    let mut series = BTreeMap::new();
    for tf in &plan.timeframes {
        let bars = data.fetch_series(&plan.symbol, tf, plan.start, plan.end)?;
        if bars.is_empty() {
            return Err(OptitraderError::NoData {
                symbol: plan.symbol.clone(),
                timeframe: tf.to_string(),
            });
        }
        tracing::debug!(symbol = %plan.symbol, timeframe = %tf, bars = bars.len(), "series loaded");
        series.insert(tf.clone(), PriceSeries::new(plan.symbol.clone(), tf.clone(), bars));
    }
    DataScope::new(plan.symbol.clone(), series)
}

/// Validate `request`, load its data and run the search it asks for.
pub fn run_study(
    request: &StudyRequest,
    data: &dyn DataPort,
    simulator: &dyn SimulationPort,
    settings: &EngineSettings,
) -> Result<StudyResponse, OptitraderError> {
    let plan = request.validate(&settings.limits, &settings.cross_validation)?;
    tracing::info!(
        symbol = %plan.symbol,
        objective = %plan.strategy.objective,
        trials = plan.n_trials,
        parameters = plan.space.len(),
        cross_validation = plan.cross_validation,
        "study validated"
    );
    let scope = load_scope(&plan, data)?;
    run_plan(&plan, &scope, simulator, settings)
}

pub fn run_plan(
    plan: &StudyPlan,
    scope: &DataScope,
    simulator: &dyn SimulationPort,
    settings: &EngineSettings,
) -> Result<StudyResponse, OptitraderError> {
    let objective = plan.strategy.objective;

    if plan.cross_validation {
        let config = WalkForwardConfig {
            n_folds: plan.n_folds,
            split_fraction: plan.split_fraction,
            parallel: settings.cross_validation.parallel,
            n_trials: plan.n_trials,
            seed: settings.seed,
            sampler: settings.sampler,
            tpe: settings.tpe,
            sentinel: settings.non_finite_sentinel,
        };
        let report = WalkForward::new(&plan.strategy, &plan.space, simulator, config).run(scope)?;

        let mut cache = IndicatorRunCache::new();
        let evaluator = Evaluator::new(&plan.strategy, simulator, scope);
        let evaluation = match evaluator.evaluate(&report.recommended_params, &mut cache) {
            Ok(e) => Some(e),
            Err(TrialError::Recoverable(reason)) => {
                tracing::warn!(%reason, "could not score recommended parameters on full period");
                None
            }
            Err(TrialError::Fatal(err)) => return Err(err),
        };
        cache.clear();
        return Ok(StudyResponse::from_cross_validation(
            &plan.symbol,
            objective,
            report,
            evaluation.as_ref(),
        ));
    }

    let mut cache = IndicatorRunCache::new();
    let evaluator = Evaluator::new(&plan.strategy, simulator, scope);
    let mut optimizer = Optimizer::new(
        &plan.space,
        objective.direction(),
        settings.non_finite_sentinel,
        build_sampler(settings.sampler, settings.tpe, settings.seed),
    );
    let result = optimizer.optimize(&evaluator, &mut cache, plan.n_trials)?;
    Ok(StudyResponse::from_study(&plan.symbol, objective, &result))
}
