//! Objective evaluation of one parameter assignment.
//!
//! Resolves indicator channels through the run cache, aligns them onto the
//! fastest timeframe, evaluates every trigger pair, runs the simulation and
//! reduces the result to the study's objective.

use crate::domain::align;
use crate::domain::error::OptitraderError;
use crate::domain::expr::CompiledExpr;
use crate::domain::expr_eval::{self, Bindings, ChannelTable};
use crate::domain::indicator::{IndicatorKind, IndicatorParams};
use crate::domain::indicator_cache::{CacheKey, IndicatorRunCache};
use crate::domain::objective::Objective;
use crate::domain::ohlcv::PriceField;
use crate::domain::param_space::ParamAssignment;
use crate::domain::series::DataScope;
use crate::domain::simulation::{RiskParams, SimulationInput, SimulationResult, TradeDirection};
use crate::domain::study::TrialError;
use crate::domain::timeframe::Timeframe;
use crate::ports::simulation_port::SimulationPort;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Which output channels of an indicator are divided by close.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Normalize {
    All(bool),
    Channels(Vec<String>),
}

impl Default for Normalize {
    fn default() -> Self {
        Normalize::All(false)
    }
}

impl Normalize {
    pub fn applies_to(&self, channel: &str) -> bool {
        match self {
            Normalize::All(flag) => *flag,
            Normalize::Channels(list) => list.iter().any(|c| c == channel),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedIndicator {
    pub alias: String,
    pub kind: IndicatorKind,
    pub timeframe: Timeframe,
    pub normalize: Normalize,
}

impl ResolvedIndicator {
    /// Indicator parameter overrides carried by `params`, keyed `alias.param`.
    pub fn overrides(&self, params: &ParamAssignment) -> BTreeMap<String, f64> {
        let prefix = format!("{}.", self.alias);
        params
            .iter()
            .filter_map(|(k, v)| k.strip_prefix(&prefix).map(|p| (p.to_string(), v.as_f64())))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct CompiledPair {
    pub alias: String,
    pub entry: CompiledExpr,
    pub exit: CompiledExpr,
}

/// Everything about a strategy that stays fixed across trials.
#[derive(Debug, Clone)]
pub struct StrategyPlan {
    pub indicators: Vec<ResolvedIndicator>,
    pub pairs: Vec<CompiledPair>,
    /// Custom range names bound as scalars in expressions.
    pub scalars: Vec<String>,
    pub objective: Objective,
    pub direction: TradeDirection,
}

/// Result of one evaluation: the raw objective score plus the artifacts
/// that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub score: f64,
    pub simulation: SimulationResult,
}

/// Something the optimizer can score an assignment with.
pub trait TrialObjective {
    fn evaluate(
        &self,
        params: &ParamAssignment,
        cache: &mut IndicatorRunCache,
    ) -> Result<Evaluation, TrialError>;
}

/// Evaluator bound to one data scope.
pub struct Evaluator<'a> {
    plan: &'a StrategyPlan,
    simulator: &'a dyn SimulationPort,
    scope: &'a DataScope,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        plan: &'a StrategyPlan,
        simulator: &'a dyn SimulationPort,
        scope: &'a DataScope,
    ) -> Self {
        Self {
            plan,
            simulator,
            scope,
        }
    }

    /// Aligned price and indicator channels for one assignment.
    pub fn build_channels(
        &self,
        params: &ParamAssignment,
        cache: &mut IndicatorRunCache,
    ) -> Result<ChannelTable, OptitraderError> {
        let fast = self.scope.fastest_series();
        let fast_index = fast.timestamps();
        let fast_close = fast.closes();
        let mut table = ChannelTable::new(fast.len());

        for field in PriceField::ALL {
            table.insert(field.name(), field.name(), fast.column(field))?;
        }

        for ind in &self.plan.indicators {
            let series = self.scope.series(&ind.timeframe).ok_or_else(|| {
                OptitraderError::NoData {
                    symbol: self.scope.symbol.clone(),
                    timeframe: ind.timeframe.to_string(),
                }
            })?;
            let resolved = IndicatorParams::resolve(ind.kind, &ind.overrides(params))?;
            let key = CacheKey::new(series.slice_id(), &resolved);
            let output = cache.get_or_compute(key, || ind.kind.compute(&series.bars, &resolved))?;

            let on_fast_index = &ind.timeframe == self.scope.fastest();
            let native_index = series.timestamps();
            for channel in output.channel_names() {
                let Some(values) = output.channel(channel) else {
                    continue;
                };
                let aligned = if on_fast_index {
                    values.to_vec()
                } else {
                    align::resample_to_fastest(&native_index, values, &fast_index)
                };
                let aligned = if ind.normalize.applies_to(channel) {
                    align::normalize(&aligned, &fast_close)
                } else {
                    aligned
                };
                table.insert(&ind.alias, channel, aligned)?;
            }
        }
        Ok(table)
    }

    /// Entry and exit vectors, OR-combined across trigger pairs.
    pub fn signals(
        &self,
        params: &ParamAssignment,
        cache: &mut IndicatorRunCache,
    ) -> Result<(Vec<bool>, Vec<bool>), OptitraderError> {
        let table = self.build_channels(params, cache)?;
        let bindings: Bindings = self
            .plan
            .scalars
            .iter()
            .filter_map(|name| params.get(name).map(|v| (name.clone(), v.as_f64())))
            .collect();

        let n = self.scope.len();
        let mut entries = vec![false; n];
        let mut exits = vec![false; n];
        for pair in &self.plan.pairs {
            let entry = expr_eval::evaluate(&pair.entry, &table, &bindings)?;
            let exit = expr_eval::evaluate(&pair.exit, &table, &bindings)?;
            for i in 0..n {
                entries[i] |= entry[i];
                exits[i] |= exit[i];
            }
        }
        Ok((entries, exits))
    }
}

impl TrialObjective for Evaluator<'_> {
    fn evaluate(
        &self,
        params: &ParamAssignment,
        cache: &mut IndicatorRunCache,
    ) -> Result<Evaluation, TrialError> {
        let (entries, exits) = self.signals(params, cache)?;
        let fast = self.scope.fastest_series();
        let timestamps = fast.timestamps();
        let close = fast.closes();

        let input = SimulationInput {
            timestamps: &timestamps,
            close: &close,
            entries: &entries,
            exits: &exits,
            risk: RiskParams::from_assignment(params),
            direction: self.plan.direction,
            periods_per_year: self.scope.fastest().periods_per_year(),
        };
        let simulation = self
            .simulator
            .simulate(&input)
            .map_err(|e| TrialError::Recoverable(e.to_string()))?;
        let score = self.plan.objective.extract(&simulation);
        Ok(Evaluation { score, simulation })
    }
}
