//! Simulation engine request and result types.

use crate::domain::error::OptitraderError;
use crate::domain::metrics::Metrics;
use crate::domain::param_space::ParamAssignment;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Names of the risk parameters a study may tune.
pub const RISK_PARAMS: [&str; 5] = ["sl_stop", "tp_stop", "tsl_stop", "fee", "slippage"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeDirection {
    #[default]
    Long,
    Short,
}

/// Fees, slippage and stops as fractions of price; zero disables a stop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RiskParams {
    pub fee: f64,
    pub slippage: f64,
    pub sl_stop: f64,
    pub tp_stop: f64,
    pub tsl_stop: f64,
}

impl RiskParams {
    /// Read risk values out of a trial assignment; absent ones stay zero.
    pub fn from_assignment(params: &ParamAssignment) -> Self {
        let get = |name: &str| params.get(name).map_or(0.0, |v| v.as_f64());
        Self {
            fee: get("fee"),
            slippage: get("slippage"),
            sl_stop: get("sl_stop"),
            tp_stop: get("tp_stop"),
            tsl_stop: get("tsl_stop"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulationInput<'a> {
    pub timestamps: &'a [NaiveDateTime],
    pub close: &'a [f64],
    pub entries: &'a [bool],
    pub exits: &'a [bool],
    pub risk: RiskParams,
    pub direction: TradeDirection,
    pub periods_per_year: f64,
}

impl SimulationInput<'_> {
    pub fn validate(&self) -> Result<(), OptitraderError> {
        let n = self.close.len();
        if n == 0 {
            return Err(OptitraderError::Simulation {
                reason: "no bars to simulate".into(),
            });
        }
        if self.timestamps.len() != n || self.entries.len() != n || self.exits.len() != n {
            return Err(OptitraderError::Simulation {
                reason: format!(
                    "misaligned inputs: {} timestamps, {} closes, {} entries, {} exits",
                    self.timestamps.len(),
                    n,
                    self.entries.len(),
                    self.exits.len()
                ),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRecord {
    pub bar: usize,
    pub timestamp: NaiveDateTime,
    pub side: OrderSide,
    pub price: f64,
    pub size: f64,
    pub fee: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    Signal,
    StopLoss,
    TakeProfit,
    TrailingStop,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeRecord {
    pub direction: TradeDirection,
    pub entry_bar: usize,
    pub exit_bar: usize,
    pub entry_time: NaiveDateTime,
    pub exit_time: NaiveDateTime,
    pub entry_price: f64,
    pub exit_price: f64,
    pub size: f64,
    pub pnl: f64,
    pub return_pct: f64,
    pub exit_reason: ExitReason,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationResult {
    pub metrics: Metrics,
    pub orders: Vec<OrderRecord>,
    pub trades: Vec<TradeRecord>,
    pub equity_curve: Vec<f64>,
    pub open_position: bool,
}

impl SimulationResult {
    pub fn last_order(&self) -> Option<&OrderRecord> {
        self.orders.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::param_space::ParamValue;
    use chrono::NaiveDate;

    #[test]
    fn risk_params_from_assignment() {
        let mut params = ParamAssignment::new();
        params.insert("fee".into(), ParamValue::Float(0.001));
        params.insert("sl_stop".into(), ParamValue::Float(0.05));
        params.insert("slow_ma.window".into(), ParamValue::Int(10));
        let risk = RiskParams::from_assignment(&params);
        assert_eq!(risk.fee, 0.001);
        assert_eq!(risk.sl_stop, 0.05);
        assert_eq!(risk.tp_stop, 0.0);
        assert_eq!(risk.tsl_stop, 0.0);
    }

    #[test]
    fn input_validation_catches_misalignment() {
        let ts = vec![
            NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap();
            2
        ];
        let input = SimulationInput {
            timestamps: &ts,
            close: &[1.0, 2.0],
            entries: &[true],
            exits: &[false, false],
            risk: RiskParams::default(),
            direction: TradeDirection::Long,
            periods_per_year: 365.0,
        };
        assert!(input.validate().is_err());

        let empty = SimulationInput {
            timestamps: &[],
            close: &[],
            entries: &[],
            exits: &[],
            ..input
        };
        assert!(empty.validate().is_err());
    }
}
