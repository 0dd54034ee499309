//! Bar-by-bar long/short simulator.
//!
//! Fills happen at the bar close, all-in on available cash. Slippage moves
//! the fill against the trade, fees are a fraction of fill notional, and
//! stops are checked against the close before signals. A short position
//! escrows its entry notional so equity is `cash + size * (2 * entry - price)`.

use crate::domain::error::OptitraderError;
use crate::domain::metrics::Metrics;
use crate::domain::simulation::{
    ExitReason, OrderRecord, OrderSide, RiskParams, SimulationInput, SimulationResult,
    TradeDirection, TradeRecord,
};
use crate::ports::simulation_port::SimulationPort;

pub const DEFAULT_INITIAL_CAPITAL: f64 = 10_000.0;

#[derive(Debug, Clone, PartialEq)]
pub struct VectorSimulator {
    pub initial_capital: f64,
    pub risk_free_rate: f64,
}

impl Default for VectorSimulator {
    fn default() -> Self {
        Self {
            initial_capital: DEFAULT_INITIAL_CAPITAL,
            risk_free_rate: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
struct OpenPosition {
    entry_bar: usize,
    entry_price: f64,
    entry_fee: f64,
    size: f64,
    /// Best close seen while open: highest for longs, lowest for shorts.
    extreme: f64,
}

impl OpenPosition {
    fn market_value(&self, direction: TradeDirection, price: f64) -> f64 {
        match direction {
            TradeDirection::Long => self.size * price,
            TradeDirection::Short => self.size * (2.0 * self.entry_price - price),
        }
    }

    fn track(&mut self, direction: TradeDirection, price: f64) {
        self.extreme = match direction {
            TradeDirection::Long => self.extreme.max(price),
            TradeDirection::Short => self.extreme.min(price),
        };
    }

    fn stop_hit(&self, direction: TradeDirection, risk: &RiskParams, price: f64) -> Option<ExitReason> {
        let entry = self.entry_price;
        match direction {
            TradeDirection::Long => {
                if risk.sl_stop > 0.0 && price <= entry * (1.0 - risk.sl_stop) {
                    Some(ExitReason::StopLoss)
                } else if risk.tp_stop > 0.0 && price >= entry * (1.0 + risk.tp_stop) {
                    Some(ExitReason::TakeProfit)
                } else if risk.tsl_stop > 0.0 && price <= self.extreme * (1.0 - risk.tsl_stop) {
                    Some(ExitReason::TrailingStop)
                } else {
                    None
                }
            }
            TradeDirection::Short => {
                if risk.sl_stop > 0.0 && price >= entry * (1.0 + risk.sl_stop) {
                    Some(ExitReason::StopLoss)
                } else if risk.tp_stop > 0.0 && price <= entry * (1.0 - risk.tp_stop) {
                    Some(ExitReason::TakeProfit)
                } else if risk.tsl_stop > 0.0 && price >= self.extreme * (1.0 + risk.tsl_stop) {
                    Some(ExitReason::TrailingStop)
                } else {
                    None
                }
            }
        }
    }
}

fn entry_side(direction: TradeDirection) -> OrderSide {
    match direction {
        TradeDirection::Long => OrderSide::Buy,
        TradeDirection::Short => OrderSide::Sell,
    }
}

fn exit_side(direction: TradeDirection) -> OrderSide {
    match direction {
        TradeDirection::Long => OrderSide::Sell,
        TradeDirection::Short => OrderSide::Buy,
    }
}

fn check_risk(risk: &RiskParams) -> Result<(), OptitraderError> {
    let fields = [
        ("fee", risk.fee),
        ("slippage", risk.slippage),
        ("sl_stop", risk.sl_stop),
        ("tp_stop", risk.tp_stop),
        ("tsl_stop", risk.tsl_stop),
    ];
    for (name, value) in fields {
        if !value.is_finite() || value < 0.0 {
            return Err(OptitraderError::Simulation {
                reason: format!("{name} must be a non-negative number, got {value}"),
            });
        }
    }
    if risk.fee >= 1.0 || risk.slippage >= 1.0 {
        return Err(OptitraderError::Simulation {
            reason: "fee and slippage must be below 1".into(),
        });
    }
    Ok(())
}

impl SimulationPort for VectorSimulator {
    fn simulate(&self, input: &SimulationInput<'_>) -> Result<SimulationResult, OptitraderError> {
        input.validate()?;
        check_risk(&input.risk)?;
        if let Some(bad) = input.close.iter().position(|c| !c.is_finite() || *c <= 0.0) {
            return Err(OptitraderError::Simulation {
                reason: format!("invalid close {} at bar {}", input.close[bad], bad),
            });
        }

        let risk = input.risk;
        let direction = input.direction;
        let n = input.close.len();

        let mut cash = self.initial_capital;
        let mut position: Option<OpenPosition> = None;
        let mut orders = Vec::new();
        let mut trades = Vec::new();
        let mut equity_curve = Vec::with_capacity(n);

        for bar in 0..n {
            let price = input.close[bar];
            let timestamp = input.timestamps[bar];

            let mut exited = false;
            if let Some(mut open) = position.take() {
                open.track(direction, price);
                let reason = open
                    .stop_hit(direction, &risk, price)
                    .or_else(|| input.exits[bar].then_some(ExitReason::Signal));

                match reason {
                    Some(exit_reason) => {
                        let fill = match direction {
                            TradeDirection::Long => price * (1.0 - risk.slippage),
                            TradeDirection::Short => price * (1.0 + risk.slippage),
                        };
                        let exit_fee = open.size * fill * risk.fee;
                        cash += open.market_value(direction, fill) - exit_fee;

                        let gross = match direction {
                            TradeDirection::Long => open.size * (fill - open.entry_price),
                            TradeDirection::Short => open.size * (open.entry_price - fill),
                        };
                        let pnl = gross - open.entry_fee - exit_fee;
                        let invested = open.size * open.entry_price + open.entry_fee;

                        orders.push(OrderRecord {
                            bar,
                            timestamp,
                            side: exit_side(direction),
                            price: fill,
                            size: open.size,
                            fee: exit_fee,
                        });
                        trades.push(TradeRecord {
                            direction,
                            entry_bar: open.entry_bar,
                            exit_bar: bar,
                            entry_time: input.timestamps[open.entry_bar],
                            exit_time: timestamp,
                            entry_price: open.entry_price,
                            exit_price: fill,
                            size: open.size,
                            pnl,
                            return_pct: if invested > 0.0 { pnl / invested } else { 0.0 },
                            exit_reason,
                        });
                        exited = true;
                    }
                    None => position = Some(open),
                }
            }

            // Conflicting signals on a flat bar are ignored.
            if position.is_none() && !exited && input.entries[bar] && !input.exits[bar] && cash > 0.0
            {
                let fill = match direction {
                    TradeDirection::Long => price * (1.0 + risk.slippage),
                    TradeDirection::Short => price * (1.0 - risk.slippage),
                };
                let size = cash / (fill * (1.0 + risk.fee));
                let entry_fee = size * fill * risk.fee;
                cash -= size * fill + entry_fee;

                orders.push(OrderRecord {
                    bar,
                    timestamp,
                    side: entry_side(direction),
                    price: fill,
                    size,
                    fee: entry_fee,
                });
                position = Some(OpenPosition {
                    entry_bar: bar,
                    entry_price: fill,
                    entry_fee,
                    size,
                    extreme: price,
                });
            }

            let held = position
                .as_ref()
                .map_or(0.0, |p| p.market_value(direction, price));
            equity_curve.push(cash + held);
        }

        let metrics = Metrics::compute(
            &equity_curve,
            &trades,
            input.periods_per_year,
            self.risk_free_rate,
        );
        tracing::trace!(
            bars = n,
            orders = orders.len(),
            trades = trades.len(),
            total_return = metrics.total_return,
            "simulation finished"
        );

        Ok(SimulationResult {
            metrics,
            orders,
            trades,
            equity_curve,
            open_position: position.is_some(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    fn timestamps(n: usize) -> Vec<NaiveDateTime> {
        let t0 = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        (0..n).map(|i| t0 + Duration::hours(i as i64)).collect()
    }

    fn flags(n: usize, at: &[usize]) -> Vec<bool> {
        (0..n).map(|i| at.contains(&i)).collect()
    }

    fn run(
        close: &[f64],
        entries: &[usize],
        exits: &[usize],
        risk: RiskParams,
        direction: TradeDirection,
    ) -> Result<SimulationResult, OptitraderError> {
        let n = close.len();
        let ts = timestamps(n);
        let entries = flags(n, entries);
        let exits = flags(n, exits);
        let input = SimulationInput {
            timestamps: &ts,
            close,
            entries: &entries,
            exits: &exits,
            risk,
            direction,
            periods_per_year: 8760.0,
        };
        VectorSimulator::default().simulate(&input)
    }

    #[test]
    fn no_signals_keeps_capital() {
        let r = run(&[100.0, 101.0, 99.0], &[], &[], RiskParams::default(), TradeDirection::Long)
            .unwrap();
        assert!(r.orders.is_empty());
        assert!(r.equity_curve.iter().all(|e| *e == DEFAULT_INITIAL_CAPITAL));
        assert_eq!(r.metrics.total_return, 0.0);
        assert!(!r.open_position);
    }

    #[test]
    fn long_round_trip() {
        let r = run(
            &[100.0, 110.0, 121.0],
            &[0],
            &[2],
            RiskParams::default(),
            TradeDirection::Long,
        )
        .unwrap();
        assert_eq!(r.orders.len(), 2);
        assert_eq!(r.orders[0].side, OrderSide::Buy);
        assert_eq!(r.orders[1].side, OrderSide::Sell);
        assert_eq!(r.trades.len(), 1);
        let t = &r.trades[0];
        assert_eq!(t.exit_reason, ExitReason::Signal);
        assert_relative_eq!(t.size, 100.0);
        assert_relative_eq!(t.pnl, 2_100.0, epsilon = 1e-9);
        assert_relative_eq!(t.return_pct, 0.21, epsilon = 1e-12);
        assert_relative_eq!(r.equity_curve[1], 11_000.0, epsilon = 1e-9);
        assert_relative_eq!(r.metrics.total_return, 0.21, epsilon = 1e-12);
    }

    #[test]
    fn fees_and_slippage_reduce_pnl() {
        let risk = RiskParams {
            fee: 0.001,
            slippage: 0.001,
            ..RiskParams::default()
        };
        let clean = run(&[100.0, 121.0], &[0], &[1], RiskParams::default(), TradeDirection::Long)
            .unwrap();
        let costly = run(&[100.0, 121.0], &[0], &[1], risk, TradeDirection::Long).unwrap();
        assert!(costly.metrics.total_return < clean.metrics.total_return);
        assert!(costly.orders[0].price > 100.0);
        assert!(costly.orders[1].price < 121.0);
        assert!(costly.orders.iter().all(|o| o.fee > 0.0));
    }

    #[test]
    fn short_profits_from_decline() {
        let r = run(
            &[100.0, 95.0, 90.0],
            &[0],
            &[2],
            RiskParams::default(),
            TradeDirection::Short,
        )
        .unwrap();
        assert_eq!(r.orders[0].side, OrderSide::Sell);
        assert_eq!(r.orders[1].side, OrderSide::Buy);
        assert_relative_eq!(r.equity_curve[1], 10_500.0, epsilon = 1e-9);
        assert_relative_eq!(r.trades[0].pnl, 1_000.0, epsilon = 1e-9);
        assert_relative_eq!(r.metrics.total_return, 0.1, epsilon = 1e-12);
    }

    #[test]
    fn stop_loss_exits_on_close() {
        let risk = RiskParams {
            sl_stop: 0.05,
            ..RiskParams::default()
        };
        let r = run(&[100.0, 94.0, 120.0], &[0], &[], risk, TradeDirection::Long).unwrap();
        assert_eq!(r.trades.len(), 1);
        assert_eq!(r.trades[0].exit_reason, ExitReason::StopLoss);
        assert_eq!(r.trades[0].exit_bar, 1);
        assert!(!r.open_position);
        assert_relative_eq!(r.equity_curve[2], 9_400.0, epsilon = 1e-9);
    }

    #[test]
    fn take_profit_and_trailing_stop() {
        let tp = RiskParams {
            tp_stop: 0.1,
            ..RiskParams::default()
        };
        let r = run(&[100.0, 105.0, 111.0], &[0], &[], tp, TradeDirection::Long).unwrap();
        assert_eq!(r.trades[0].exit_reason, ExitReason::TakeProfit);
        assert_eq!(r.trades[0].exit_bar, 2);

        let tsl = RiskParams {
            tsl_stop: 0.1,
            ..RiskParams::default()
        };
        let r = run(&[100.0, 120.0, 109.0, 107.0], &[0], &[], tsl, TradeDirection::Long).unwrap();
        assert_eq!(r.trades[0].exit_reason, ExitReason::TrailingStop);
        assert_eq!(r.trades[0].exit_bar, 3);
    }

    #[test]
    fn short_stop_loss_above_entry() {
        let risk = RiskParams {
            sl_stop: 0.05,
            ..RiskParams::default()
        };
        let r = run(&[100.0, 106.0], &[0], &[], risk, TradeDirection::Short).unwrap();
        assert_eq!(r.trades[0].exit_reason, ExitReason::StopLoss);
    }

    #[test]
    fn open_position_is_marked_to_market() {
        let r = run(&[100.0, 150.0], &[0], &[], RiskParams::default(), TradeDirection::Long)
            .unwrap();
        assert!(r.open_position);
        assert!(r.trades.is_empty());
        assert_eq!(r.last_order().map(|o| o.side), Some(OrderSide::Buy));
        assert_relative_eq!(r.metrics.total_return, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn no_reentry_on_exit_bar() {
        let r = run(
            &[100.0, 101.0, 102.0],
            &[0, 1],
            &[1],
            RiskParams::default(),
            TradeDirection::Long,
        )
        .unwrap();
        assert_eq!(r.orders.len(), 2);
        assert!(!r.open_position);
    }

    #[test]
    fn rejects_bad_input() {
        let err = run(&[100.0, 0.0], &[0], &[], RiskParams::default(), TradeDirection::Long)
            .unwrap_err();
        assert!(matches!(err, OptitraderError::Simulation { .. }));

        let risk = RiskParams {
            fee: -0.1,
            ..RiskParams::default()
        };
        assert!(run(&[100.0, 101.0], &[0], &[], risk, TradeDirection::Long).is_err());
    }
}
