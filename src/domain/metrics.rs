//! Performance metrics and statistics.
//!
//! Ratios that are undefined for a run (zero volatility, no drawdown, no
//! downside) are NaN.

use crate::domain::simulation::TradeRecord;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metrics {
    pub total_return: f64,
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    pub omega_ratio: f64,
    /// Largest peak-to-trough decline as a positive fraction.
    pub max_drawdown: f64,
    /// Longest stretch below a prior peak, in bars.
    pub max_drawdown_duration: usize,
    pub total_trades: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub trades_breakeven: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    /// Mean holding period, in bars.
    pub avg_trade_duration: f64,
}

impl Metrics {
    pub fn compute(
        equity_curve: &[f64],
        trades: &[TradeRecord],
        periods_per_year: f64,
        risk_free_rate: f64,
    ) -> Self {
        let initial = equity_curve.first().copied().unwrap_or(0.0);
        let final_equity = equity_curve.last().copied().unwrap_or(initial);

        let total_return = if initial > 0.0 {
            (final_equity - initial) / initial
        } else {
            0.0
        };

        let periods = equity_curve.len().saturating_sub(1) as f64;
        let annualized_return = if periods > 0.0 && total_return > -1.0 {
            (1.0 + total_return).powf(periods_per_year / periods) - 1.0
        } else if total_return <= -1.0 {
            -1.0
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(equity_curve);
        let period_rf = risk_free_rate / periods_per_year;
        let returns = period_returns(equity_curve);
        let (sharpe_ratio, sortino_ratio) =
            compute_risk_adjusted(&returns, period_rf, periods_per_year);
        let omega_ratio = compute_omega(&returns, period_rf);
        let calmar_ratio = if max_drawdown > 0.0 {
            annualized_return / max_drawdown
        } else {
            f64::NAN
        };

        let mut trades_won = 0usize;
        let mut trades_lost = 0usize;
        let mut trades_breakeven = 0usize;
        let mut total_wins = 0.0_f64;
        let mut total_losses = 0.0_f64;
        let mut largest_win = 0.0_f64;
        let mut largest_loss = 0.0_f64;
        let mut total_duration = 0usize;

        for trade in trades {
            let pnl = trade.pnl;
            if pnl > 0.0 {
                trades_won += 1;
                total_wins += pnl;
                largest_win = largest_win.max(pnl);
            } else if pnl < 0.0 {
                trades_lost += 1;
                total_losses += pnl.abs();
                largest_loss = largest_loss.max(pnl.abs());
            } else {
                trades_breakeven += 1;
            }
            total_duration += trade.exit_bar.saturating_sub(trade.entry_bar);
        }

        let total_trades = trades.len();
        let win_rate = if total_trades > 0 {
            trades_won as f64 / total_trades as f64
        } else {
            0.0
        };

        let profit_factor = if total_losses > 0.0 {
            total_wins / total_losses
        } else if total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let avg_win = if trades_won > 0 {
            total_wins / trades_won as f64
        } else {
            0.0
        };
        let avg_loss = if trades_lost > 0 {
            total_losses / trades_lost as f64
        } else {
            0.0
        };
        let avg_trade_duration = if total_trades > 0 {
            total_duration as f64 / total_trades as f64
        } else {
            0.0
        };

        Metrics {
            total_return,
            annualized_return,
            sharpe_ratio,
            sortino_ratio,
            calmar_ratio,
            omega_ratio,
            max_drawdown,
            max_drawdown_duration,
            total_trades,
            trades_won,
            trades_lost,
            trades_breakeven,
            win_rate,
            profit_factor,
            avg_win,
            avg_loss,
            largest_win,
            largest_loss,
            avg_trade_duration,
        }
    }
}

fn period_returns(equity_curve: &[f64]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

fn compute_drawdown(equity_curve: &[f64]) -> (f64, usize) {
    let Some(&first) = equity_curve.first() else {
        return (0.0, 0);
    };

    let mut peak = first;
    let mut max_dd = 0.0_f64;
    let mut max_duration = 0usize;
    let mut duration = 0usize;

    for &equity in equity_curve {
        if equity >= peak {
            peak = equity;
            duration = 0;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - equity) / peak);
            duration += 1;
            max_duration = max_duration.max(duration);
        }
    }

    (max_dd, max_duration)
}

fn compute_risk_adjusted(returns: &[f64], period_rf: f64, periods_per_year: f64) -> (f64, f64) {
    if returns.len() < 2 {
        return (f64::NAN, f64::NAN);
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let stddev = variance.sqrt();
    let excess = mean - period_rf;
    let annualizer = periods_per_year.sqrt();

    let sharpe = if stddev > 0.0 {
        excess / stddev * annualizer
    } else {
        f64::NAN
    };

    let downside_sq: f64 = returns
        .iter()
        .map(|r| (r - period_rf).min(0.0).powi(2))
        .sum();
    let downside_dev = (downside_sq / n).sqrt();
    let sortino = if downside_dev > 0.0 {
        excess / downside_dev * annualizer
    } else {
        f64::NAN
    };

    (sharpe, sortino)
}

fn compute_omega(returns: &[f64], threshold: f64) -> f64 {
    let gains: f64 = returns.iter().map(|r| (r - threshold).max(0.0)).sum();
    let losses: f64 = returns.iter().map(|r| (threshold - r).max(0.0)).sum();
    if losses > 0.0 {
        gains / losses
    } else {
        f64::NAN
    }
}
