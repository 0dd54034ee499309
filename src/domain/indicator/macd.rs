//! MACD (Moving Average Convergence Divergence).
//!
//! MACD line = EMA(fast) - EMA(slow)
//! Signal    = EMA(signal) of the MACD line
//! Histogram = MACD line - signal
//!
//! Warmup: the MACD line is NaN for max(fast, slow) - 1 bars, the signal and
//! histogram for a further (signal - 1).

use crate::domain::indicator::ema::calculate_ema;

#[derive(Debug, Clone, PartialEq)]
pub struct MacdLines {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub hist: Vec<f64>,
}

pub fn calculate_macd(close: &[f64], fast: usize, slow: usize, signal_period: usize) -> MacdLines {
    let ema_fast = calculate_ema(close, fast);
    let ema_slow = calculate_ema(close, slow);

    let macd: Vec<f64> = ema_fast
        .iter()
        .zip(&ema_slow)
        .map(|(f, s)| f - s)
        .collect();
    let signal = calculate_ema(&macd, signal_period);
    let hist = macd.iter().zip(&signal).map(|(m, s)| m - s).collect();

    MacdLines { macd, signal, hist }
}
