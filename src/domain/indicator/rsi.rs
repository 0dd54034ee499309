//! RSI (Relative Strength Index) with Wilder smoothing.
//!
//! - First average: simple mean of gains/losses over the first n changes
//! - Subsequent: avg = (prev_avg * (n-1) + current) / n
//!
//! RSI = 100 - 100 / (1 + avg_gain / avg_loss); 100 when avg_loss == 0.
//! Warmup: first n values are NaN.

pub fn calculate_rsi(close: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; close.len()];
    if period == 0 || close.len() <= period {
        return out;
    }

    let mut gains = Vec::with_capacity(close.len() - 1);
    let mut losses = Vec::with_capacity(close.len() - 1);
    for w in close.windows(2) {
        let change = w[1] - w[0];
        gains.push(change.max(0.0));
        losses.push((-change).max(0.0));
    }

    let mut avg_gain = gains[..period].iter().sum::<f64>() / period as f64;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / period as f64;
    out[period] = rsi_value(avg_gain, avg_loss);

    for i in (period + 1)..close.len() {
        let idx = i - 1;
        avg_gain = (avg_gain * (period - 1) as f64 + gains[idx]) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + losses[idx]) / period as f64;
        out[i] = rsi_value(avg_gain, avg_loss);
    }
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}
