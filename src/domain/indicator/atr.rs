//! Average True Range with Wilder smoothing.
//!
//! TR[0] = high - low, TR[i] = max(H-L, |H-C[i-1]|, |L-C[i-1]|).
//! Seeded with the mean of the first n true ranges, then
//! ATR[i] = (ATR[i-1]*(n-1) + TR[i]) / n. Warmup: first (n-1) values are NaN.

use crate::domain::ohlcv::OhlcvBar;

pub fn true_ranges(bars: &[OhlcvBar]) -> Vec<f64> {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            if i == 0 {
                bar.high - bar.low
            } else {
                bar.true_range(bars[i - 1].close)
            }
        })
        .collect()
}

pub fn calculate_atr(bars: &[OhlcvBar], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; bars.len()];
    if period == 0 || bars.len() < period {
        return out;
    }

    let tr = true_ranges(bars);
    let mut atr = tr[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = atr;
    for i in period..bars.len() {
        atr = (atr * (period - 1) as f64 + tr[i]) / period as f64;
        out[i] = atr;
    }
    out
}
