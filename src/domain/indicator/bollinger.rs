//! Bollinger Bands.
//!
//! - Middle: simple moving average over n closes
//! - Upper/Lower: middle ± alpha × population standard deviation
//! - Bandwidth: (upper - lower) / middle
//!
//! Warmup: first (n-1) values are NaN.

#[derive(Debug, Clone, PartialEq)]
pub struct Bands {
    pub lower: Vec<f64>,
    pub middle: Vec<f64>,
    pub upper: Vec<f64>,
    pub bandwidth: Vec<f64>,
}

pub fn calculate_bbands(close: &[f64], window: usize, alpha: f64) -> Bands {
    let len = close.len();
    let mut bands = Bands {
        lower: vec![f64::NAN; len],
        middle: vec![f64::NAN; len],
        upper: vec![f64::NAN; len],
        bandwidth: vec![f64::NAN; len],
    };
    if window == 0 {
        return bands;
    }

    for i in window.saturating_sub(1)..len {
        let slice = &close[i + 1 - window..=i];
        let mean = slice.iter().sum::<f64>() / window as f64;
        let variance = slice.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / window as f64;
        let stddev = variance.sqrt();

        let upper = mean + alpha * stddev;
        let lower = mean - alpha * stddev;
        bands.middle[i] = mean;
        bands.upper[i] = upper;
        bands.lower[i] = lower;
        bands.bandwidth[i] = if mean == 0.0 {
            f64::NAN
        } else {
            (upper - lower) / mean
        };
    }
    bands
}
