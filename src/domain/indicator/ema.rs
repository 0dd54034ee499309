//! Exponential moving average.
//!
//! k = 2/(n+1), seeded with the SMA of the first n finite values, then
//! EMA[i] = x[i]*k + EMA[i-1]*(1-k). Leading NaNs are skipped before seeding.

pub fn calculate_ema(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 {
        return out;
    }
    let Some(start) = values.iter().position(|v| !v.is_nan()) else {
        return out;
    };
    let seed_end = start + period;
    if seed_end > values.len() {
        return out;
    }

    let k = 2.0 / (period as f64 + 1.0);
    let mut ema = values[start..seed_end].iter().sum::<f64>() / period as f64;
    out[seed_end - 1] = ema;
    for i in seed_end..values.len() {
        ema = values[i] * k + ema * (1.0 - k);
        out[i] = ema;
    }
    out
}
