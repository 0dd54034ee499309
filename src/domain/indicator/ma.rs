//! Simple moving average.
//!
//! MA(n)[i] = mean(x[i-n+1..=i]). Warmup: first (n-1) values are NaN, and
//! any window that contains NaN is NaN.

pub fn calculate_ma(values: &[f64], window: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if window == 0 {
        return out;
    }
    for i in window.saturating_sub(1)..values.len() {
        let slice = &values[i + 1 - window..=i];
        out[i] = slice.iter().sum::<f64>() / window as f64;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ma_warmup_and_values() {
        let out = calculate_ma(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert!(out[0].is_nan());
        assert!(out[1].is_nan());
        assert!((out[2] - 2.0).abs() < 1e-12);
        assert!((out[3] - 3.0).abs() < 1e-12);
        assert!((out[4] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn ma_window_longer_than_input() {
        let out = calculate_ma(&[1.0, 2.0], 5);
        assert!(out.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn ma_nan_in_window_propagates() {
        let out = calculate_ma(&[1.0, f64::NAN, 3.0, 4.0, 5.0], 2);
        assert!(out[1].is_nan());
        assert!(out[2].is_nan());
        assert!((out[3] - 3.5).abs() < 1e-12);
    }

    #[test]
    fn ma_window_zero() {
        assert!(calculate_ma(&[1.0, 2.0], 0).iter().all(|v| v.is_nan()));
    }
}
