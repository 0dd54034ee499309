//! Momentum.
//!
//! MOM(n)[i] = C[i] - C[i-n]. Warmup: first n values are NaN.

pub fn calculate_mom(close: &[f64], period: usize) -> Vec<f64> {
    close
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            if period == 0 || i < period {
                f64::NAN
            } else {
                c - close[i - period]
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mom_values() {
        let out = calculate_mom(&[10.0, 12.0, 15.0, 11.0], 2);
        assert!(out[0].is_nan());
        assert!(out[1].is_nan());
        assert!((out[2] - 5.0).abs() < f64::EPSILON);
        assert!((out[3] + 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn mom_period_zero_is_all_nan() {
        assert!(calculate_mom(&[1.0, 2.0], 0).iter().all(|v| v.is_nan()));
    }
}
