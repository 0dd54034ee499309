//! Average Directional Index (Wilder).
//!
//! +DM/-DM and TR are Wilder-summed over n bars, giving +DI and -DI;
//! DX = 100 * |+DI - -DI| / (+DI + -DI). ADX seeds with the mean of the
//! first n DX values and is Wilder-smoothed afterwards.
//! Warmup: first (2n - 1) values are NaN.

use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_adx(bars: &[OhlcvBar], period: usize) -> Vec<f64> {
    let len = bars.len();
    let mut out = vec![f64::NAN; len];
    if period == 0 || len < 2 * period {
        return out;
    }

    let n = period as f64;
    let mut plus_dm = vec![0.0; len];
    let mut minus_dm = vec![0.0; len];
    let mut tr = vec![0.0; len];
    for i in 1..len {
        let up = bars[i].high - bars[i - 1].high;
        let down = bars[i - 1].low - bars[i].low;
        plus_dm[i] = if up > down && up > 0.0 { up } else { 0.0 };
        minus_dm[i] = if down > up && down > 0.0 { down } else { 0.0 };
        tr[i] = bars[i].true_range(bars[i - 1].close);
    }

    let mut s_plus: f64 = plus_dm[1..=period].iter().sum();
    let mut s_minus: f64 = minus_dm[1..=period].iter().sum();
    let mut s_tr: f64 = tr[1..=period].iter().sum();

    let mut dx = vec![f64::NAN; len];
    dx[period] = directional_index(s_plus, s_minus, s_tr);
    for i in (period + 1)..len {
        s_plus = s_plus - s_plus / n + plus_dm[i];
        s_minus = s_minus - s_minus / n + minus_dm[i];
        s_tr = s_tr - s_tr / n + tr[i];
        dx[i] = directional_index(s_plus, s_minus, s_tr);
    }

    let first = 2 * period - 1;
    let mut adx = dx[period..=first].iter().sum::<f64>() / n;
    out[first] = adx;
    for i in (first + 1)..len {
        adx = (adx * (n - 1.0) + dx[i]) / n;
        out[i] = adx;
    }
    out
}

fn directional_index(s_plus: f64, s_minus: f64, s_tr: f64) -> f64 {
    if s_tr == 0.0 {
        return 0.0;
    }
    let plus_di = 100.0 * s_plus / s_tr;
    let minus_di = 100.0 * s_minus / s_tr;
    let sum = plus_di + minus_di;
    if sum == 0.0 {
        0.0
    } else {
        100.0 * (plus_di - minus_di).abs() / sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn trending_bars(n: usize) -> Vec<OhlcvBar> {
        let t0 = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        (0..n)
            .map(|i| {
                let base = 100.0 + i as f64 * 2.0;
                OhlcvBar {
                    timestamp: t0 + Duration::days(i as i64),
                    open: base,
                    high: base + 1.0,
                    low: base - 1.0,
                    close: base,
                    volume: 1000.0,
                }
            })
            .collect()
    }

    #[test]
    fn adx_warmup_length() {
        let out = calculate_adx(&trending_bars(12), 3);
        assert!(out[..5].iter().all(|v| v.is_nan()));
        assert!(out[5..].iter().all(|v| !v.is_nan()));
    }

    #[test]
    fn adx_pure_uptrend_is_100() {
        // Every bar makes a higher high and a higher low: -DM is always 0.
        let out = calculate_adx(&trending_bars(20), 5);
        for v in &out[9..] {
            assert!((v - 100.0).abs() < 1e-9);
        }
    }

    #[test]
    fn adx_flat_market_is_zero() {
        let mut bars = trending_bars(10);
        for b in &mut bars {
            b.high = 101.0;
            b.low = 99.0;
            b.close = 100.0;
        }
        let out = calculate_adx(&bars, 3);
        assert!(out[5..].iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn adx_insufficient_bars() {
        assert!(calculate_adx(&trending_bars(5), 3).iter().all(|v| v.is_nan()));
    }
}
