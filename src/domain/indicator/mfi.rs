//! Money Flow Index.
//!
//! Raw money flow = typical price × volume, classed positive or negative by
//! the direction of the typical price. MFI = 100 × pos / (pos + neg) over the
//! last n flows, 0 when no money moved. Warmup: first n values are NaN.

use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_mfi(bars: &[OhlcvBar], period: usize) -> Vec<f64> {
    let len = bars.len();
    let mut out = vec![f64::NAN; len];
    if period == 0 || len <= period {
        return out;
    }

    let mut pos = vec![0.0; len];
    let mut neg = vec![0.0; len];
    for i in 1..len {
        let tp = bars[i].typical_price();
        let prev_tp = bars[i - 1].typical_price();
        let flow = tp * bars[i].volume;
        if tp > prev_tp {
            pos[i] = flow;
        } else if tp < prev_tp {
            neg[i] = flow;
        }
    }

    for i in period..len {
        let p: f64 = pos[i + 1 - period..=i].iter().sum();
        let n: f64 = neg[i + 1 - period..=i].iter().sum();
        out[i] = if p + n == 0.0 { 0.0 } else { 100.0 * p / (p + n) };
    }
    out
}
