//! Multi-timeframe alignment.
//!
//! Slower-timeframe channels are projected onto the fastest timeframe's
//! index using only bars that have already been stamped, never later ones.

use crate::domain::timeframe::Timeframe;
use chrono::NaiveDateTime;
use std::collections::BTreeMap;

/// The timeframe with the smallest bar duration.
///
/// Equal durations (`60m` vs `1h`) resolve to the lexicographically smaller
/// label, which is the map's own key order.
pub fn identify_fastest<V>(series: &BTreeMap<Timeframe, V>) -> Option<&Timeframe> {
    series.keys().next()
}

/// Forward-fill a slow series onto the fast index.
///
/// Each fast timestamp takes the value of the latest slow bar stamped at or
/// before it. Fast timestamps ahead of the first slow bar are NaN.
pub fn resample_to_fastest(
    slow_index: &[NaiveDateTime],
    slow_values: &[f64],
    fast_index: &[NaiveDateTime],
) -> Vec<f64> {
    let mut out = Vec::with_capacity(fast_index.len());
    let mut cursor: Option<usize> = None;
    let mut next = 0usize;
    let n = slow_index.len().min(slow_values.len());

    for ts in fast_index {
        while next < n && slow_index[next] <= *ts {
            cursor = Some(next);
            next += 1;
        }
        out.push(cursor.map_or(f64::NAN, |i| slow_values[i]));
    }
    out
}

/// Divide a channel by the concurrent close.
pub fn normalize(channel: &[f64], close: &[f64]) -> Vec<f64> {
    channel
        .iter()
        .zip(close)
        .map(|(&v, &c)| {
            if c == 0.0 || c.is_nan() {
                f64::NAN
            } else {
                v / c
            }
        })
        .collect()
}
