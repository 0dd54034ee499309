#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use optitrader::domain::error::OptitraderError;
pub use optitrader::domain::ohlcv::OhlcvBar;
use optitrader::domain::timeframe::Timeframe;
use optitrader::ports::data_port::DataPort;
use std::cell::Cell;
use std::collections::HashMap;

/// In-memory data port keyed by `(symbol, timeframe label)`.
pub struct MockDataPort {
    pub data: HashMap<(String, String), Vec<OhlcvBar>>,
    pub errors: HashMap<String, String>,
    pub fetches: Cell<usize>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
            fetches: Cell::new(0),
        }
    }

    pub fn with_bars(mut self, symbol: &str, timeframe: &str, bars: Vec<OhlcvBar>) -> Self {
        self.data
            .insert((symbol.to_string(), timeframe.to_string()), bars);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_series(
        &self,
        symbol: &str,
        timeframe: &Timeframe,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<OhlcvBar>, OptitraderError> {
        self.fetches.set(self.fetches.get() + 1);
        if let Some(reason) = self.errors.get(symbol) {
            return Err(OptitraderError::Data {
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(&(symbol.to_string(), timeframe.label().to_string()))
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.timestamp >= start && b.timestamp <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

pub fn ts(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
}

pub fn start_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

pub fn make_bar(timestamp: NaiveDateTime, close: f64) -> OhlcvBar {
    OhlcvBar {
        timestamp,
        open: close,
        high: close * 1.01,
        low: close * 0.99,
        close,
        volume: 1_000.0,
    }
}

/// Bars from `closes`, one every `step_hours`, starting at [`start_time`].
pub fn bars_from_closes(step_hours: i64, closes: &[f64]) -> Vec<OhlcvBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| make_bar(start_time() + Duration::hours(step_hours * i as i64), c))
        .collect()
}

/// An upward drift with a slow oscillation, so crossovers happen.
pub fn wave_closes(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let x = i as f64;
            100.0 + 0.05 * x + 8.0 * (x / 15.0).sin()
        })
        .collect()
}

pub fn flat_closes(n: usize, price: f64) -> Vec<f64> {
    vec![price; n]
}

/// Aggregate hourly bars into coarser bars of `hours` each.
pub fn resample_closes(hourly: &[f64], hours: usize) -> Vec<f64> {
    hourly
        .chunks(hours)
        .filter_map(|c| c.last().copied())
        .collect()
}

pub fn wave_port(symbol: &str, n: usize) -> MockDataPort {
    MockDataPort::new().with_bars(symbol, "1h", bars_from_closes(1, &wave_closes(n)))
}
