//! CSV file data adapter.
//!
//! One file per symbol and timeframe, `{dir}/{symbol}_{timeframe}.csv`, with
//! a `timestamp,open,high,low,close,volume` header.

use crate::domain::error::OptitraderError;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::timeframe::Timeframe;
use crate::ports::data_port::DataPort;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::path::PathBuf;

const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];

pub struct CsvAdapter {
    base_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str, timeframe: &Timeframe) -> PathBuf {
        self.base_path.join(format!("{}_{}.csv", symbol, timeframe))
    }
}

pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

impl DataPort for CsvAdapter {
    fn fetch_series(
        &self,
        symbol: &str,
        timeframe: &Timeframe,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<OhlcvBar>, OptitraderError> {
        let path = self.csv_path(symbol, timeframe);
        if !path.exists() {
            return Err(OptitraderError::NoData {
                symbol: symbol.to_string(),
                timeframe: timeframe.to_string(),
            });
        }

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&path)
            .map_err(|e| OptitraderError::Data {
                reason: format!("failed to read {}: {}", path.display(), e),
            })?;

        let mut bars = Vec::new();
        for (line, result) in rdr.deserialize::<CsvRow>().enumerate() {
            let row = result.map_err(|e| OptitraderError::Data {
                reason: format!("{}: CSV parse error: {}", path.display(), e),
            })?;
            let timestamp = parse_timestamp(&row.timestamp).ok_or_else(|| OptitraderError::Data {
                reason: format!(
                    "{}: invalid timestamp '{}' on row {}",
                    path.display(),
                    row.timestamp,
                    line + 1
                ),
            })?;

            if timestamp < start || timestamp > end {
                continue;
            }

            bars.push(OhlcvBar {
                timestamp,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
            });
        }

        bars.sort_by_key(|b| b.timestamp);
        bars.dedup_by_key(|b| b.timestamp);
        tracing::debug!(path = %path.display(), bars = bars.len(), "csv series read");
        Ok(bars)
    }
}
