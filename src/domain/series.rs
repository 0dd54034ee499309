//! Per-timeframe price series and the data scope a study runs against.

use crate::domain::align;
use crate::domain::error::OptitraderError;
use crate::domain::ohlcv::{OhlcvBar, PriceField};
use crate::domain::timeframe::Timeframe;
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;

/// Content fingerprint of one price slice.
///
/// Two slices with the same symbol, timeframe and bars share an id, so
/// indicator results keyed on it can be reused; any difference in content
/// yields a different id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SliceId(String);

impl SliceId {
    fn compute(symbol: &str, timeframe: &Timeframe, bars: &[OhlcvBar]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(symbol.as_bytes());
        hasher.update(timeframe.label().as_bytes());
        for bar in bars {
            hasher.update(&bar.timestamp.and_utc().timestamp().to_le_bytes());
            hasher.update(&bar.open.to_le_bytes());
            hasher.update(&bar.high.to_le_bytes());
            hasher.update(&bar.low.to_le_bytes());
            hasher.update(&bar.close.to_le_bytes());
            hasher.update(&bar.volume.to_le_bytes());
        }
        SliceId(hasher.finalize().to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SliceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0[..12.min(self.0.len())])
    }
}

#[derive(Debug, Clone)]
pub struct PriceSeries {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub bars: Vec<OhlcvBar>,
    slice_id: SliceId,
}

impl PriceSeries {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe, bars: Vec<OhlcvBar>) -> Self {
        let symbol = symbol.into();
        let slice_id = SliceId::compute(&symbol, &timeframe, &bars);
        Self {
            symbol,
            timeframe,
            bars,
            slice_id,
        }
    }

    pub fn slice_id(&self) -> &SliceId {
        &self.slice_id
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn timestamps(&self) -> Vec<NaiveDateTime> {
        self.bars.iter().map(|b| b.timestamp).collect()
    }

    pub fn column(&self, field: PriceField) -> Vec<f64> {
        self.bars.iter().map(|b| field.of(b)).collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.column(PriceField::Close)
    }

    /// Bars whose timestamp falls within `[start, end]`.
    pub fn between(&self, start: NaiveDateTime, end: NaiveDateTime) -> PriceSeries {
        let bars = self
            .bars
            .iter()
            .filter(|b| b.timestamp >= start && b.timestamp <= end)
            .cloned()
            .collect();
        PriceSeries::new(self.symbol.clone(), self.timeframe.clone(), bars)
    }

    /// Checks that timestamps are strictly increasing.
    pub fn ensure_ordered(&self) -> Result<(), OptitraderError> {
        match self
            .bars
            .windows(2)
            .position(|w| w[1].timestamp <= w[0].timestamp)
        {
            Some(i) => Err(OptitraderError::Data {
                reason: format!(
                    "{} {} bars are not strictly increasing at {}",
                    self.symbol,
                    self.timeframe,
                    self.bars[i + 1].timestamp
                ),
            }),
            None => Ok(()),
        }
    }
}

/// Every timeframe's series for one symbol, plus which one drives the index.
#[derive(Debug, Clone)]
pub struct DataScope {
    pub symbol: String,
    series: BTreeMap<Timeframe, PriceSeries>,
    fastest: Timeframe,
}

impl DataScope {
    pub fn new(
        symbol: impl Into<String>,
        series: BTreeMap<Timeframe, PriceSeries>,
    ) -> Result<Self, OptitraderError> {
        let symbol = symbol.into();
        for s in series.values() {
            s.ensure_ordered()?;
        }
        let fastest = align::identify_fastest(&series)
            .cloned()
            .ok_or_else(|| OptitraderError::Data {
                reason: format!("no timeframes loaded for {symbol}"),
            })?;
        Ok(Self {
            symbol,
            series,
            fastest,
        })
    }

    pub fn fastest(&self) -> &Timeframe {
        &self.fastest
    }

    pub fn fastest_series(&self) -> &PriceSeries {
        // The constructor guarantees the fastest timeframe is a key.
        &self.series[&self.fastest]
    }

    pub fn series(&self, timeframe: &Timeframe) -> Option<&PriceSeries> {
        self.series.get(timeframe)
    }

    pub fn timeframes(&self) -> impl Iterator<Item = &Timeframe> {
        self.series.keys()
    }

    pub fn len(&self) -> usize {
        self.fastest_series().len()
    }

    pub fn is_empty(&self) -> bool {
        self.fastest_series().is_empty()
    }

    pub fn index(&self) -> Vec<NaiveDateTime> {
        self.fastest_series().timestamps()
    }

    /// Restrict the scope to a range of the fastest index.
    ///
    /// Slower timeframes keep only bars stamped inside the slice's time
    /// bounds, so nothing outside the slice can leak into it.
    pub fn slice(&self, range: Range<usize>) -> Result<DataScope, OptitraderError> {
        let fast = self.fastest_series();
        if range.start >= range.end || range.end > fast.len() {
            return Err(OptitraderError::InsufficientData {
                context: format!("slice {}..{} of {}", range.start, range.end, self.symbol),
                bars: fast.len(),
                minimum: range.end,
            });
        }
        let start = fast.bars[range.start].timestamp;
        let end = fast.bars[range.end - 1].timestamp;
        let series = self
            .series
            .iter()
            .map(|(tf, s)| (tf.clone(), s.between(start, end)))
            .collect();
        Ok(DataScope {
            symbol: self.symbol.clone(),
            series,
            fastest: self.fastest.clone(),
        })
    }
}
