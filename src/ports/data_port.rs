//! Market data port trait.

use crate::domain::error::OptitraderError;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::timeframe::Timeframe;
use chrono::NaiveDateTime;

pub trait DataPort {
    /// Bars for `symbol` at native `timeframe` frequency within `[start, end]`,
    /// in ascending timestamp order.
    fn fetch_series(
        &self,
        symbol: &str,
        timeframe: &Timeframe,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<OhlcvBar>, OptitraderError>;
}
