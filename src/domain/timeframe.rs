//! Bar timeframes such as `5m`, `4h` or `1d`.

use crate::domain::error::OptitraderError;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

const SECONDS_PER_YEAR: f64 = 365.0 * 86_400.0;

/// A bar duration with its textual label.
///
/// Ordering is by duration first, then by label, so `60m` sorts before `1h`
/// even though both last one hour.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Timeframe {
    label: String,
    seconds: i64,
}

impl Timeframe {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn seconds(&self) -> i64 {
        self.seconds
    }

    /// Number of bars in a calendar year of continuous trading.
    pub fn periods_per_year(&self) -> f64 {
        SECONDS_PER_YEAR / self.seconds as f64
    }
}

impl FromStr for Timeframe {
    type Err = OptitraderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| OptitraderError::Validation {
            field: "timeframe".into(),
            reason: format!("'{s}': {reason}"),
        };

        let label = s.trim();
        if label.len() < 2 {
            return Err(invalid("expected a count followed by m, h, d or w"));
        }
        let (count, unit) = label.split_at(label.len() - 1);
        let unit_seconds = match unit {
            "m" => 60,
            "h" => 3_600,
            "d" => 86_400,
            "w" => 604_800,
            _ => return Err(invalid("unit must be one of m, h, d, w")),
        };
        if !count.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("count must be a positive integer"));
        }
        let count: i64 = count
            .parse()
            .map_err(|_| invalid("count must be a positive integer"))?;
        if count == 0 {
            return Err(invalid("count must be a positive integer"));
        }

        Ok(Timeframe {
            label: label.to_string(),
            seconds: count * unit_seconds,
        })
    }
}

impl Ord for Timeframe {
    fn cmp(&self, other: &Self) -> Ordering {
        self.seconds
            .cmp(&other.seconds)
            .then_with(|| self.label.cmp(&other.label))
    }
}

impl PartialOrd for Timeframe {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

impl Serialize for Timeframe {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tf(s: &str) -> Timeframe {
        s.parse().unwrap()
    }

    #[test]
    fn parses_units() {
        assert_eq!(tf("1m").seconds(), 60);
        assert_eq!(tf("15m").seconds(), 900);
        assert_eq!(tf("4h").seconds(), 14_400);
        assert_eq!(tf("1d").seconds(), 86_400);
        assert_eq!(tf("1w").seconds(), 604_800);
    }

    #[test]
    fn rejects_malformed() {
        for bad in ["", "m", "0h", "1x", "-1h", "1.5h", "h1"] {
            assert!(bad.parse::<Timeframe>().is_err(), "{bad} should fail");
        }
    }

    #[test]
    fn ordering_by_duration_then_label() {
        let mut tfs = vec![tf("1d"), tf("1h"), tf("60m"), tf("5m")];
        tfs.sort();
        let labels: Vec<&str> = tfs.iter().map(|t| t.label()).collect();
        assert_eq!(labels, vec!["5m", "1h", "60m", "1d"]);
    }

    #[test]
    fn periods_per_year_daily() {
        assert!((tf("1d").periods_per_year() - 365.0).abs() < 1e-9);
    }

    #[test]
    fn display_is_label() {
        assert_eq!(tf("4h").to_string(), "4h");
    }
}
