//! OHLCV bar types
//!
//! Bars are immutable once fetched. Within a (symbol, timeframe) partition
//! the bar timestamp is the dedup key.

mod indicators;

pub use indicators::{enrich, Indicators};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Which path wrote a bar
///
/// Only live bars are subject to the retention sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarSource {
    #[default]
    Backfill,
    Live,
}

impl BarSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            BarSource::Backfill => "backfill",
            BarSource::Live => "live",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown bar source: {0}")]
pub struct BarSourceParseError(pub String);

impl FromStr for BarSource {
    type Err = BarSourceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "backfill" => Ok(BarSource::Backfill),
            "live" => Ok(BarSource::Live),
            other => Err(BarSourceParseError(other.to_string())),
        }
    }
}

/// A single OHLCV bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Bar open time (UTC)
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: u64,
    /// Indicator values, filled by [`enrich`]
    #[serde(default)]
    pub indicators: Indicators,
    #[serde(default)]
    pub source: BarSource,
}

impl Bar {
    /// Create a bar without indicator values
    pub fn new(
        timestamp: DateTime<Utc>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: u64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            indicators: Indicators::default(),
            source: BarSource::Backfill,
        }
    }

    pub fn with_source(mut self, source: BarSource) -> Self {
        self.source = source;
        self
    }
}

/// Sort bars chronologically and drop repeated timestamps (first wins)
pub fn normalize_bars(mut bars: Vec<Bar>) -> Vec<Bar> {
    bars.sort_by_key(|b| b.timestamp);
    bars.dedup_by_key(|b| b.timestamp);
    bars
}

/// Most bars a provider will hand back for one request
pub const MAX_BARS_PER_REQUEST: u32 = 5000;

/// Bar interval supported by the market data provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Interval {
    OneMinute,
    ThreeMinutes,
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    FortyFiveMinutes,
    OneHour,
    TwoHours,
    ThreeHours,
    FourHours,
    Daily,
    Weekly,
    Monthly,
}

/// Unknown interval string
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unsupported interval: {0}")]
pub struct IntervalParseError(pub String);

impl Interval {
    /// Canonical string form, also used as the store timeframe key
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::OneMinute => "1m",
            Interval::ThreeMinutes => "3m",
            Interval::FiveMinutes => "5m",
            Interval::FifteenMinutes => "15m",
            Interval::ThirtyMinutes => "30m",
            Interval::FortyFiveMinutes => "45m",
            Interval::OneHour => "1h",
            Interval::TwoHours => "2h",
            Interval::ThreeHours => "3h",
            Interval::FourHours => "4h",
            Interval::Daily => "1D",
            Interval::Weekly => "1W",
            Interval::Monthly => "1M",
        }
    }

    /// Length of one bar in minutes, `None` for daily and longer
    pub fn minutes(&self) -> Option<u32> {
        match self {
            Interval::OneMinute => Some(1),
            Interval::ThreeMinutes => Some(3),
            Interval::FiveMinutes => Some(5),
            Interval::FifteenMinutes => Some(15),
            Interval::ThirtyMinutes => Some(30),
            Interval::FortyFiveMinutes => Some(45),
            Interval::OneHour => Some(60),
            Interval::TwoHours => Some(120),
            Interval::ThreeHours => Some(180),
            Interval::FourHours => Some(240),
            Interval::Daily | Interval::Weekly | Interval::Monthly => None,
        }
    }

    /// Number of bars covering `hours` of history
    ///
    /// Intraday intervals are capped at [`MAX_BARS_PER_REQUEST`], daily and
    /// longer ask for one bar per day capped at 1000. At least 10 bars are
    /// always requested.
    pub fn bars_for_hours(&self, hours: u32) -> u32 {
        let bars = match self.minutes() {
            Some(minutes) => {
                let total = u64::from(hours) * 60 / u64::from(minutes);
                total.min(u64::from(MAX_BARS_PER_REQUEST)) as u32
            }
            None => (hours / 24).min(1000),
        };
        bars.max(10)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = IntervalParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let interval = match s.trim() {
            "1m" => Interval::OneMinute,
            "3m" => Interval::ThreeMinutes,
            "5m" => Interval::FiveMinutes,
            "15m" => Interval::FifteenMinutes,
            "30m" => Interval::ThirtyMinutes,
            "45m" => Interval::FortyFiveMinutes,
            "1h" => Interval::OneHour,
            "2h" => Interval::TwoHours,
            "3h" => Interval::ThreeHours,
            "4h" => Interval::FourHours,
            "1D" => Interval::Daily,
            "1W" => Interval::Weekly,
            "1M" => Interval::Monthly,
            other => return Err(IntervalParseError(other.to_string())),
        };
        Ok(interval)
    }
}

impl TryFrom<String> for Interval {
    type Error = IntervalParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Interval> for String {
    fn from(interval: Interval) -> Self {
        interval.as_str().to_string()
    }
}
