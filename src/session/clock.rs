//! Session clock

use super::MarketPhase;
use crate::config::{ConfigError, SessionConfig};
use chrono::{DateTime, Datelike, NaiveDateTime, NaiveTime, Timelike, Utc, Weekday};
use chrono_tz::Tz;

/// The five configured session boundaries, minute resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionBoundaries {
    pub premarket_start: NaiveTime,
    pub premarket_end: NaiveTime,
    pub market_open: NaiveTime,
    pub market_close: NaiveTime,
    pub afterhours_end: NaiveTime,
}

impl SessionBoundaries {
    /// Parse and order-check the HH:MM boundaries of a session config
    pub fn from_config(config: &SessionConfig) -> Result<Self, ConfigError> {
        let boundaries = Self {
            premarket_start: parse_hhmm("premarket_start", &config.premarket_start)?,
            premarket_end: parse_hhmm("premarket_end", &config.premarket_end)?,
            market_open: parse_hhmm("market_open", &config.market_open)?,
            market_close: parse_hhmm("market_close", &config.market_close)?,
            afterhours_end: parse_hhmm("afterhours_end", &config.afterhours_end)?,
        };

        let ordered = [
            ("premarket_start", boundaries.premarket_start),
            ("premarket_end", boundaries.premarket_end),
            ("market_open", boundaries.market_open),
            ("market_close", boundaries.market_close),
            ("afterhours_end", boundaries.afterhours_end),
        ];
        for pair in ordered.windows(2) {
            let (earlier, a) = pair[0];
            let (later, b) = pair[1];
            if a > b {
                return Err(ConfigError::BoundaryOrder { earlier, later });
            }
        }

        Ok(boundaries)
    }
}

impl Default for SessionBoundaries {
    fn default() -> Self {
        let hm = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN);
        Self {
            premarket_start: hm(4, 0),
            premarket_end: hm(9, 30),
            market_open: hm(9, 30),
            market_close: hm(16, 0),
            afterhours_end: hm(20, 0),
        }
    }
}

fn parse_hhmm(field: &'static str, value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|_| ConfigError::InvalidTime {
        field,
        value: value.to_string(),
    })
}

/// Classifies instants into [`MarketPhase`]s
///
/// Intervals are half-open `[start, end)` and compared at minute
/// resolution. Weekends are closed regardless of time of day.
#[derive(Debug, Clone)]
pub struct MarketSessionClock {
    boundaries: SessionBoundaries,
    timezone: Tz,
}

impl MarketSessionClock {
    pub fn new(boundaries: SessionBoundaries, timezone: Tz) -> Self {
        Self {
            boundaries,
            timezone,
        }
    }

    /// Build from a validated session config
    pub fn from_config(config: &SessionConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(
            SessionBoundaries::from_config(config)?,
            config.timezone()?,
        ))
    }

    pub fn boundaries(&self) -> &SessionBoundaries {
        &self.boundaries
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Current instant in the session timezone
    pub fn local(&self, now: DateTime<Utc>) -> DateTime<Tz> {
        now.with_timezone(&self.timezone)
    }

    /// Phase at a UTC instant
    pub fn phase(&self, now: DateTime<Utc>) -> MarketPhase {
        self.phase_at_local(self.local(now).naive_local())
    }

    /// Phase at a wall-clock time already expressed in the session timezone
    pub fn phase_at_local(&self, local: NaiveDateTime) -> MarketPhase {
        if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return MarketPhase::Closed;
        }

        let t = local
            .time()
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or_else(|| local.time());
        let b = &self.boundaries;

        if b.premarket_start <= t && t < b.premarket_end {
            MarketPhase::Premarket
        } else if b.market_open <= t && t < b.market_close {
            MarketPhase::MarketHours
        } else if b.market_close <= t && t < b.afterhours_end {
            MarketPhase::Afterhours
        } else {
            MarketPhase::Closed
        }
    }
}
