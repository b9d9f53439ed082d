//! Market session classification
//!
//! Maps wall-clock time onto the trading session phases that drive which
//! screen runs and where the backfill window is anchored.

mod clock;

pub use clock::{MarketSessionClock, SessionBoundaries};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Trading session phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketPhase {
    /// Between premarket start and premarket end
    Premarket,
    /// Regular trading hours
    MarketHours,
    /// Between market close and afterhours end
    Afterhours,
    /// Everything else, including weekends
    Closed,
}

impl MarketPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketPhase::Premarket => "premarket",
            MarketPhase::MarketHours => "market_hours",
            MarketPhase::Afterhours => "afterhours",
            MarketPhase::Closed => "closed",
        }
    }
}

impl fmt::Display for MarketPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
