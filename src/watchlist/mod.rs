//! Watchlist
//!
//! The engine owns the watchlist. Other components only ever see a
//! [`WatchlistSnapshot`].

mod engine;

pub use engine::{WatchlistEngine, WatchlistSettings};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use thiserror::Error;

/// Symbols that entered and left the watchlist in one update
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WatchlistDiff {
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
}

impl WatchlistDiff {
    /// Diff between two watchlist states
    pub fn between(previous: &BTreeSet<String>, current: &BTreeSet<String>) -> Self {
        Self {
            added: current.difference(previous).cloned().collect(),
            removed: previous.difference(current).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Immutable view of the watchlist
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchlistSnapshot {
    /// Current symbols, sorted
    pub symbols: Vec<String>,
    /// Symbols before the last update, sorted
    pub previous: Vec<String>,
    pub paused: bool,
    /// Live streams are switched on
    pub streaming: bool,
    pub last_cycle: Option<DateTime<Utc>>,
    pub max_size: usize,
}

impl WatchlistSnapshot {
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.iter().any(|s| s == symbol)
    }
}

/// Manual watchlist edit errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WatchlistError {
    #[error("Invalid symbol: {0:?}")]
    InvalidSymbol(String),
    #[error("Watchlist is full ({max} symbols), cannot add {symbol}")]
    WatchlistFull { symbol: String, max: usize },
}
