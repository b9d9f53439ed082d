//! Screening
//!
//! The screening collaborator returns a ranked symbol list. The runner
//! picks the screen for the current session phase and cleans the result.

mod http;
mod runner;

pub use http::HttpScreener;
pub use runner::{is_valid_ticker, normalize_symbols, ScreenRunner};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which screen to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenKind {
    /// Premarket gappers
    Premarket,
    /// Regular trading hours movers
    Regular,
}

impl ScreenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScreenKind::Premarket => "premarket",
            ScreenKind::Regular => "regular",
        }
    }
}

impl fmt::Display for ScreenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for screening collaborators
#[async_trait]
pub trait Screener: Send + Sync {
    /// Run a screen and return symbols in rank order
    async fn screen(&self, kind: ScreenKind) -> anyhow::Result<Vec<String>>;
}
