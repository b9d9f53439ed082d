//! Phase-aware screen runner

use super::{ScreenKind, Screener};
use crate::session::MarketPhase;
use std::collections::HashSet;
use std::sync::Arc;

/// Longest symbol accepted from a screen
const MAX_TICKER_LEN: usize = 5;

/// Runs the screen matching the session phase
pub struct ScreenRunner {
    screener: Arc<dyn Screener>,
}

impl ScreenRunner {
    pub fn new(screener: Arc<dyn Screener>) -> Self {
        Self { screener }
    }

    /// Screen kind for a phase, `None` when nothing should run
    ///
    /// Afterhours reuses the regular-hours screen.
    pub fn screen_for(phase: MarketPhase) -> Option<ScreenKind> {
        match phase {
            MarketPhase::Premarket => Some(ScreenKind::Premarket),
            MarketPhase::MarketHours | MarketPhase::Afterhours => Some(ScreenKind::Regular),
            MarketPhase::Closed => None,
        }
    }

    /// Run the screen for `phase` and return cleaned symbols in rank order
    ///
    /// Screener failures are logged and produce an empty list.
    pub async fn run(&self, phase: MarketPhase) -> Vec<String> {
        self.try_run(phase).await.unwrap_or_default()
    }

    /// Like [`ScreenRunner::run`] but reports screener failures
    ///
    /// A closed market is not a failure and yields an empty list.
    pub async fn try_run(&self, phase: MarketPhase) -> anyhow::Result<Vec<String>> {
        let Some(kind) = Self::screen_for(phase) else {
            tracing::debug!(%phase, "Market closed, skipping screen");
            return Ok(Vec::new());
        };

        match self.screener.screen(kind).await {
            Ok(raw) => {
                let raw_count = raw.len();
                let symbols = normalize_symbols(raw);
                tracing::info!(
                    %phase,
                    screen = %kind,
                    raw = raw_count,
                    accepted = symbols.len(),
                    "Screen completed"
                );
                Ok(symbols)
            }
            Err(e) => {
                tracing::error!(%phase, screen = %kind, error = %e, "Screen failed");
                Err(e)
            }
        }
    }
}

/// True for 1-5 ASCII letters
pub fn is_valid_ticker(symbol: &str) -> bool {
    !symbol.is_empty()
        && symbol.len() <= MAX_TICKER_LEN
        && symbol.chars().all(|c| c.is_ascii_alphabetic())
}

/// Trim, uppercase, drop invalid tickers and duplicates, keep order
pub fn normalize_symbols<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    raw.into_iter()
        .map(|s| s.as_ref().trim().to_uppercase())
        .filter(|s| is_valid_ticker(s))
        .filter(|s| seen.insert(s.clone()))
        .collect()
}
