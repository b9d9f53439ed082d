//! Watchlist engine
//!
//! Turns screen results into watchlist diffs and pushes them to the
//! backfill coordinator and stream supervisor. Watchlist mutation and
//! stream reconciliation happen under one lock, always taken in the order
//! watchlist state then supervisor.

use super::{WatchlistDiff, WatchlistError, WatchlistSnapshot};
use crate::backfill::BackfillCoordinator;
use crate::config::Config;
use crate::screen::{is_valid_ticker, ScreenRunner};
use crate::session::MarketSessionClock;
use crate::stream::StreamSupervisor;
use crate::telemetry::{set_gauge, GaugeMetric};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// Watchlist knobs
#[derive(Debug, Clone)]
pub struct WatchlistSettings {
    pub max_size: usize,
    /// Exchange used for backfill jobs
    pub exchange: String,
    /// Run live streams for watchlisted symbols at startup
    pub streaming: bool,
}

impl WatchlistSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_size: config.watchlist.max_watchlist_size,
            exchange: config.watchlist.default_exchange.clone(),
            streaming: config.live.enabled,
        }
    }
}

impl Default for WatchlistSettings {
    fn default() -> Self {
        Self {
            max_size: 50,
            exchange: "NASDAQ".to_string(),
            streaming: true,
        }
    }
}

#[derive(Debug, Default)]
struct WatchlistState {
    current: BTreeSet<String>,
    previous: BTreeSet<String>,
    paused: bool,
    /// Live streaming switched on
    streaming: bool,
    last_cycle: Option<DateTime<Utc>>,
}

/// Owns the watchlist and drives backfill and streaming from it
pub struct WatchlistEngine {
    clock: Arc<MarketSessionClock>,
    screens: ScreenRunner,
    backfill: BackfillCoordinator,
    supervisor: Arc<Mutex<StreamSupervisor>>,
    settings: WatchlistSettings,
    state: Mutex<WatchlistState>,
}

impl WatchlistEngine {
    pub fn new(
        clock: Arc<MarketSessionClock>,
        screens: ScreenRunner,
        backfill: BackfillCoordinator,
        supervisor: Arc<Mutex<StreamSupervisor>>,
        settings: WatchlistSettings,
    ) -> Self {
        Self {
            clock,
            screens,
            backfill,
            supervisor,
            state: Mutex::new(WatchlistState {
                streaming: settings.streaming,
                ..WatchlistState::default()
            }),
            settings,
        }
    }

    pub fn settings(&self) -> &WatchlistSettings {
        &self.settings
    }

    /// Run one screening cycle now
    pub async fn cycle(&self) -> Option<WatchlistDiff> {
        self.cycle_at(Utc::now()).await
    }

    /// Run one screening cycle as of `now`
    ///
    /// Returns `None` while paused. A failed screen leaves the watchlist
    /// untouched and returns an empty diff.
    pub async fn cycle_at(&self, now: DateTime<Utc>) -> Option<WatchlistDiff> {
        if self.state.lock().await.paused {
            tracing::info!("Screening paused, skipping watchlist update");
            return None;
        }

        let phase = self.clock.phase(now);
        let candidates = match self.screens.try_run(phase).await {
            Ok(symbols) => symbols,
            Err(_) => {
                tracing::warn!(%phase, "Screen unavailable, keeping current watchlist");
                return Some(WatchlistDiff::default());
            }
        };

        let found = candidates.len();
        if found > self.settings.max_size {
            tracing::info!(
                found,
                limit = self.settings.max_size,
                "Limiting watchlist size"
            );
        }
        let next: BTreeSet<String> = candidates.into_iter().take(self.settings.max_size).collect();

        let mut state = self.state.lock().await;
        // Paused while the screen was running
        if state.paused {
            return None;
        }

        let diff = WatchlistDiff::between(&state.current, &next);
        state.previous = std::mem::replace(&mut state.current, next);
        state.last_cycle = Some(now);

        if !diff.added.is_empty() {
            tracing::info!(symbols = ?diff.added, "Added to watchlist");
        }
        if !diff.removed.is_empty() {
            tracing::info!(symbols = ?diff.removed, "Removed from watchlist");
        }

        for symbol in &diff.added {
            self.backfill.spawn(symbol, &self.settings.exchange);
        }
        self.reconcile(&state).await;

        tracing::info!(%phase, size = state.current.len(), "Watchlist updated");
        Some(diff)
    }

    /// Bring streams in line with the watchlist; caller holds the state lock
    async fn reconcile(&self, state: &MutexGuard<'_, WatchlistState>) {
        set_gauge(GaugeMetric::WatchlistSize, state.current.len() as f64);
        if !state.streaming {
            return;
        }

        let report = self.supervisor.lock().await.sync(&state.current).await;
        if !report.capacity_skipped.is_empty() {
            tracing::warn!(
                symbols = ?report.capacity_skipped,
                "Watchlisted symbols without a stream"
            );
        }
    }

    /// Add a symbol by hand
    ///
    /// `Ok(false)` when it is already watchlisted.
    pub async fn add(&self, symbol: &str) -> Result<bool, WatchlistError> {
        let symbol = symbol.trim().to_uppercase();
        if !is_valid_ticker(&symbol) {
            return Err(WatchlistError::InvalidSymbol(symbol));
        }

        let mut state = self.state.lock().await;
        if state.current.contains(&symbol) {
            return Ok(false);
        }
        if state.current.len() >= self.settings.max_size {
            return Err(WatchlistError::WatchlistFull {
                symbol,
                max: self.settings.max_size,
            });
        }

        state.previous = state.current.clone();
        state.current.insert(symbol.clone());
        tracing::info!(symbol = %symbol, "Manually added to watchlist");

        self.backfill.spawn(&symbol, &self.settings.exchange);
        self.reconcile(&state).await;
        Ok(true)
    }

    /// Remove a symbol by hand
    ///
    /// `Ok(false)` when it was not watchlisted.
    pub async fn remove(&self, symbol: &str) -> Result<bool, WatchlistError> {
        let symbol = symbol.trim().to_uppercase();

        let mut state = self.state.lock().await;
        if !state.current.contains(&symbol) {
            return Ok(false);
        }

        state.previous = state.current.clone();
        state.current.remove(&symbol);
        tracing::info!(symbol = %symbol, "Manually removed from watchlist");

        self.reconcile(&state).await;
        Ok(true)
    }

    /// Empty the watchlist, stopping every stream; returns symbols removed
    pub async fn clear(&self) -> usize {
        let mut state = self.state.lock().await;
        if state.current.is_empty() {
            return 0;
        }

        state.previous = std::mem::take(&mut state.current);
        let removed = state.previous.len();
        tracing::info!(removed, "Watchlist cleared");

        self.reconcile(&state).await;
        removed
    }

    /// Stop periodic updates; `false` if already paused
    pub async fn pause(&self) -> bool {
        let mut state = self.state.lock().await;
        let changed = !state.paused;
        state.paused = true;
        if changed {
            tracing::info!("Screening paused");
        }
        changed
    }

    /// Resume periodic updates; `false` if not paused
    pub async fn resume(&self) -> bool {
        let mut state = self.state.lock().await;
        let changed = state.paused;
        state.paused = false;
        if changed {
            tracing::info!("Screening resumed");
        }
        changed
    }

    /// Start streams for the whole watchlist; `false` if already streaming
    pub async fn start_live(&self) -> bool {
        let mut state = self.state.lock().await;
        if state.streaming {
            return false;
        }

        state.streaming = true;
        tracing::info!(symbols = state.current.len(), "Live streaming started");
        self.reconcile(&state).await;
        true
    }

    /// Stop every stream and keep them stopped; `false` if not streaming
    ///
    /// The watchlist itself keeps updating.
    pub async fn stop_live(&self) -> bool {
        let mut state = self.state.lock().await;
        if !state.streaming {
            return false;
        }

        state.streaming = false;
        let mut supervisor = self.supervisor.lock().await;
        let timeout = supervisor.settings().stop_timeout;
        supervisor.stop_all(timeout).await;
        tracing::info!("Live streaming stopped");
        true
    }

    pub async fn snapshot(&self) -> WatchlistSnapshot {
        let state = self.state.lock().await;
        WatchlistSnapshot {
            symbols: state.current.iter().cloned().collect(),
            previous: state.previous.iter().cloned().collect(),
            paused: state.paused,
            streaming: state.streaming,
            last_cycle: state.last_cycle,
            max_size: self.settings.max_size,
        }
    }
}
