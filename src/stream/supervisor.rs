//! Stream supervisor
//!
//! Keeps at most one poller per symbol and at most
//! `max_concurrent_streams` pollers overall. Removals are fully stopped
//! before additions start, so a reconciliation never exceeds the limit.

use super::{PollerExit, PollerSettings, StreamHandle, StreamHealth, StreamState, SymbolPoller};
use crate::config::Config;
use crate::provider::MarketDataProvider;
use crate::store::BarStore;
use crate::telemetry::{increment, set_gauge, CounterMetric, GaugeMetric};
use futures_util::future::join_all;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Supervisor knobs
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    /// Exchange passed to every poller
    pub exchange: String,
    pub max_concurrent_streams: usize,
    /// How long a single removal waits for its poller to exit
    pub stop_timeout: Duration,
    pub poller: PollerSettings,
}

impl SupervisorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            exchange: config.watchlist.default_exchange.clone(),
            max_concurrent_streams: config.live.max_concurrent_streams(),
            stop_timeout: config.live.stop_timeout(),
            poller: PollerSettings::from_config(config),
        }
    }
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            exchange: "NASDAQ".to_string(),
            max_concurrent_streams: 50,
            stop_timeout: Duration::from_secs(10),
            poller: PollerSettings::default(),
        }
    }
}

/// What a reconciliation pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub stopped: Vec<String>,
    pub started: Vec<String>,
    /// Symbols left without a stream because the limit was reached
    pub capacity_skipped: Vec<String>,
}

/// Owns the symbol to stream map
pub struct StreamSupervisor {
    provider: Arc<dyn MarketDataProvider>,
    store: Arc<dyn BarStore>,
    settings: SupervisorSettings,
    streams: HashMap<String, StreamHandle>,
}

impl StreamSupervisor {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        store: Arc<dyn BarStore>,
        settings: SupervisorSettings,
    ) -> Self {
        Self {
            provider,
            store,
            settings,
            streams: HashMap::new(),
        }
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    /// Stop streams for `removed`, then start streams for `added`
    ///
    /// Symbols are processed in ascending order. Removing a symbol without
    /// a stream and adding one that already streams are no-ops.
    pub async fn reconcile(
        &mut self,
        added: &BTreeSet<String>,
        removed: &BTreeSet<String>,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for symbol in removed {
            let Some(handle) = self.streams.remove(symbol) else {
                continue;
            };
            let exit = handle.stop(self.settings.stop_timeout).await;
            tracing::info!(symbol = %symbol, ?exit, "Stopped stream");
            report.stopped.push(symbol.clone());
        }

        for symbol in added {
            if self.streams.contains_key(symbol) {
                tracing::debug!(symbol = %symbol, "Stream already running");
                continue;
            }

            if self.streams.len() >= self.settings.max_concurrent_streams {
                tracing::warn!(
                    symbol = %symbol,
                    active = self.streams.len(),
                    limit = self.settings.max_concurrent_streams,
                    "Stream limit reached, symbol not streamed"
                );
                increment(CounterMetric::CapacitySkips, 1);
                report.capacity_skipped.push(symbol.clone());
                continue;
            }

            self.start(symbol);
            report.started.push(symbol.clone());
        }

        set_gauge(GaugeMetric::ActiveStreams, self.streams.len() as f64);
        report
    }

    /// Reconcile the running streams against the full `target` set
    pub async fn sync(&mut self, target: &BTreeSet<String>) -> ReconcileReport {
        let current: BTreeSet<String> = self.streams.keys().cloned().collect();
        let added = target.difference(&current).cloned().collect();
        let removed = current.difference(target).cloned().collect();
        self.reconcile(&added, &removed).await
    }

    fn start(&mut self, symbol: &str) {
        let state = Arc::new(StreamState::new());
        let cancel = CancellationToken::new();

        let poller = SymbolPoller::new(
            symbol,
            self.settings.exchange.clone(),
            self.provider.clone(),
            self.store.clone(),
            self.settings.poller.clone(),
            state.clone(),
            cancel.clone(),
        );
        let task = tokio::spawn(poller.run());

        let handle = StreamHandle::new(
            symbol.to_string(),
            self.settings.exchange.clone(),
            state,
            cancel,
            task,
        );
        tracing::debug!(symbol = %symbol, id = %handle.id(), "Spawned stream");
        self.streams.insert(symbol.to_string(), handle);
    }

    /// Stop every stream, waiting up to `timeout` for all of them together
    ///
    /// Stragglers are aborted. The map is empty afterwards either way.
    pub async fn stop_all(&mut self, timeout: Duration) {
        if self.streams.is_empty() {
            return;
        }

        let handles: Vec<StreamHandle> = self.streams.drain().map(|(_, h)| h).collect();
        let count = handles.len();
        tracing::info!(count, "Stopping all streams");

        for handle in &handles {
            handle.cancel();
        }
        let aborts: Vec<_> = handles.iter().map(StreamHandle::abort_handle).collect();
        let tasks = handles.into_iter().map(StreamHandle::into_task);

        match tokio::time::timeout(timeout, join_all(tasks)).await {
            Ok(results) => {
                let quarantined = results
                    .iter()
                    .filter(|r| matches!(r, Ok(PollerExit::Quarantined)))
                    .count();
                tracing::info!(count, quarantined, "All streams stopped");
            }
            Err(_) => {
                tracing::warn!(
                    count,
                    timeout_ms = timeout.as_millis() as u64,
                    "Streams did not stop in time, aborting"
                );
                for abort in aborts {
                    abort.abort();
                }
            }
        }

        set_gauge(GaugeMetric::ActiveStreams, 0.0);
    }

    /// Health of every stream, ordered by symbol
    pub fn health(&self) -> Vec<StreamHealth> {
        let mut health: Vec<_> = self.streams.values().map(StreamHandle::health).collect();
        health.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        health
    }

    pub fn is_streaming(&self, symbol: &str) -> bool {
        self.streams.contains_key(symbol)
    }

    pub fn symbols(&self) -> BTreeSet<String> {
        self.streams.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}
