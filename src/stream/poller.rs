//! Per-symbol live poller
//!
//! Fetches the most recent bar on a fixed interval and writes it when it
//! is strictly newer than the latest stored bar. Stops on cancellation or
//! after [`MAX_CONSECUTIVE_ERRORS`] failed iterations in a row.

use super::StreamState;
use crate::bar::{BarSource, Interval};
use crate::config::Config;
use crate::provider::{BarFetch, BarRequest, BarSpan, MarketDataProvider};
use crate::store::BarStore;
use crate::telemetry::{increment, CounterMetric};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Failed iterations in a row before a poller quarantines itself
pub const MAX_CONSECUTIVE_ERRORS: u32 = 5;

/// Bars requested per poll; the newest one is used
const POLL_BARS: u32 = 2;

/// Why a poller stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerExit {
    /// Stop was requested
    Cancelled,
    /// Error threshold reached
    Quarantined,
}

/// Result of one successful poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Provider had no bars
    NoData,
    /// Newest bar is not newer than the stored latest
    Duplicate,
    /// Newest bar was written
    Written,
}

/// Poller timing and request knobs
#[derive(Debug, Clone)]
pub struct PollerSettings {
    pub interval: Interval,
    /// Wait between iterations, failed or not
    pub update_interval: Duration,
    pub extended_hours: bool,
}

impl PollerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: config.provider.interval,
            update_interval: config.live.update_interval(),
            extended_hours: config.live.enable_extended_hours,
        }
    }
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval: Interval::OneMinute,
            update_interval: Duration::from_secs(5),
            extended_hours: true,
        }
    }
}

/// Live poller for one symbol
pub struct SymbolPoller {
    symbol: String,
    exchange: String,
    provider: Arc<dyn MarketDataProvider>,
    store: Arc<dyn BarStore>,
    settings: PollerSettings,
    state: Arc<StreamState>,
    cancel: CancellationToken,
}

impl SymbolPoller {
    pub fn new(
        symbol: impl Into<String>,
        exchange: impl Into<String>,
        provider: Arc<dyn MarketDataProvider>,
        store: Arc<dyn BarStore>,
        settings: PollerSettings,
        state: Arc<StreamState>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            exchange: exchange.into(),
            provider,
            store,
            settings,
            state,
            cancel,
        }
    }

    /// Poll until cancelled or quarantined
    pub async fn run(self) -> PollerExit {
        tracing::info!(symbol = %self.symbol, exchange = %self.exchange, "Stream started");

        let exit = self.poll_loop().await;
        self.state.mark_stopped();

        match exit {
            PollerExit::Cancelled => {
                tracing::info!(symbol = %self.symbol, "Stream stopped");
            }
            PollerExit::Quarantined => {
                tracing::error!(
                    symbol = %self.symbol,
                    errors = self.state.consecutive_errors(),
                    "Too many consecutive errors, stopping stream"
                );
            }
        }

        exit
    }

    async fn poll_loop(&self) -> PollerExit {
        loop {
            if self.cancel.is_cancelled() {
                return PollerExit::Cancelled;
            }

            let result = tokio::select! {
                _ = self.cancel.cancelled() => return PollerExit::Cancelled,
                result = self.poll_once() => result,
            };

            match result {
                Ok(outcome) => {
                    tracing::trace!(symbol = %self.symbol, ?outcome, "Poll complete");
                }
                Err(e) => {
                    let errors = self.state.record_error();
                    increment(CounterMetric::PollerErrors, 1);
                    tracing::warn!(
                        symbol = %self.symbol,
                        errors,
                        error = %e,
                        "Poll failed"
                    );
                    if errors >= MAX_CONSECUTIVE_ERRORS {
                        return PollerExit::Quarantined;
                    }
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return PollerExit::Cancelled,
                _ = tokio::time::sleep(self.settings.update_interval) => {}
            }
        }
    }

    /// Fetch the newest bar and write it if it is new
    pub async fn poll_once(&self) -> anyhow::Result<PollOutcome> {
        let request = BarRequest {
            symbol: self.symbol.clone(),
            exchange: self.exchange.clone(),
            interval: self.settings.interval,
            span: BarSpan::Count(POLL_BARS),
            extended_hours: self.settings.extended_hours,
        };

        let bars = match self.provider.fetch(&request).await? {
            BarFetch::Bars(bars) => bars,
            BarFetch::NoData => return Ok(PollOutcome::NoData),
        };
        let Some(bar) = bars.into_iter().max_by_key(|b| b.timestamp) else {
            return Ok(PollOutcome::NoData);
        };

        let timeframe = self.settings.interval.as_str();
        let latest = self.store.latest_timestamp(&self.symbol, timeframe).await?;

        if latest.is_some_and(|latest| bar.timestamp <= latest) {
            increment(CounterMetric::DedupSkips, 1);
            tracing::debug!(
                symbol = %self.symbol,
                timestamp = %bar.timestamp,
                "Bar already stored, skipping"
            );
            return Ok(PollOutcome::Duplicate);
        }

        let bar = bar.with_source(BarSource::Live);
        self.store
            .append(&self.symbol, timeframe, std::slice::from_ref(&bar))
            .await?;

        self.state.record_write(Utc::now());
        increment(CounterMetric::BarsWritten, 1);
        tracing::debug!(
            symbol = %self.symbol,
            timestamp = %bar.timestamp,
            close = %bar.close,
            "Stored live bar"
        );

        Ok(PollOutcome::Written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::testing::{bar_at, minute, FlakyStore, Reply, ScriptedProvider};

    fn poller(
        provider: Arc<ScriptedProvider>,
        store: Arc<dyn BarStore>,
    ) -> (SymbolPoller, Arc<StreamState>, CancellationToken) {
        let state = Arc::new(StreamState::new());
        let cancel = CancellationToken::new();
        let poller = SymbolPoller::new(
            "AAPL",
            "NASDAQ",
            provider,
            store,
            PollerSettings::default(),
            state.clone(),
            cancel.clone(),
        );
        (poller, state, cancel)
    }

    #[tokio::test(start_paused = true)]
    async fn test_quarantine_after_exactly_five_failures() {
        let provider = ScriptedProvider::always(Reply::Fail);
        let (poller, state, _cancel) = poller(provider.clone(), Arc::new(MemoryStore::new()));

        let exit = poller.run().await;

        assert_eq!(exit, PollerExit::Quarantined);
        assert_eq!(provider.calls(), 5);
        assert_eq!(state.consecutive_errors(), MAX_CONSECUTIVE_ERRORS);
        assert!(!state.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_keep_update_cadence() {
        let provider = ScriptedProvider::always(Reply::Fail);
        let (poller, state, _cancel) = poller(provider.clone(), Arc::new(MemoryStore::new()));

        let task = tokio::spawn(poller.run());
        // Fetches at t=0, 5, 10, 15 and 20
        tokio::time::sleep(Duration::from_secs(21)).await;

        assert_eq!(provider.calls(), 5);
        assert!(task.is_finished());
        assert_eq!(task.await.unwrap(), PollerExit::Quarantined);
        assert!(!state.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_error_count() {
        let provider = ScriptedProvider::sequence(
            vec![
                Reply::Fail,
                Reply::Fail,
                Reply::Fail,
                Reply::Fail,
                Reply::Bars(vec![bar_at(0), bar_at(1)]),
                Reply::Fail,
                Reply::Fail,
                Reply::Fail,
                Reply::Fail,
            ],
            Reply::Fail,
        );
        let (poller, state, _cancel) = poller(provider.clone(), Arc::new(MemoryStore::new()));

        assert_eq!(poller.run().await, PollerExit::Quarantined);
        assert_eq!(provider.calls(), 10);
        assert_eq!(state.bars_written(), 1);
    }

    #[tokio::test]
    async fn test_dedup_against_latest_stored() {
        let store = Arc::new(MemoryStore::new());
        store.append("AAPL", "1m", &[bar_at(5)]).await.unwrap();

        let provider = ScriptedProvider::sequence(
            vec![
                Reply::Bars(vec![bar_at(4), bar_at(5)]),
                Reply::Bars(vec![bar_at(5), bar_at(6)]),
                Reply::Bars(vec![bar_at(5), bar_at(6)]),
            ],
            Reply::NoData,
        );
        let (poller, state, _cancel) = poller(provider, store.clone());

        assert_eq!(poller.poll_once().await.unwrap(), PollOutcome::Duplicate);
        assert_eq!(poller.poll_once().await.unwrap(), PollOutcome::Written);
        assert_eq!(poller.poll_once().await.unwrap(), PollOutcome::Duplicate);

        let stored = store.query("AAPL", "1m", None).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].timestamp, minute(6));
        assert_eq!(stored[1].source, BarSource::Live);
        assert_eq!(store.append_calls(), 2);
        assert_eq!(state.bars_written(), 1);
    }

    #[tokio::test]
    async fn test_older_bar_is_never_written() {
        let store = Arc::new(MemoryStore::new());
        store.append("AAPL", "1m", &[bar_at(30)]).await.unwrap();

        let provider = ScriptedProvider::always(Reply::Bars(vec![bar_at(29)]));
        let (poller, state, _cancel) = poller(provider, store.clone());

        assert_eq!(poller.poll_once().await.unwrap(), PollOutcome::Duplicate);
        assert_eq!(store.len("AAPL", "1m").await, 1);
        assert!(state.last_update().is_none());
    }

    #[tokio::test]
    async fn test_no_data_changes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let provider = ScriptedProvider::always(Reply::NoData);
        let (poller, state, _cancel) = poller(provider, store.clone());

        state.record_error();
        assert_eq!(poller.poll_once().await.unwrap(), PollOutcome::NoData);
        assert_eq!(state.consecutive_errors(), 1);
        assert_eq!(store.append_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failures_count_as_errors() {
        let store = Arc::new(FlakyStore::failing_appends());
        let provider = ScriptedProvider::always(Reply::Bars(vec![bar_at(1)]));
        let (poller, state, _cancel) = poller(provider.clone(), store);

        assert_eq!(poller.run().await, PollerExit::Quarantined);
        assert_eq!(provider.calls(), 5);
        assert_eq!(state.bars_written(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_wait() {
        let provider = ScriptedProvider::always(Reply::NoData);
        let (poller, state, cancel) = poller(provider.clone(), Arc::new(MemoryStore::new()));

        let task = tokio::spawn(poller.run());
        tokio::time::sleep(Duration::from_secs(12)).await;
        cancel.cancel();

        assert_eq!(task.await.unwrap(), PollerExit::Cancelled);
        // Fetches at t=0, 5 and 10
        assert_eq!(provider.calls(), 3);
        assert!(!state.is_active());
    }
}
