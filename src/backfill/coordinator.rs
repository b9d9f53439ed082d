//! Backfill coordinator

use super::{lookback_window, BackfillJob, UpdateMode};
use crate::bar::{enrich, normalize_bars, Interval};
use crate::config::Config;
use crate::provider::{BarFetch, BarRequest, BarSpan, MarketDataProvider};
use crate::session::MarketSessionClock;
use crate::store::{self, BarStore};
use crate::telemetry::{record_backfill, BackfillOutcome};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Backfill knobs
#[derive(Debug, Clone)]
pub struct BackfillSettings {
    pub interval: Interval,
    pub lookback_days: u32,
    pub extended_hours: bool,
    pub add_indicators: bool,
}

impl BackfillSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: config.provider.interval,
            lookback_days: config.backfill.lookback_days,
            extended_hours: config.backfill.extended_hours,
            add_indicators: config.backfill.add_indicators,
        }
    }
}

impl Default for BackfillSettings {
    fn default() -> Self {
        Self {
            interval: Interval::OneMinute,
            lookback_days: 1,
            extended_hours: true,
            add_indicators: true,
        }
    }
}

/// Runs backfill jobs against the provider and store
///
/// Cloning is cheap; clones share the task tracker.
#[derive(Clone)]
pub struct BackfillCoordinator {
    provider: Arc<dyn MarketDataProvider>,
    store: Arc<dyn BarStore>,
    clock: Arc<MarketSessionClock>,
    settings: BackfillSettings,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl BackfillCoordinator {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        store: Arc<dyn BarStore>,
        clock: Arc<MarketSessionClock>,
        settings: BackfillSettings,
    ) -> Self {
        Self {
            provider,
            store,
            clock,
            settings,
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Append-mode job for `symbol` with the window ending at `now`
    pub fn job(&self, symbol: &str, exchange: &str, now: DateTime<Utc>) -> BackfillJob {
        BackfillJob {
            symbol: symbol.to_string(),
            exchange: exchange.to_string(),
            window: lookback_window(now, &self.clock, self.settings.lookback_days),
            mode: UpdateMode::Append,
        }
    }

    /// Run one job; `false` on any failure or when no data came back
    pub async fn backfill(&self, job: &BackfillJob) -> bool {
        tracing::info!(
            symbol = %job.symbol,
            start = %job.window.start,
            hours = job.window.hours,
            mode = ?job.mode,
            "Starting backfill"
        );

        match self.execute(job).await {
            Ok(Some(written)) => {
                tracing::info!(symbol = %job.symbol, written, "Backfill complete");
                record_backfill(BackfillOutcome::Success);
                true
            }
            Ok(None) => {
                tracing::warn!(symbol = %job.symbol, "Backfill returned no data");
                record_backfill(BackfillOutcome::NoData);
                false
            }
            Err(e) => {
                tracing::error!(symbol = %job.symbol, error = %e, "Backfill failed");
                record_backfill(BackfillOutcome::Failed);
                false
            }
        }
    }

    /// Bars written, or `None` when the provider had nothing in range
    async fn execute(&self, job: &BackfillJob) -> anyhow::Result<Option<usize>> {
        let request = BarRequest {
            symbol: job.symbol.clone(),
            exchange: job.exchange.clone(),
            interval: self.settings.interval,
            span: BarSpan::Hours(job.window.hours),
            extended_hours: self.settings.extended_hours,
        };

        let fetched = match self.provider.fetch(&request).await? {
            BarFetch::Bars(bars) => bars,
            BarFetch::NoData => return Ok(None),
        };

        let mut bars = normalize_bars(
            fetched
                .into_iter()
                .filter(|b| b.timestamp >= job.window.start)
                .collect(),
        );
        if bars.is_empty() {
            return Ok(None);
        }

        if self.settings.add_indicators {
            enrich(&mut bars);
        }

        let timeframe = self.settings.interval.as_str();
        let written = match job.mode {
            UpdateMode::Append => {
                store::append_new(self.store.as_ref(), &job.symbol, timeframe, &bars).await?
            }
            UpdateMode::Replace => self.store.replace(&job.symbol, timeframe, &bars).await?,
        };

        Ok(Some(written))
    }

    /// Start a background append-mode backfill for `symbol`
    pub fn spawn(&self, symbol: &str, exchange: &str) -> JoinHandle<()> {
        let job = self.job(symbol, exchange, Utc::now());
        self.spawn_job(job)
    }

    /// Start a background backfill for a prepared job
    pub fn spawn_job(&self, job: BackfillJob) -> JoinHandle<()> {
        let this = self.clone();
        let cancel = self.cancel.clone();

        self.tracker.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::warn!(symbol = %job.symbol, "Backfill abandoned at shutdown");
                }
                _ = this.backfill(&job) => {}
            }
        })
    }

    /// Jobs still running
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Stop accepting jobs and wait up to `timeout` for running ones
    ///
    /// Jobs still running after the timeout are cancelled.
    pub async fn shutdown(&self, timeout: Duration) {
        self.tracker.close();

        if tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                in_flight = self.tracker.len(),
                "Backfill jobs still running, cancelling"
            );
            self.cancel.cancel();
            self.tracker.wait().await;
        }
    }
}
