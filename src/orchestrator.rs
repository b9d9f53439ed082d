//! Orchestrator
//!
//! Wires the clock, screen runner, watchlist engine, backfill coordinator
//! and stream supervisor together, and runs the periodic screening cycle
//! and retention sweep.

use crate::backfill::{BackfillCoordinator, BackfillSettings};
use crate::config::{Config, ConfigError};
use crate::provider::MarketDataProvider;
use crate::screen::{ScreenRunner, Screener};
use crate::session::{MarketPhase, MarketSessionClock};
use crate::store::BarStore;
use crate::stream::{StreamHealth, StreamSupervisor, SupervisorSettings};
use crate::watchlist::{WatchlistEngine, WatchlistSettings, WatchlistSnapshot};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// How often old bars are purged from the store
pub const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Orchestrator timing knobs
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub screening_interval: Duration,
    /// Bars older than this are purged by the retention sweep
    pub retention: Duration,
    pub sweep_interval: Duration,
    /// Applies to the stream stop and to the backfill drain separately
    pub shutdown_timeout: Duration,
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            screening_interval: config.watchlist.screening_interval(),
            retention: Duration::from_secs(config.live.data_retention_hours * 3600),
            sweep_interval: RETENTION_SWEEP_INTERVAL,
            shutdown_timeout: config.live.shutdown_timeout(),
        }
    }
}

/// Point-in-time system status
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub phase: MarketPhase,
    pub paused: bool,
    pub watchlist: WatchlistSnapshot,
    pub last_cycle: Option<DateTime<Utc>>,
    pub streams: Vec<StreamHealth>,
    /// Watchlisted symbols without a running stream
    pub unstreamed: Vec<String>,
    pub backfills_in_flight: usize,
}

/// Top-level service
pub struct Orchestrator {
    clock: Arc<MarketSessionClock>,
    engine: Arc<WatchlistEngine>,
    supervisor: Arc<Mutex<StreamSupervisor>>,
    backfill: BackfillCoordinator,
    store: Arc<dyn BarStore>,
    settings: OrchestratorSettings,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Build every component from a validated config
    pub fn new(
        config: &Config,
        provider: Arc<dyn MarketDataProvider>,
        screener: Arc<dyn Screener>,
        store: Arc<dyn BarStore>,
    ) -> Result<Self, ConfigError> {
        let clock = Arc::new(MarketSessionClock::from_config(&config.session)?);

        let backfill = BackfillCoordinator::new(
            provider.clone(),
            store.clone(),
            clock.clone(),
            BackfillSettings::from_config(config),
        );
        let supervisor = Arc::new(Mutex::new(StreamSupervisor::new(
            provider,
            store.clone(),
            SupervisorSettings::from_config(config),
        )));
        let engine = Arc::new(WatchlistEngine::new(
            clock.clone(),
            ScreenRunner::new(screener),
            backfill.clone(),
            supervisor.clone(),
            WatchlistSettings::from_config(config),
        ));

        Ok(Self {
            clock,
            engine,
            supervisor,
            backfill,
            store,
            settings: OrchestratorSettings::from_config(config),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Override timing knobs
    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn engine(&self) -> &Arc<WatchlistEngine> {
        &self.engine
    }

    pub fn backfill(&self) -> &BackfillCoordinator {
        &self.backfill
    }

    pub fn clock(&self) -> &MarketSessionClock {
        &self.clock
    }

    /// Start the screening cycle and retention sweep
    ///
    /// The first cycle runs immediately. Returns `false` if already
    /// started or shut down.
    pub async fn start(&self) -> bool {
        let mut tasks = self.tasks.lock().await;
        if !tasks.is_empty() || self.cancel.is_cancelled() {
            return false;
        }

        tracing::info!(
            interval_secs = self.settings.screening_interval.as_secs(),
            phase = %self.clock.phase(Utc::now()),
            "Starting orchestrator"
        );

        tasks.push(tokio::spawn(cycle_loop(
            self.engine.clone(),
            self.settings.screening_interval,
            self.cancel.clone(),
        )));
        tasks.push(tokio::spawn(sweep_loop(
            self.store.clone(),
            self.settings.retention,
            self.settings.sweep_interval,
            self.cancel.clone(),
        )));

        true
    }

    /// Purge live bars older than the retention window as of `now`
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> anyhow::Result<usize> {
        purge(self.store.as_ref(), self.settings.retention, now).await
    }

    /// Stop the cycle, then every stream, then in-flight backfills
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down orchestrator");
        self.cancel.cancel();

        let tasks: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Background task ended abnormally");
            }
        }

        self.supervisor
            .lock()
            .await
            .stop_all(self.settings.shutdown_timeout)
            .await;
        self.backfill.shutdown(self.settings.shutdown_timeout).await;

        tracing::info!("Orchestrator stopped");
    }

    pub async fn status(&self) -> SystemStatus {
        let watchlist = self.engine.snapshot().await;
        let streams = self.supervisor.lock().await.health();

        let unstreamed = watchlist
            .symbols
            .iter()
            .filter(|s| !streams.iter().any(|h| &h.symbol == *s))
            .cloned()
            .collect();

        SystemStatus {
            phase: self.clock.phase(Utc::now()),
            paused: watchlist.paused,
            last_cycle: watchlist.last_cycle,
            watchlist,
            streams,
            unstreamed,
            backfills_in_flight: self.backfill.in_flight(),
        }
    }
}

async fn cycle_loop(engine: Arc<WatchlistEngine>, period: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                engine.cycle().await;
            }
        }
    }

    tracing::debug!("Screening cycle stopped");
}

async fn sweep_loop(
    store: Arc<dyn BarStore>,
    retention: Duration,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = purge(store.as_ref(), retention, Utc::now()).await {
                    tracing::error!(error = %e, "Retention sweep failed");
                }
            }
        }
    }

    tracing::debug!("Retention sweep stopped");
}

async fn purge(
    store: &dyn BarStore,
    retention: Duration,
    now: DateTime<Utc>,
) -> anyhow::Result<usize> {
    let cutoff = now - chrono::Duration::from_std(retention)?;
    let removed = store.purge_live_before(cutoff).await?;
    if removed > 0 {
        tracing::info!(removed, cutoff = %cutoff, "Purged old live bars");
    }
    Ok(removed)
}
