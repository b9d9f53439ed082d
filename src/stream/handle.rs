//! Stream handles and shared per-stream state

use super::PollerExit;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// State shared between a poller task and its handle
#[derive(Debug)]
pub struct StreamState {
    active: AtomicBool,
    consecutive_errors: AtomicU32,
    bars_written: AtomicU64,
    last_update: Mutex<Option<DateTime<Utc>>>,
}

impl StreamState {
    pub fn new() -> Self {
        Self {
            active: AtomicBool::new(true),
            consecutive_errors: AtomicU32::new(0),
            bars_written: AtomicU64::new(0),
            last_update: Mutex::new(None),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn mark_stopped(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors.load(Ordering::Acquire)
    }

    /// Count a failed iteration, returning the new error count
    pub fn record_error(&self) -> u32 {
        self.consecutive_errors.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Record a successful write at `at`
    pub fn record_write(&self, at: DateTime<Utc>) {
        self.consecutive_errors.store(0, Ordering::Release);
        self.bars_written.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_update.lock() {
            *last = Some(at);
        }
    }

    pub fn bars_written(&self) -> u64 {
        self.bars_written.load(Ordering::Relaxed)
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update.lock().ok().and_then(|last| *last)
    }
}

impl Default for StreamState {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of one stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamHealth {
    pub symbol: String,
    pub exchange: String,
    pub id: Uuid,
    pub active: bool,
    pub last_update: Option<DateTime<Utc>>,
    pub consecutive_errors: u32,
    pub bars_written: u64,
}

/// Owner's side of a running poller
pub struct StreamHandle {
    symbol: String,
    exchange: String,
    id: Uuid,
    state: Arc<StreamState>,
    cancel: CancellationToken,
    task: JoinHandle<PollerExit>,
}

impl StreamHandle {
    pub fn new(
        symbol: String,
        exchange: String,
        state: Arc<StreamState>,
        cancel: CancellationToken,
        task: JoinHandle<PollerExit>,
    ) -> Self {
        Self {
            symbol,
            exchange,
            id: Uuid::new_v4(),
            state,
            cancel,
            task,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// True once the poller task has returned
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn health(&self) -> StreamHealth {
        StreamHealth {
            symbol: self.symbol.clone(),
            exchange: self.exchange.clone(),
            id: self.id,
            active: self.state.is_active() && !self.task.is_finished(),
            last_update: self.state.last_update(),
            consecutive_errors: self.state.consecutive_errors(),
            bars_written: self.state.bars_written(),
        }
    }

    /// Signal the poller to stop without waiting
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.task.abort_handle()
    }

    pub fn into_task(self) -> JoinHandle<PollerExit> {
        self.task
    }

    /// Cancel and wait up to `timeout` for the poller to exit
    ///
    /// The task is aborted when it does not exit in time; `None` is
    /// returned in that case and when the task panicked.
    pub async fn stop(mut self, timeout: Duration) -> Option<PollerExit> {
        self.cancel.cancel();

        match tokio::time::timeout(timeout, &mut self.task).await {
            Ok(Ok(exit)) => Some(exit),
            Ok(Err(e)) => {
                tracing::error!(symbol = %self.symbol, error = %e, "Stream task failed");
                self.state.mark_stopped();
                None
            }
            Err(_) => {
                tracing::warn!(
                    symbol = %self.symbol,
                    timeout_ms = timeout.as_millis() as u64,
                    "Stream did not stop in time, aborting"
                );
                self.task.abort();
                self.state.mark_stopped();
                None
            }
        }
    }
}
