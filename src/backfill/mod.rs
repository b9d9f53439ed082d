//! Historical backfill
//!
//! One-shot ingestion run when a symbol enters the watchlist. Jobs are
//! fire-and-forget and never retried.

mod coordinator;
mod lookback;

pub use coordinator::{BackfillCoordinator, BackfillSettings};
pub use lookback::{lookback_window, LookbackWindow};

/// How fetched history is merged into the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateMode {
    /// Only bars newer than the latest stored bar are written
    #[default]
    Append,
    /// The partition is dropped and rewritten
    Replace,
}

/// A single backfill request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillJob {
    pub symbol: String,
    pub exchange: String,
    pub window: LookbackWindow,
    pub mode: UpdateMode,
}
