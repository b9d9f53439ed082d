//! Bar persistence
//!
//! Time series keyed by (symbol, timeframe). Implementations must ignore
//! bars whose timestamp is already stored, so a racing dedup check in the
//! caller can never produce duplicate rows.

mod memory;
mod parquet;

pub use self::parquet::ParquetStore;
pub use memory::MemoryStore;

use crate::bar::Bar;
use crate::config::{StorageBackend, StorageConfig};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Trait for bar storage implementations
#[async_trait]
pub trait BarStore: Send + Sync {
    /// Timestamp of the newest stored bar
    async fn latest_timestamp(
        &self,
        symbol: &str,
        timeframe: &str,
    ) -> anyhow::Result<Option<DateTime<Utc>>>;

    /// Insert bars, skipping exact timestamp duplicates; returns rows inserted
    async fn append(&self, symbol: &str, timeframe: &str, bars: &[Bar]) -> anyhow::Result<usize>;

    /// Drop the partition and store `bars` in its place
    async fn replace(&self, symbol: &str, timeframe: &str, bars: &[Bar])
        -> anyhow::Result<usize>;

    /// Stored bars in chronological order, optionally from `since` (inclusive)
    async fn query(
        &self,
        symbol: &str,
        timeframe: &str,
        since: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Vec<Bar>>;

    /// Delete live-polled bars older than `cutoff`; returns rows deleted
    ///
    /// Backfilled history is never purged.
    async fn purge_live_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<usize>;
}

/// Open the configured store backend
pub fn open(config: &StorageConfig) -> anyhow::Result<Arc<dyn BarStore>> {
    match config.backend {
        StorageBackend::Memory => {
            tracing::info!("Using in-memory bar store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageBackend::Parquet => {
            tracing::info!(dir = ?config.data_dir, "Using Parquet bar store");
            Ok(Arc::new(ParquetStore::new(&config.data_dir)?))
        }
    }
}

/// Append only the bars strictly newer than the latest stored bar
///
/// `bars` must be in chronological order.
pub async fn append_new(
    store: &dyn BarStore,
    symbol: &str,
    timeframe: &str,
    bars: &[Bar],
) -> anyhow::Result<usize> {
    let fresh = match store.latest_timestamp(symbol, timeframe).await? {
        Some(latest) => {
            let start = bars.partition_point(|b| b.timestamp <= latest);
            &bars[start..]
        }
        None => bars,
    };

    if fresh.is_empty() {
        tracing::debug!(symbol, timeframe, "No new bars to append");
        return Ok(0);
    }

    store.append(symbol, timeframe, fresh).await
}
