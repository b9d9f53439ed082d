//! In-memory bar store

use super::BarStore;
use crate::bar::{Bar, BarSource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

type PartitionKey = (String, String);

/// Bar store held entirely in memory
#[derive(Default)]
pub struct MemoryStore {
    partitions: RwLock<HashMap<PartitionKey, BTreeMap<DateTime<Utc>, Bar>>>,
    append_calls: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `append` calls made so far
    pub fn append_calls(&self) -> u64 {
        self.append_calls.load(Ordering::Relaxed)
    }

    /// Number of stored bars in one partition
    pub async fn len(&self, symbol: &str, timeframe: &str) -> usize {
        self.partitions
            .read()
            .await
            .get(&key(symbol, timeframe))
            .map_or(0, BTreeMap::len)
    }

    pub async fn is_empty(&self) -> bool {
        self.partitions.read().await.values().all(BTreeMap::is_empty)
    }
}

fn key(symbol: &str, timeframe: &str) -> PartitionKey {
    (symbol.to_string(), timeframe.to_string())
}

#[async_trait]
impl BarStore for MemoryStore {
    async fn latest_timestamp(
        &self,
        symbol: &str,
        timeframe: &str,
    ) -> anyhow::Result<Option<DateTime<Utc>>> {
        let partitions = self.partitions.read().await;
        Ok(partitions
            .get(&key(symbol, timeframe))
            .and_then(|p| p.keys().next_back().copied()))
    }

    async fn append(&self, symbol: &str, timeframe: &str, bars: &[Bar]) -> anyhow::Result<usize> {
        self.append_calls.fetch_add(1, Ordering::Relaxed);

        let mut partitions = self.partitions.write().await;
        let partition = partitions.entry(key(symbol, timeframe)).or_default();

        let mut inserted = 0;
        for bar in bars {
            if !partition.contains_key(&bar.timestamp) {
                partition.insert(bar.timestamp, bar.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn replace(&self, symbol: &str, timeframe: &str, bars: &[Bar]) -> anyhow::Result<usize> {
        let mut partitions = self.partitions.write().await;
        let partition: BTreeMap<_, _> = bars.iter().map(|b| (b.timestamp, b.clone())).collect();
        let count = partition.len();
        partitions.insert(key(symbol, timeframe), partition);
        Ok(count)
    }

    async fn query(
        &self,
        symbol: &str,
        timeframe: &str,
        since: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Vec<Bar>> {
        let partitions = self.partitions.read().await;
        let Some(partition) = partitions.get(&key(symbol, timeframe)) else {
            return Ok(Vec::new());
        };

        let bars = match since {
            Some(since) => partition.range(since..).map(|(_, b)| b.clone()).collect(),
            None => partition.values().cloned().collect(),
        };
        Ok(bars)
    }

    async fn purge_live_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<usize> {
        let mut partitions = self.partitions.write().await;
        let mut removed = 0;
        for partition in partitions.values_mut() {
            let before = partition.len();
            partition.retain(|ts, bar| *ts >= cutoff || bar.source != BarSource::Live);
            removed += before - partition.len();
        }
        Ok(removed)
    }
}
