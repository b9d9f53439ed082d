//! Parquet store behind the full backfill path

use crate::support::FakeMarket;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tickwatch::config::Config;
use tickwatch::orchestrator::Orchestrator;
use tickwatch::store::{BarStore, ParquetStore};

#[tokio::test]
async fn test_backfill_persists_to_parquet() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(ParquetStore::new(dir.path()).unwrap());
    let market = Arc::new(FakeMarket::new(Utc::now() - ChronoDuration::minutes(1), 60));

    let mut config = Config::default();
    config.live.enabled = false;

    let orch = Orchestrator::new(
        &config,
        market,
        Arc::new(crate::support::FakeScreener::default()),
        store.clone(),
    )
    .unwrap();

    orch.engine().add("msft").await.unwrap();
    orch.backfill().shutdown(Duration::from_secs(15)).await;

    assert!(orch.status().await.streams.is_empty());

    let bars = store.query("MSFT", "1m", None).await.unwrap();
    assert_eq!(bars.len(), 60);
    assert!(bars.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    assert!(bars[59].indicators.sma_50.is_some());
    assert!(dir.path().join("MSFT").join("1m").is_dir());

    // Reopening sees the same latest bar
    let reopened = ParquetStore::new(dir.path()).unwrap();
    assert_eq!(
        reopened.latest_timestamp("MSFT", "1m").await.unwrap(),
        Some(bars[59].timestamp)
    );

    orch.shutdown().await;
}
