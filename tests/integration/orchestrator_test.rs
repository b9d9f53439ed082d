//! End-to-end orchestration with fake collaborators

use crate::support::{bar, market_hours, FakeMarket, FakeScreener};
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tickwatch::config::Config;
use tickwatch::orchestrator::Orchestrator;
use tickwatch::store::{BarStore, MemoryStore};

fn config(max_watchlist: usize, max_streams: usize) -> Config {
    let mut config = Config::default();
    config.watchlist.max_watchlist_size = max_watchlist;
    config.live.batch_size = max_streams;
    config
}

fn streamed(status: &tickwatch::orchestrator::SystemStatus) -> BTreeSet<String> {
    status.streams.iter().map(|s| s.symbol.clone()).collect()
}

fn set(symbols: &[&str]) -> BTreeSet<String> {
    symbols.iter().map(|s| s.to_string()).collect()
}

#[tokio::test(start_paused = true)]
async fn test_cycle_backfills_and_streams_new_symbols() {
    let market = Arc::new(FakeMarket::new(Utc::now() - ChronoDuration::minutes(1), 30));
    let screener = Arc::new(FakeScreener::new(&["aapl", "MSFT", "TSLA"]));
    let store = Arc::new(MemoryStore::new());

    let orch = Orchestrator::new(&config(2, 50), market.clone(), screener, store.clone()).unwrap();

    let diff = orch.engine().cycle_at(market_hours()).await.unwrap();
    assert_eq!(diff.added.len(), 2);
    assert!(diff.removed.is_empty());

    orch.backfill().shutdown(Duration::from_secs(15)).await;
    assert_eq!(market.history_calls(), 2);
    assert_eq!(store.len("AAPL", "1m").await, 30);
    assert_eq!(store.len("MSFT", "1m").await, 30);
    assert_eq!(store.len("TSLA", "1m").await, 0);

    let status = orch.status().await;
    assert_eq!(status.watchlist.symbols, vec!["AAPL", "MSFT"]);
    assert_eq!(streamed(&status), set(&["AAPL", "MSFT"]));
    assert!(status.unstreamed.is_empty());

    orch.shutdown().await;
    assert!(orch.status().await.streams.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_rotation_stops_removed_and_starts_added() {
    let market = Arc::new(FakeMarket::new(Utc::now(), 5));
    let screener = Arc::new(FakeScreener::new(&["AAPL", "MSFT"]));
    let orch = Orchestrator::new(
        &config(10, 50),
        market,
        screener.clone(),
        Arc::new(MemoryStore::new()),
    )
    .unwrap();

    orch.engine().cycle_at(market_hours()).await.unwrap();
    let msft_id = orch.status().await.streams[1].id;

    screener.set(&["MSFT", "TSLA"]);
    let diff = orch
        .engine()
        .cycle_at(market_hours() + ChronoDuration::minutes(1))
        .await
        .unwrap();
    assert_eq!(diff.added.iter().collect::<Vec<_>>(), vec!["TSLA"]);
    assert_eq!(diff.removed.iter().collect::<Vec<_>>(), vec!["AAPL"]);

    let status = orch.status().await;
    assert_eq!(streamed(&status), set(&["MSFT", "TSLA"]));
    assert_eq!(status.streams[0].id, msft_id);

    orch.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_stream_limit_leaves_symbol_unstreamed() {
    let market = Arc::new(FakeMarket::new(Utc::now(), 5));
    let screener = Arc::new(FakeScreener::new(&["NVDA", "AMD"]));
    let orch = Orchestrator::new(
        &config(10, 1),
        market,
        screener,
        Arc::new(MemoryStore::new()),
    )
    .unwrap();

    orch.engine().cycle_at(market_hours()).await.unwrap();

    let status = orch.status().await;
    assert_eq!(status.watchlist.len(), 2);
    assert_eq!(status.streams.len(), 1);
    assert_eq!(status.streams[0].symbol, "AMD");
    assert_eq!(status.unstreamed, vec!["NVDA"]);

    orch.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_live_poll_writes_each_bar_once() {
    let t0 = Utc::now() - ChronoDuration::minutes(2);
    let t1 = t0 + ChronoDuration::minutes(1);
    let market = Arc::new(
        FakeMarket::new(Utc::now(), 0).with_live(vec![bar(t0, 100), bar(t1, 101)]),
    );
    let store = Arc::new(MemoryStore::new());
    store.append("AAPL", "1m", &[bar(t0, 100)]).await.unwrap();

    let orch = Orchestrator::new(
        &config(10, 50),
        market.clone(),
        Arc::new(FakeScreener::default()),
        store.clone(),
    )
    .unwrap();
    orch.engine().add("AAPL").await.unwrap();

    // Polls every 5s
    tokio::time::sleep(Duration::from_secs(22)).await;

    assert!(market.live_calls() >= 4);
    let stored = store.query("AAPL", "1m", None).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[1].timestamp, t1);

    let health = &orch.status().await.streams[0];
    assert_eq!(health.bars_written, 1);
    assert_eq!(health.consecutive_errors, 0);

    orch.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_paused_orchestrator_ignores_screen() {
    let market = Arc::new(FakeMarket::new(Utc::now(), 5));
    let screener = Arc::new(FakeScreener::new(&["AAPL"]));
    let orch = Orchestrator::new(
        &config(10, 50),
        market.clone(),
        screener,
        Arc::new(MemoryStore::new()),
    )
    .unwrap();

    orch.engine().pause().await;
    assert!(orch.engine().cycle_at(market_hours()).await.is_none());

    let status = orch.status().await;
    assert!(status.paused);
    assert!(status.watchlist.is_empty());
    assert_eq!(market.history_calls(), 0);

    orch.shutdown().await;
}
