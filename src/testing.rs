//! Shared fakes for unit tests

use crate::bar::{Bar, BarSource};
use crate::provider::{BarFetch, BarRequest, MarketDataProvider};
use crate::screen::{ScreenKind, Screener};
use crate::store::{BarStore, MemoryStore};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Tuesday 2025-03-04 09:30 ET plus `m` minutes
pub fn minute(m: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 4, 14, 30, 0).unwrap() + Duration::minutes(m)
}

pub fn bar_at(m: i64) -> Bar {
    let px = Decimal::from(100 + m);
    Bar::new(minute(m), px, px, px, px, 500)
}

/// Like [`bar_at`], tagged as written by a live poller
pub fn live_bar_at(m: i64) -> Bar {
    bar_at(m).with_source(BarSource::Live)
}

#[derive(Clone)]
pub enum Reply {
    Bars(Vec<Bar>),
    NoData,
    Fail,
    /// Never completes
    Hang,
}

/// Provider that plays back replies in order, then repeats a fallback
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    calls: AtomicUsize,
    requests: Mutex<Vec<BarRequest>>,
}

impl ScriptedProvider {
    pub fn sequence(replies: Vec<Reply>, fallback: Reply) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            fallback,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn always(reply: Reply) -> Arc<Self> {
        Self::sequence(Vec::new(), reply)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received, in call order
    pub fn requests(&self) -> Vec<BarRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Symbols requested, in call order
    pub fn symbols(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.symbol).collect()
    }
}

#[async_trait]
impl MarketDataProvider for ScriptedProvider {
    async fn fetch(&self, request: &BarRequest) -> anyhow::Result<BarFetch> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match reply {
            Reply::Bars(bars) => Ok(BarFetch::from_bars(bars)),
            Reply::NoData => Ok(BarFetch::NoData),
            Reply::Fail => anyhow::bail!("scripted failure"),
            Reply::Hang => {
                std::future::pending::<()>().await;
                Ok(BarFetch::NoData)
            }
        }
    }
}

/// Memory store whose appends can be made to fail
pub struct FlakyStore {
    inner: MemoryStore,
    fail_appends: AtomicBool,
}

impl FlakyStore {
    pub fn failing_appends() -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_appends: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl BarStore for FlakyStore {
    async fn latest_timestamp(
        &self,
        symbol: &str,
        timeframe: &str,
    ) -> anyhow::Result<Option<DateTime<Utc>>> {
        self.inner.latest_timestamp(symbol, timeframe).await
    }

    async fn append(&self, symbol: &str, timeframe: &str, bars: &[Bar]) -> anyhow::Result<usize> {
        if self.fail_appends.load(Ordering::SeqCst) {
            anyhow::bail!("disk full");
        }
        self.inner.append(symbol, timeframe, bars).await
    }

    async fn replace(&self, symbol: &str, timeframe: &str, bars: &[Bar]) -> anyhow::Result<usize> {
        self.inner.replace(symbol, timeframe, bars).await
    }

    async fn query(
        &self,
        symbol: &str,
        timeframe: &str,
        since: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Vec<Bar>> {
        self.inner.query(symbol, timeframe, since).await
    }

    async fn purge_live_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<usize> {
        self.inner.purge_live_before(cutoff).await
    }
}

/// Screener returning a settable list
#[derive(Default)]
pub struct StaticScreener {
    symbols: Mutex<Vec<String>>,
    fail: AtomicBool,
    calls: AtomicUsize,
}

impl StaticScreener {
    pub fn new(symbols: &[&str]) -> Arc<Self> {
        let screener = Self::default();
        screener.set(symbols);
        Arc::new(screener)
    }

    pub fn set(&self, symbols: &[&str]) {
        *self.symbols.lock().unwrap() = symbols.iter().map(|s| s.to_string()).collect();
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Screener for StaticScreener {
    async fn screen(&self, _kind: ScreenKind) -> anyhow::Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("screener unavailable");
        }
        Ok(self.symbols.lock().unwrap().clone())
    }
}
