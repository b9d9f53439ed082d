//! Fakes for the external collaborators

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tickwatch::bar::Bar;
use tickwatch::provider::{BarFetch, BarRequest, BarSpan, MarketDataProvider};
use tickwatch::screen::{ScreenKind, Screener};

/// Tuesday 2025-03-04 10:00 ET
pub fn market_hours() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 4, 15, 0, 0).unwrap()
}

pub fn bar(at: DateTime<Utc>, close: i64) -> Bar {
    let px = Decimal::from(close);
    Bar::new(at, px, px, px, px, 1_000)
}

/// Provider serving history for hour spans and a fixed pair of bars for
/// live polls
pub struct FakeMarket {
    history_end: DateTime<Utc>,
    history_len: i64,
    live: Option<Vec<Bar>>,
    history_calls: AtomicUsize,
    live_calls: AtomicUsize,
}

impl FakeMarket {
    /// `history_len` one-minute bars ending at `history_end`; polls see no data
    pub fn new(history_end: DateTime<Utc>, history_len: i64) -> Self {
        Self {
            history_end,
            history_len,
            live: None,
            history_calls: AtomicUsize::new(0),
            live_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_live(mut self, bars: Vec<Bar>) -> Self {
        self.live = Some(bars);
        self
    }

    pub fn history_calls(&self) -> usize {
        self.history_calls.load(Ordering::SeqCst)
    }

    pub fn live_calls(&self) -> usize {
        self.live_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketDataProvider for FakeMarket {
    async fn fetch(&self, request: &BarRequest) -> anyhow::Result<BarFetch> {
        match request.span {
            BarSpan::Hours(_) => {
                self.history_calls.fetch_add(1, Ordering::SeqCst);
                let bars = (0..self.history_len)
                    .rev()
                    .map(|i| bar(self.history_end - Duration::minutes(i), 100 + i))
                    .collect();
                Ok(BarFetch::from_bars(bars))
            }
            BarSpan::Count(_) => {
                self.live_calls.fetch_add(1, Ordering::SeqCst);
                Ok(match &self.live {
                    Some(bars) => BarFetch::from_bars(bars.clone()),
                    None => BarFetch::NoData,
                })
            }
        }
    }
}

/// Screener returning a settable ranked list
#[derive(Default)]
pub struct FakeScreener {
    symbols: Mutex<Vec<String>>,
}

impl FakeScreener {
    pub fn new(symbols: &[&str]) -> Self {
        let screener = Self::default();
        screener.set(symbols);
        screener
    }

    pub fn set(&self, symbols: &[&str]) {
        *self.symbols.lock().unwrap() = symbols.iter().map(|s| s.to_string()).collect();
    }
}

#[async_trait]
impl Screener for FakeScreener {
    async fn screen(&self, _kind: ScreenKind) -> anyhow::Result<Vec<String>> {
        Ok(self.symbols.lock().unwrap().clone())
    }
}
