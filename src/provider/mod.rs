//! Market data provider
//!
//! Fetches OHLCV bars for a symbol/exchange/interval. "No data" is an
//! explicit outcome and never an error.

mod http;

pub use http::{HttpBarProvider, HttpProviderConfig};

use crate::bar::{Bar, Interval};
use async_trait::async_trait;
use thiserror::Error;

/// How much history a request covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarSpan {
    /// The most recent `n` bars
    Count(u32),
    /// Enough bars to cover this many hours
    Hours(u32),
}

/// A single bar request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarRequest {
    pub symbol: String,
    pub exchange: String,
    pub interval: Interval,
    pub span: BarSpan,
    /// Include premarket and afterhours bars
    pub extended_hours: bool,
}

impl BarRequest {
    /// Number of bars to ask the provider for
    pub fn bar_count(&self) -> u32 {
        match self.span {
            BarSpan::Count(n) => n,
            BarSpan::Hours(h) => self.interval.bars_for_hours(h),
        }
    }
}

/// Result of a successful fetch
#[derive(Debug, Clone, PartialEq)]
pub enum BarFetch {
    /// Bars returned by the provider
    Bars(Vec<Bar>),
    /// The provider answered but had nothing (normal while the market is closed)
    NoData,
}

impl BarFetch {
    /// Wrap a bar list, mapping empty to `NoData`
    pub fn from_bars(bars: Vec<Bar>) -> Self {
        if bars.is_empty() {
            BarFetch::NoData
        } else {
            BarFetch::Bars(bars)
        }
    }
}

/// Provider errors
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport failure after all retries
    #[error("Request failed for {symbol}: {message}")]
    Request { symbol: String, message: String },
    /// Non-success HTTP status
    #[error("Provider returned {status} for {symbol}")]
    Status { symbol: String, status: u16 },
    /// Response body did not decode
    #[error("Malformed response for {symbol}: {message}")]
    Decode { symbol: String, message: String },
}

/// Trait for market data provider implementations
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Fetch bars for a request
    async fn fetch(&self, request: &BarRequest) -> anyhow::Result<BarFetch>;
}
