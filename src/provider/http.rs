//! HTTP JSON market data provider
//!
//! Talks to a bar service exposing `GET {base_url}/bars` with `symbol`,
//! `exchange`, `interval`, `n_bars` and `extended` query parameters and a
//! JSON array of bars in the response body.

use super::{BarFetch, BarRequest, MarketDataProvider, ProviderError};
use crate::bar::{normalize_bars, Bar};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

/// Configuration for the HTTP provider
#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Transport retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry, doubled each time
    pub initial_retry_delay: Duration,
    /// Upper bound on the retry delay
    pub max_retry_delay: Duration,
}

impl Default for HttpProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8700".to_string(),
            timeout: Duration::from_secs(10),
            max_retries: 3,
            initial_retry_delay: Duration::from_millis(500),
            max_retry_delay: Duration::from_secs(5),
        }
    }
}

/// Bar as sent on the wire
#[derive(Debug, Deserialize)]
struct WireBar {
    #[serde(alias = "datetime", alias = "time")]
    timestamp: DateTime<Utc>,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    #[serde(default)]
    volume: Option<Decimal>,
}

impl From<WireBar> for Bar {
    fn from(w: WireBar) -> Self {
        let volume = w
            .volume
            .and_then(|v| v.trunc().to_u64())
            .unwrap_or_default();
        Bar::new(w.timestamp, w.open, w.high, w.low, w.close, volume)
    }
}

/// Market data provider backed by an HTTP bar service
pub struct HttpBarProvider {
    config: HttpProviderConfig,
    client: Client,
}

impl HttpBarProvider {
    /// Create a provider with the given configuration
    pub fn new(config: HttpProviderConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Decode a response body into chronologically ordered bars
    fn parse_bars(symbol: &str, body: &str) -> Result<Vec<Bar>, ProviderError> {
        let wire: Vec<WireBar> =
            serde_json::from_str(body).map_err(|e| ProviderError::Decode {
                symbol: symbol.to_string(),
                message: e.to_string(),
            })?;
        Ok(normalize_bars(wire.into_iter().map(Bar::from).collect()))
    }

    /// One HTTP round trip
    async fn fetch_once(&self, request: &BarRequest) -> Result<String, FetchAttemptError> {
        let url = format!("{}/bars", self.config.base_url);
        let n_bars = request.bar_count().to_string();
        let extended = request.extended_hours.to_string();

        let response = self
            .client
            .get(&url)
            .query(&[
                ("symbol", request.symbol.as_str()),
                ("exchange", request.exchange.as_str()),
                ("interval", request.interval.as_str()),
                ("n_bars", n_bars.as_str()),
                ("extended", extended.as_str()),
            ])
            .send()
            .await
            .map_err(FetchAttemptError::Transport)?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::NO_CONTENT {
            return Err(FetchAttemptError::Empty);
        }
        if !status.is_success() {
            return Err(FetchAttemptError::Status(status.as_u16()));
        }

        response.text().await.map_err(FetchAttemptError::Transport)
    }
}

enum FetchAttemptError {
    Transport(reqwest::Error),
    Status(u16),
    Empty,
}

#[async_trait]
impl MarketDataProvider for HttpBarProvider {
    async fn fetch(&self, request: &BarRequest) -> anyhow::Result<BarFetch> {
        let mut delay = self.config.initial_retry_delay;
        let mut attempt = 0;

        loop {
            match self.fetch_once(request).await {
                Ok(body) => {
                    let bars = Self::parse_bars(&request.symbol, &body)?;
                    tracing::debug!(
                        symbol = %request.symbol,
                        count = bars.len(),
                        "Fetched bars"
                    );
                    return Ok(BarFetch::from_bars(bars));
                }
                Err(FetchAttemptError::Empty) => return Ok(BarFetch::NoData),
                Err(FetchAttemptError::Status(status)) => {
                    return Err(ProviderError::Status {
                        symbol: request.symbol.clone(),
                        status,
                    }
                    .into());
                }
                Err(FetchAttemptError::Transport(e)) => {
                    attempt += 1;
                    if attempt > self.config.max_retries {
                        return Err(ProviderError::Request {
                            symbol: request.symbol.clone(),
                            message: e.to_string(),
                        }
                        .into());
                    }
                    tracing::debug!(
                        symbol = %request.symbol,
                        error = %e,
                        attempt,
                        "Bar request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(self.config.max_retry_delay);
                }
            }
        }
    }
}
