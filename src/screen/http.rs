//! HTTP JSON screener
//!
//! Fetches ranked screen results from `GET {base_url}/screen/{kind}`. The
//! body is either a list of symbols or a list of rows with a `symbol`
//! field (rank order is array order).

use super::{ScreenKind, Screener};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScreenRow {
    Symbol(String),
    Row {
        #[serde(alias = "Symbol", alias = "ticker")]
        symbol: String,
    },
}

impl ScreenRow {
    fn into_symbol(self) -> String {
        match self {
            ScreenRow::Symbol(s) | ScreenRow::Row { symbol: s } => s,
        }
    }
}

/// Screener backed by an HTTP screening service
pub struct HttpScreener {
    base_url: String,
    client: Client,
}

impl HttpScreener {
    /// Create a new screener client
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    fn url(&self, kind: ScreenKind) -> String {
        format!("{}/screen/{}", self.base_url.trim_end_matches('/'), kind)
    }

    fn parse_rows(body: &str) -> anyhow::Result<Vec<String>> {
        let rows: Vec<ScreenRow> = serde_json::from_str(body)?;
        Ok(rows.into_iter().map(ScreenRow::into_symbol).collect())
    }
}

#[async_trait]
impl Screener for HttpScreener {
    async fn screen(&self, kind: ScreenKind) -> anyhow::Result<Vec<String>> {
        let url = self.url(kind);
        tracing::debug!(url = %url, "Fetching screen results");

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Screener error: {} - {}", status, body);
        }

        let body = response.text().await?;
        Self::parse_rows(&body)
    }
}
