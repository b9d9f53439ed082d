//! Backfill command implementation

use super::build_provider;
use crate::backfill::{BackfillCoordinator, BackfillSettings, UpdateMode};
use crate::config::Config;
use crate::screen::is_valid_ticker;
use crate::session::MarketSessionClock;
use crate::store;
use chrono::Utc;
use clap::Args;
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct BackfillArgs {
    /// Symbol to backfill
    pub symbol: String,

    /// Exchange (defaults to watchlist.default_exchange)
    #[arg(short, long)]
    pub exchange: Option<String>,

    /// Replace stored bars instead of appending newer ones
    #[arg(long)]
    pub replace: bool,
}

impl BackfillArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let symbol = self.symbol.trim().to_uppercase();
        if !is_valid_ticker(&symbol) {
            anyhow::bail!("Invalid symbol: {}", self.symbol);
        }
        let exchange = self
            .exchange
            .clone()
            .unwrap_or_else(|| config.watchlist.default_exchange.clone());

        let clock = Arc::new(MarketSessionClock::from_config(&config.session)?);
        let coordinator = BackfillCoordinator::new(
            build_provider(config)?,
            store::open(&config.storage)?,
            clock,
            BackfillSettings::from_config(config),
        );

        let mut job = coordinator.job(&symbol, &exchange, Utc::now());
        if self.replace {
            job.mode = UpdateMode::Replace;
        }

        println!(
            "Backfilling {} on {} from {} ({} hours)",
            job.symbol, job.exchange, job.window.start, job.window.hours
        );

        if !coordinator.backfill(&job).await {
            anyhow::bail!("Backfill failed for {}", symbol);
        }

        println!("Backfill complete for {}", symbol);
        Ok(())
    }
}
