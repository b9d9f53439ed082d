//! CLI interface for tickwatch
//!
//! Provides subcommands for:
//! - `run`: Screen, backfill and stream live bars
//! - `backfill`: One-shot historical backfill for a symbol
//! - `phase`: Show the current market phase
//! - `config`: Show the effective configuration

mod backfill;
mod console;
mod run;

pub use backfill::BackfillArgs;
pub use console::{ConsoleCommand, ConsoleError};
pub use run::RunArgs;

use crate::config::Config;
use crate::provider::{HttpBarProvider, HttpProviderConfig, MarketDataProvider};
use crate::screen::{HttpScreener, Screener};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "tickwatch")]
#[command(about = "Watchlist-driven live market data collector")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Screen, backfill and stream live bars
    Run(RunArgs),
    /// Backfill history for one symbol
    Backfill(BackfillArgs),
    /// Show the current market phase
    Phase,
    /// Show the effective configuration
    Config,
}

impl Cli {
    /// Whether JSON log output was requested on the command line
    pub fn log_json(&self) -> bool {
        matches!(&self.command, Commands::Run(args) if args.log_json)
    }
}

/// HTTP market data provider from config
pub fn build_provider(config: &Config) -> anyhow::Result<Arc<dyn MarketDataProvider>> {
    let provider = HttpBarProvider::new(provider_config(config))?;
    Ok(Arc::new(provider))
}

fn provider_config(config: &Config) -> HttpProviderConfig {
    HttpProviderConfig {
        base_url: config.provider.base_url.clone(),
        timeout: Duration::from_secs(config.provider.timeout_secs),
        max_retries: config.live.max_retries,
        max_retry_delay: config.live.reconnect_delay(),
        ..HttpProviderConfig::default()
    }
}

/// HTTP screener from config
pub fn build_screener(config: &Config) -> anyhow::Result<Arc<dyn Screener>> {
    let screener = HttpScreener::new(
        config.screener.base_url.clone(),
        Duration::from_secs(config.screener.timeout_secs),
    )?;
    Ok(Arc::new(screener))
}
