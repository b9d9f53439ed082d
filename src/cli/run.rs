//! Run command implementation

use super::console::{self, ConsoleCommand, HELP};
use super::{build_provider, build_screener};
use crate::config::Config;
use crate::orchestrator::Orchestrator;
use crate::store;
use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Run without the interactive console (stop with Ctrl-C)
    #[arg(long)]
    pub no_console: bool,

    /// Screening interval in minutes
    #[arg(long)]
    pub interval: Option<u64>,

    /// Maximum watchlist size
    #[arg(long)]
    pub max_watchlist: Option<usize>,

    /// Days of history to backfill for new symbols
    #[arg(long)]
    pub lookback_days: Option<u32>,

    /// Emit JSON log lines
    #[arg(long)]
    pub log_json: bool,
}

impl RunArgs {
    /// Apply command line overrides to the loaded config
    pub fn apply(&self, config: &mut Config) {
        if let Some(minutes) = self.interval {
            config.watchlist.screening_interval_minutes = minutes;
        }
        if let Some(max) = self.max_watchlist {
            config.watchlist.max_watchlist_size = max;
        }
        if let Some(days) = self.lookback_days {
            config.backfill.lookback_days = days;
        }
    }

    pub async fn execute(&self, mut config: Config) -> anyhow::Result<()> {
        self.apply(&mut config);
        config.validate()?;

        let orchestrator = Orchestrator::new(
            &config,
            build_provider(&config)?,
            build_screener(&config)?,
            store::open(&config.storage)?,
        )?;

        orchestrator.start().await;

        if self.no_console {
            tokio::signal::ctrl_c().await?;
            tracing::info!("Interrupt received");
        } else {
            run_console(&orchestrator).await?;
        }

        orchestrator.shutdown().await;
        Ok(())
    }
}

async fn run_console(orchestrator: &Orchestrator) -> anyhow::Result<()> {
    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupt received");
                return Ok(());
            }
            line = lines.next_line() => line?,
        };

        // stdin closed
        let Some(line) = line else {
            return Ok(());
        };

        let command = match line.parse::<ConsoleCommand>() {
            Ok(command) => command,
            Err(console::ConsoleError::Empty) => continue,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        match console::handle(orchestrator, command).await {
            Some(output) => println!("{}", output),
            None => return Ok(()),
        }
    }
}
