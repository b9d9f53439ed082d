use clap::Parser;
use tickwatch::cli::{Cli, Commands};
use tickwatch::config::Config;
use tickwatch::telemetry::{init_telemetry, LogFormat};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
            eprintln!("Using default configuration");
            Config::default()
        }
    };

    // Initialize telemetry
    let format = LogFormat::from_json_flag(config.telemetry.json_logs || cli.log_json());
    let _telemetry = init_telemetry(&config.telemetry, format)?;

    match cli.command {
        Commands::Run(args) => {
            tracing::info!("Starting live collection");
            args.execute(config).await?;
        }
        Commands::Backfill(args) => {
            args.execute(&config).await?;
        }
        Commands::Phase => {
            let clock = tickwatch::session::MarketSessionClock::from_config(&config.session)?;
            let now = chrono::Utc::now();
            println!("Market phase: {}", clock.phase(now));
            println!(
                "  Local time: {} ({})",
                clock.local(now).format("%a %Y-%m-%d %H:%M"),
                clock.timezone()
            );
        }
        Commands::Config => {
            println!("Current configuration:");
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
