//! Configuration types for tickwatch

use crate::bar::Interval;
use crate::session::SessionBoundaries;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Configuration validation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A session boundary is not a valid HH:MM time
    #[error("Invalid time for {field}: {value:?} (expected HH:MM)")]
    InvalidTime { field: &'static str, value: String },
    /// Session boundaries are not in ascending order
    #[error("Session boundary {earlier} must not be after {later}")]
    BoundaryOrder {
        earlier: &'static str,
        later: &'static str,
    },
    /// Timezone name is not in the tz database
    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),
    /// A field that must be positive is zero
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Root configuration structure
///
/// Every section has defaults, so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub watchlist: WatchlistConfig,
    #[serde(default)]
    pub backfill: BackfillConfig,
    #[serde(default)]
    pub live: LiveConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub screener: ScreenerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Market session boundaries, local to `timezone`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// IANA timezone the HH:MM boundaries are expressed in
    pub timezone: String,
    pub premarket_start: String,
    pub premarket_end: String,
    pub market_open: String,
    pub market_close: String,
    pub afterhours_end: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timezone: "America/New_York".to_string(),
            premarket_start: "04:00".to_string(),
            premarket_end: "09:30".to_string(),
            market_open: "09:30".to_string(),
            market_close: "16:00".to_string(),
            afterhours_end: "20:00".to_string(),
        }
    }
}

impl SessionConfig {
    /// Parsed session timezone
    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::UnknownTimezone(self.timezone.clone()))
    }
}

/// Watchlist screening configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchlistConfig {
    /// Minutes between screening cycles
    pub screening_interval_minutes: u64,
    /// Upper bound on watchlist size
    pub max_watchlist_size: usize,
    /// Exchange used for every watchlisted symbol
    pub default_exchange: String,
}

impl Default for WatchlistConfig {
    fn default() -> Self {
        Self {
            screening_interval_minutes: 1,
            max_watchlist_size: 50,
            default_exchange: "NASDAQ".to_string(),
        }
    }
}

impl WatchlistConfig {
    pub fn screening_interval(&self) -> Duration {
        Duration::from_secs(self.screening_interval_minutes * 60)
    }
}

/// Historical backfill configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackfillConfig {
    /// Days back to the anchor on Tuesday through Friday (Monday always jumps to Friday)
    pub lookback_days: u32,
    /// Request premarket and afterhours bars
    pub extended_hours: bool,
    /// Compute indicators before storing
    pub add_indicators: bool,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            lookback_days: 1,
            extended_hours: true,
            add_indicators: true,
        }
    }
}

/// Live streaming configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// Start pollers for watchlisted symbols
    pub enabled: bool,
    /// Seconds between poll attempts
    pub update_interval_secs: u64,
    /// Transport retries inside one provider request
    pub max_retries: u32,
    /// Upper bound in seconds on the backoff between transport retries
    pub reconnect_delay_secs: u64,
    /// Maximum number of concurrent streams
    pub batch_size: usize,
    /// Include premarket and afterhours bars in live polls
    pub enable_extended_hours: bool,
    /// Hours of live-polled bars kept by the retention sweep
    pub data_retention_hours: u64,
    /// Seconds to wait for one poller to acknowledge a stop
    pub stop_timeout_secs: u64,
    /// Seconds to wait for everything during shutdown
    pub shutdown_timeout_secs: u64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            update_interval_secs: 5,
            max_retries: 3,
            reconnect_delay_secs: 30,
            batch_size: 50,
            enable_extended_hours: true,
            data_retention_hours: 48,
            stop_timeout_secs: 10,
            shutdown_timeout_secs: 15,
        }
    }
}

impl LiveConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn max_concurrent_streams(&self) -> usize {
        self.batch_size
    }
}

/// Market data provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Base bar interval for backfill and live polling
    pub interval: Interval,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8700".to_string(),
            timeout_secs: 10,
            interval: Interval::OneMinute,
        }
    }
}

/// Screening service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenerConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8700".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    #[default]
    Parquet,
}

/// Bar storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Root directory for the Parquet backend
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Parquet,
            data_dir: PathBuf::from("./data"),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable ones
    pub json_logs: bool,
    /// Serve Prometheus metrics on this port when set
    pub metrics_port: Option<u16>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_port: None,
        }
    }
}

impl Config {
    /// Load and validate configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        SessionBoundaries::from_config(&self.session)?;
        self.session.timezone()?;

        if self.watchlist.max_watchlist_size == 0 {
            return Err(ConfigError::Zero("watchlist.max_watchlist_size"));
        }
        if self.watchlist.screening_interval_minutes == 0 {
            return Err(ConfigError::Zero("watchlist.screening_interval_minutes"));
        }
        if self.live.batch_size == 0 {
            return Err(ConfigError::Zero("live.batch_size"));
        }
        if self.live.update_interval_secs == 0 {
            return Err(ConfigError::Zero("live.update_interval_secs"));
        }

        Ok(())
    }
}
