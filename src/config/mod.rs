//! Configuration management for blockwatch
//!
//! This module handles loading and validating configuration from environment
//! variables (optionally seeded from a `.env` file) and TOML files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::Country;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Checking cycle configuration
    pub checker: CheckerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Subscriber notification configuration
    pub notifications: NotificationConfig,

    /// Metrics endpoint configuration
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Checking cycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckerConfig {
    /// Countries checked every cycle, each with its own proxy pool
    pub countries: Vec<Country>,

    /// Seconds between cycle starts
    pub interval_secs: u64,

    /// Per-probe deadline in seconds
    pub probe_timeout_secs: u64,

    /// Connect (and proxy handshake) deadline in seconds
    pub connect_timeout_secs: u64,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,
}

/// Subscriber notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Telegram bot token
    pub telegram_token: Option<String>,

    /// Telegram Bot API base URL
    pub telegram_api_base: String,

    /// Capacity of the digest queue
    pub queue_capacity: usize,

    /// Maximum recipient sends per second
    pub sends_per_second: u32,
}

/// Metrics endpoint configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Address of the `/metrics` listener, disabled when unset
    pub listen_addr: Option<SocketAddr>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,

    /// Directory for daily-rotated log files, console only when unset
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

/// Default probe deadline
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 20;

/// Default cycle period
pub const DEFAULT_INTERVAL_SECS: u64 = 5 * 60;

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn parse_countries(raw: &str) -> Result<Vec<Country>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|code| {
            Country::parse(code).with_context(|| format!("Invalid country code '{code}'"))
        })
        .collect()
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let countries = match std::env::var("BLOCKWATCH_COUNTRIES") {
            Ok(raw) => parse_countries(&raw).context("Failed to parse BLOCKWATCH_COUNTRIES")?,
            Err(_) => defaults.checker.countries,
        };

        let interval_secs =
            env_parse("BLOCKWATCH_INTERVAL_SECS").unwrap_or(defaults.checker.interval_secs);

        let probe_timeout_secs = env_parse("BLOCKWATCH_PROBE_TIMEOUT")
            .unwrap_or(defaults.checker.probe_timeout_secs);

        let connect_timeout_secs = env_parse("BLOCKWATCH_CONNECT_TIMEOUT")
            .unwrap_or(defaults.checker.connect_timeout_secs);

        let sqlite_path = std::env::var("BLOCKWATCH_SQLITE_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.database.sqlite_path);

        let telegram_token = std::env::var("BLOCKWATCH_TELEGRAM_TOKEN")
            .or_else(|_| std::env::var("TG_TOKEN"))
            .ok()
            .filter(|t| !t.trim().is_empty());

        let telegram_api_base = std::env::var("BLOCKWATCH_TELEGRAM_API")
            .unwrap_or(defaults.notifications.telegram_api_base);

        let queue_capacity = env_parse("BLOCKWATCH_QUEUE_CAPACITY")
            .unwrap_or(defaults.notifications.queue_capacity);

        let sends_per_second = env_parse("BLOCKWATCH_SENDS_PER_SECOND")
            .unwrap_or(defaults.notifications.sends_per_second);

        let listen_addr = match std::env::var("BLOCKWATCH_METRICS_ADDR") {
            Ok(raw) => Some(
                raw.trim()
                    .parse::<SocketAddr>()
                    .with_context(|| format!("Invalid BLOCKWATCH_METRICS_ADDR '{raw}'"))?,
            ),
            Err(_) => None,
        };

        let level = std::env::var("BLOCKWATCH_LOG_LEVEL").unwrap_or(defaults.logging.level);
        let format = std::env::var("BLOCKWATCH_LOG_FORMAT").unwrap_or(defaults.logging.format);
        let directory = std::env::var("BLOCKWATCH_LOG_DIR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            checker: CheckerConfig {
                countries,
                interval_secs,
                probe_timeout_secs,
                connect_timeout_secs,
            },
            database: DatabaseConfig { sqlite_path },
            notifications: NotificationConfig {
                telegram_token,
                telegram_api_base,
                queue_capacity,
                sends_per_second,
            },
            metrics: MetricsConfig { listen_addr },
            logging: LoggingConfig {
                level,
                format,
                directory,
            },
        })
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.checker.countries.is_empty() {
            anyhow::bail!("at least one country must be configured");
        }

        if self.checker.interval_secs == 0 {
            anyhow::bail!("interval_secs must be greater than 0");
        }

        if self.checker.probe_timeout_secs == 0 {
            anyhow::bail!("probe_timeout_secs must be greater than 0");
        }

        if self.checker.connect_timeout_secs == 0 {
            anyhow::bail!("connect_timeout_secs must be greater than 0");
        }

        if self.notifications.queue_capacity == 0 {
            anyhow::bail!("queue_capacity must be greater than 0");
        }

        if self.notifications.sends_per_second == 0 {
            anyhow::bail!("sends_per_second must be greater than 0");
        }

        Ok(())
    }

    /// Telegram token required by the long-running service
    pub fn require_telegram_token(&self) -> Result<&str> {
        self.notifications
            .telegram_token
            .as_deref()
            .context("Telegram token is not configured (set BLOCKWATCH_TELEGRAM_TOKEN or TG_TOKEN)")
    }

    /// Get cycle period as Duration
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.checker.interval_secs)
    }

    /// Get probe deadline as Duration
    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.checker.probe_timeout_secs)
    }

    /// Get connect deadline as Duration
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.checker.connect_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            checker: CheckerConfig {
                countries: ["RU", "BY"].iter().filter_map(|c| Country::parse(c)).collect(),
                interval_secs: DEFAULT_INTERVAL_SECS,
                probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
                connect_timeout_secs: 10,
            },
            database: DatabaseConfig {
                sqlite_path: PathBuf::from("data/blockwatch.db"),
            },
            notifications: NotificationConfig {
                telegram_token: None,
                telegram_api_base: String::from("https://api.telegram.org"),
                queue_capacity: 50,
                sends_per_second: 30,
            },
            metrics: MetricsConfig::default(),
            logging: LoggingConfig {
                level: String::from("info"),
                format: String::from("text"),
                directory: None,
            },
        }
    }
}
