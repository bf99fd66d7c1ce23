/// Runtime configuration: command line, optional `ingest.toml`, defaults.
///
/// Command-line values win over the file, the file wins over the built-in
/// defaults. The database location is not part of this; it comes from
/// DATABASE_URL (see `db`).

use crate::ingest::buienradar::BUIENRADAR_FEED_URL;
use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::Level;

pub const DEFAULT_CONFIG_FILE: &str = "ingest.toml";
pub const DEFAULT_INTERVAL_MINUTES: u64 = 10;
pub const DEFAULT_BACKOFF_SECONDS: u64 = 60;
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// One week.
pub const MAX_INTERVAL_MINUTES: u64 = 7 * 24 * 60;
/// One day.
pub const MAX_BACKOFF_SECONDS: u64 = 24 * 60 * 60;
/// One hour.
pub const MAX_TIMEOUT_SECONDS: u64 = 60 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),

    #[error("{name} must be at most {max}, got {value}")]
    TooLarge {
        name: &'static str,
        value: u64,
        max: u64,
    },

    #[error("Unknown log level '{0}' (expected trace, debug, info, warn or error)")]
    LogLevel(String),
}

/// Command-line options.
#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "buienradar_ingest",
    version,
    about = "Polls the Buienradar feed and warehouses new station measurements"
)]
pub struct Cli {
    /// Path to a TOML config file (default: ./ingest.toml if it exists)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Minutes between the end of one ingestion cycle and the start of the next
    #[arg(short, long)]
    pub interval_minutes: Option<u64>,

    /// Feed URL to poll
    #[arg(long)]
    pub feed_url: Option<String>,

    /// Pause after an unexpected cycle failure, in seconds
    #[arg(long)]
    pub backoff_seconds: Option<u64>,

    /// HTTP timeout for the feed request, in seconds
    #[arg(long)]
    pub timeout_seconds: Option<u64>,

    /// Serve the read-only query API on this port
    #[arg(short, long)]
    pub endpoint: Option<u16>,

    /// Logging verbosity: trace, debug, info, warn or error
    #[arg(short, long)]
    pub log_level: Option<String>,
}

/// Contents of the TOML config file. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub interval_minutes: Option<u64>,
    pub feed_url: Option<String>,
    pub backoff_seconds: Option<u64>,
    pub timeout_seconds: Option<u64>,
    pub endpoint: Option<u16>,
    pub log_level: Option<String>,
}

/// Effective configuration after merging.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestConfig {
    pub feed_url: String,
    pub interval: Duration,
    pub backoff: Duration,
    pub request_timeout: Duration,
    pub endpoint_port: Option<u16>,
    pub log_level: Level,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            feed_url: BUIENRADAR_FEED_URL.to_string(),
            interval: Duration::from_secs(DEFAULT_INTERVAL_MINUTES * 60),
            backoff: Duration::from_secs(DEFAULT_BACKOFF_SECONDS),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
            endpoint_port: None,
            log_level: Level::INFO,
        }
    }
}

impl IngestConfig {
    /// Merges command-line options over file values over defaults.
    pub fn resolve(cli: &Cli, file: FileConfig) -> Result<Self, ConfigError> {
        let interval_minutes = cli
            .interval_minutes
            .or(file.interval_minutes)
            .unwrap_or(DEFAULT_INTERVAL_MINUTES);
        let backoff_seconds = cli
            .backoff_seconds
            .or(file.backoff_seconds)
            .unwrap_or(DEFAULT_BACKOFF_SECONDS);
        let timeout_seconds = cli
            .timeout_seconds
            .or(file.timeout_seconds)
            .unwrap_or(DEFAULT_TIMEOUT_SECONDS);

        if interval_minutes == 0 {
            return Err(ConfigError::NotPositive("interval_minutes"));
        }
        if timeout_seconds == 0 {
            return Err(ConfigError::NotPositive("timeout_seconds"));
        }
        check_max("interval_minutes", interval_minutes, MAX_INTERVAL_MINUTES)?;
        check_max("backoff_seconds", backoff_seconds, MAX_BACKOFF_SECONDS)?;
        check_max("timeout_seconds", timeout_seconds, MAX_TIMEOUT_SECONDS)?;

        let interval_seconds = interval_minutes.checked_mul(60).ok_or(ConfigError::TooLarge {
            name: "interval_minutes",
            value: interval_minutes,
            max: MAX_INTERVAL_MINUTES,
        })?;

        let log_level = match cli.log_level.clone().or(file.log_level) {
            Some(level) => parse_level(&level)?,
            None => Level::INFO,
        };

        Ok(Self {
            feed_url: cli
                .feed_url
                .clone()
                .or(file.feed_url)
                .unwrap_or_else(|| BUIENRADAR_FEED_URL.to_string()),
            interval: Duration::from_secs(interval_seconds),
            backoff: Duration::from_secs(backoff_seconds),
            request_timeout: Duration::from_secs(timeout_seconds),
            endpoint_port: cli.endpoint.or(file.endpoint),
            log_level,
        })
    }
}

fn check_max(name: &'static str, value: u64, max: u64) -> Result<(), ConfigError> {
    if value > max {
        return Err(ConfigError::TooLarge { name, value, max });
    }
    Ok(())
}

fn parse_level(level: &str) -> Result<Level, ConfigError> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(ConfigError::LogLevel(level.to_string())),
    }
}

/// Parses a config file.
pub fn load_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads configuration for the process: an explicitly named file must
/// exist, the default `ingest.toml` is used only when present.
pub fn load_config(cli: &Cli) -> Result<IngestConfig, ConfigError> {
    let file = match &cli.config {
        Some(path) => load_file_config(path)?,
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                load_file_config(default_path)?
            } else {
                FileConfig::default()
            }
        }
    };

    IngestConfig::resolve(cli, file)
}
