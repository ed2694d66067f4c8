use crate::buffer::{self, BufferOptions, DEFAULT_CAPACITY};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Invalid buffer options: {0}")]
    InvalidBuffer(#[from] buffer::ConfigError),
    #[error("File error: {0}")]
    FileError(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    ParseError(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable, one line per event
    #[default]
    Compact,
    /// One JSON object per event
    Json,
}

#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(author, version, about = "Pushes a stream of numbers through a batch buffer", long_about = None)]
#[serde(default)]
pub struct Config {
    /// Maximum number of items per batch
    #[arg(long, env = "BUFFER_CAPACITY", default_value_t = DEFAULT_CAPACITY)]
    pub capacity: usize,

    /// Auto-flush interval in milliseconds (0 disables)
    #[arg(long, env = "FLUSH_INTERVAL_MS", default_value = "0")]
    pub flush_interval_ms: u64,

    /// Maximum wait for a push in milliseconds
    #[arg(long, env = "PUSH_TIMEOUT_MS", default_value = "1000")]
    pub push_timeout_ms: u64,

    /// Maximum wait for a flush request in milliseconds
    #[arg(long, env = "FLUSH_TIMEOUT_MS", default_value = "1000")]
    pub flush_timeout_ms: u64,

    /// Maximum wait per close phase in milliseconds
    #[arg(long, env = "CLOSE_TIMEOUT_MS", default_value = "1000")]
    pub close_timeout_ms: u64,

    /// Number of items to push
    #[arg(long, env = "ITEM_COUNT", default_value = "1000")]
    pub items: u64,

    /// Pause between pushes in milliseconds
    #[arg(long, env = "PRODUCE_INTERVAL_MS", default_value = "0")]
    pub produce_interval_ms: u64,

    /// Simulated flusher latency in milliseconds
    #[arg(long, env = "SINK_DELAY_MS", default_value = "0")]
    pub sink_delay_ms: u64,

    /// How many times close is attempted before giving up
    #[arg(long, env = "CLOSE_ATTEMPTS", default_value = "3")]
    pub close_attempts: u32,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", default_value = "compact")]
    pub log_format: LogFormat,

    /// Configuration file path (optional, TOML)
    #[arg(long, env = "CONFIG_FILE")]
    #[serde(skip)]
    pub config_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            flush_interval_ms: 0,
            push_timeout_ms: 1000,
            flush_timeout_ms: 1000,
            close_timeout_ms: 1000,
            items: 1000,
            produce_interval_ms: 0,
            sink_delay_ms: 0,
            close_attempts: 3,
            log_level: LogLevel::Info,
            log_format: LogFormat::Compact,
            config_file: None,
        }
    }
}

impl Config {
    /// Parses CLI arguments (with env fallbacks). When a config file is
    /// given, its contents replace the parsed values.
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let config = Config::parse_from(args);
        match &config.config_file {
            Some(path) => {
                let mut from_file = Self::from_file(path)?;
                from_file.config_file = Some(path.clone());
                Ok(from_file)
            }
            None => {
                config.validate()?;
                Ok(config)
            }
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn buffer_options(&self) -> BufferOptions {
        BufferOptions::default()
            .with_capacity(self.capacity)
            .with_flush_interval(Duration::from_millis(self.flush_interval_ms))
            .with_push_timeout(Duration::from_millis(self.push_timeout_ms))
            .with_flush_timeout(Duration::from_millis(self.flush_timeout_ms))
            .with_close_timeout(Duration::from_millis(self.close_timeout_ms))
    }

    pub fn produce_interval(&self) -> Duration {
        Duration::from_millis(self.produce_interval_ms)
    }

    pub fn sink_delay(&self) -> Duration {
        Duration::from_millis(self.sink_delay_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.buffer_options().validate()?;

        if self.close_attempts == 0 {
            return Err(ConfigError::InvalidConfig(
                "Close attempts must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_from_empty_args() {
        let config = Config::from_args(["rask-batch-buffer"]).unwrap();
        assert_eq!(config.capacity, DEFAULT_CAPACITY);
        assert_eq!(config.log_level, LogLevel::Info);
        assert!(!config.buffer_options().auto_flush_enabled());
    }

    #[test]
    fn test_cli_overrides() {
        let config = Config::from_args([
            "rask-batch-buffer",
            "--capacity",
            "5",
            "--flush-interval-ms",
            "250",
            "--log-format",
            "json",
        ])
        .unwrap();

        let options = config.buffer_options();
        assert_eq!(options.capacity, 5);
        assert_eq!(options.flush_interval, Duration::from_millis(250));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = Config::from_args(["rask-batch-buffer", "--capacity", "0"]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidBuffer(buffer::ConfigError::InvalidCapacity { capacity: 0 })
        ));
    }

    #[test]
    fn test_zero_close_attempts_rejected() {
        let config = Config {
            close_attempts: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_from_file_keeps_unset_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "capacity = 7\nsink_delay_ms = 20\nlog_level = \"debug\"").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.capacity, 7);
        assert_eq!(config.sink_delay(), Duration::from_millis(20));
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.push_timeout_ms, 1000);
    }

    #[test]
    fn test_from_file_rejects_invalid_timeout() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "push_timeout_ms = 0").unwrap();

        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidBuffer(buffer::ConfigError::InvalidTimeout { .. })
        ));
    }
}
