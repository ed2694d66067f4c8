use super::config::{LogFormat, LogLevel};
use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },
    #[error("Logging system initialization failed: {0}")]
    InitFailed(String),
}

/// Filter used when `RUST_LOG` is unset: the configured level for this
/// crate and everything else, with the runtime's own chatter kept at warn.
pub fn build_filter_string(level: LogLevel) -> String {
    format!("{},tokio=warn,runtime=warn", level.as_str())
}

pub fn build_env_filter(level: LogLevel) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let filter_string = build_filter_string(level);
    EnvFilter::try_new(&filter_string).map_err(|e| LoggingError::InvalidFilter {
        filter: filter_string,
        reason: e.to_string(),
    })
}

/// Installs the global tracing subscriber. Fails if one is already set.
pub fn setup_logging(level: LogLevel, format: LogFormat) -> Result<(), LoggingError> {
    let registry = tracing_subscriber::registry().with(build_env_filter(level)?);

    let result = match format {
        LogFormat::Compact => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_level(true)
                    .compact(),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(false))
            .try_init(),
    };

    result.map_err(|e| LoggingError::InitFailed(e.to_string()))
}
