pub mod config;
pub mod logging_system;
pub mod shutdown;

pub use config::{Config, ConfigError, LogFormat, LogLevel};
pub use logging_system::{LoggingError, setup_logging};

use crate::buffer::{Buffer, BufferMetrics};
use crate::sink::{Flusher, HookFlusher};
use anyhow::{Context, bail};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Flusher used by the binary: logs every batch through hooks, then waits
/// `delay` to stand in for a slow downstream.
pub struct LoggingFlusher {
    hooks: HookFlusher<u64>,
    delay: Duration,
}

impl LoggingFlusher {
    pub fn new(delay: Duration) -> Self {
        let hooks = HookFlusher::new()
            .on_start(|items: &[u64]| {
                debug!(batch_size = items.len(), "Delivering batch");
                Ok(())
            })
            .on_end(|items: &[u64]| {
                let first = items.first().copied().unwrap_or_default();
                let last = items.last().copied().unwrap_or_default();
                info!(batch_size = items.len(), first, last, "Batch delivered");
                Ok(())
            })
            .on_end_error(|items: &[u64], e: &anyhow::Error| {
                error!(batch_size = items.len(), "Batch delivery failed: {:#}", e);
            });
        Self { hooks, delay }
    }
}

impl Flusher<u64> for LoggingFlusher {
    fn flush(&mut self, items: &[u64]) -> impl Future<Output = ()> + Send {
        if let Err(e) = self.hooks.run(items) {
            warn!(phase = %e.phase(), "Flush hooks failed: {}", e);
        }
        let delay = self.delay;
        async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Producer side of the binary: pushes `config.items` numbers, then closes.
pub struct App {
    config: Config,
    shutdown: CancellationToken,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops production early; remaining items are still drained.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn run(self) -> anyhow::Result<BufferMetrics> {
        let flusher = LoggingFlusher::new(self.config.sink_delay());
        let buffer = Buffer::new(flusher, self.config.buffer_options())
            .context("Failed to create buffer")?;

        info!(
            capacity = buffer.capacity(),
            items = self.config.items,
            "Starting producer"
        );

        let produce_interval = self.config.produce_interval();
        let mut rejected = 0u64;
        for item in 0..self.config.items {
            let pushed = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => {
                    info!(produced = item, "Production interrupted");
                    break;
                }
                pushed = buffer.push(item) => pushed,
            };

            match pushed {
                Ok(()) => {}
                Err(e) if e.is_recoverable() => {
                    rejected += 1;
                    warn!(item, "Push not confirmed: {}", e);
                }
                Err(e) => return Err(e).context("Buffer stopped accepting items"),
            }

            if !produce_interval.is_zero() {
                tokio::time::sleep(produce_interval).await;
            }
        }

        close_with_retry(&buffer, self.config.close_attempts).await?;

        let collector = buffer.metrics_collector();
        let metrics = collector.snapshot();
        info!(
            accepted = metrics.items_accepted,
            flushed = metrics.items_flushed,
            batches = metrics.batches_flushed,
            unconfirmed_pushes = rejected,
            items_per_second = collector.throughput_per_second(),
            "Buffer closed"
        );
        Ok(metrics)
    }
}

/// Close is safe to retry after a timeout; give it `attempts` tries.
pub async fn close_with_retry<T>(buffer: &Buffer<T>, attempts: u32) -> anyhow::Result<()>
where
    T: Send + 'static,
{
    for attempt in 1..=attempts {
        match buffer.close().await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_recoverable() => {
                warn!(attempt, attempts, "Close not finished yet: {}", e);
            }
            Err(e) => return Err(e).context("Buffer was already closed"),
        }
    }
    bail!("Buffer did not close after {attempts} attempts")
}

pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

// Main entry point for the application
pub async fn main() -> anyhow::Result<()> {
    let config = Config::from_args(std::env::args_os()).context("Configuration error")?;

    if let Err(e) = setup_logging(config.log_level, config.log_format) {
        eprintln!("Warning: {e}");
    }

    info!("Starting rask-batch-buffer v{}", get_version());

    let app = App::new(config);
    shutdown::spawn_signal_handler(app.shutdown_token());
    app.run().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_app_delivers_every_item() {
        let config = Config {
            capacity: 7,
            items: 50,
            ..Config::default()
        };

        let metrics = App::new(config).run().await.unwrap();

        assert_eq!(metrics.items_accepted, 50);
        assert_eq!(metrics.items_flushed, 50);
        // 7 full batches plus the final drain of 1 item.
        assert_eq!(metrics.batches_flushed, 8);
        assert_eq!(metrics.close_flushes, 1);
    }

    #[tokio::test]
    async fn test_cancelled_app_still_drains() {
        let config = Config {
            capacity: 100,
            items: 1_000_000,
            ..Config::default()
        };
        let app = App::new(config);
        app.shutdown_token().cancel();

        let metrics = app.run().await.unwrap();

        assert_eq!(metrics.items_accepted, metrics.items_flushed);
        assert!(metrics.items_accepted < 1_000_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_with_retry_survives_slow_final_flush() {
        let config = Config {
            capacity: 10,
            items: 3,
            sink_delay_ms: 1500,
            close_timeout_ms: 1000,
            close_attempts: 3,
            ..Config::default()
        };

        let metrics = App::new(config).run().await.unwrap();

        assert_eq!(metrics.items_flushed, 3);
        assert_eq!(metrics.close_timeouts, 1);
    }
}
