pub mod batch;
mod controller;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod options;

pub use batch::FlushReason;
pub use error::{BufferError, ConfigError, ErrorRecovery, Operation};
pub use gateway::{Buffer, BufferBuilder};
pub use metrics::{BufferMetrics, BufferMetricsCollector};
pub use options::{BufferOption, BufferOptions, DEFAULT_CAPACITY, DEFAULT_TIMEOUT};
