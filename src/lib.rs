// Specific pedantic lints enforced (not blanket allow):
#![deny(
    clippy::explicit_iter_loop,
    clippy::manual_let_else,
    clippy::semicolon_if_nothing_returned,
    clippy::inconsistent_struct_constructor
)]
// Noisy pedantic lints suppressed with justification:
#![allow(
    clippy::cast_possible_truncation, // Millisecond durations fit in u64
    clippy::cast_precision_loss,      // Acceptable for metrics/display
    clippy::missing_errors_doc,       // Error enums document themselves
    clippy::module_name_repetitions,  // e.g. BufferError in buffer module
    clippy::must_use_candidate
)]

pub mod app;
pub mod buffer;
pub mod sink;

// Re-export main types for easy access
pub use buffer::{Buffer, BufferBuilder, BufferError, BufferOption, BufferOptions, ConfigError};
pub use sink::{CollectingFlusher, Flusher, HookFlusher, flush_fn};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
