use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Gateway operation that produced a [`BufferError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Push,
    Flush,
    Close,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Push => "push",
            Operation::Flush => "flush",
            Operation::Close => "close",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("{operation} timed out after {waited:?}")]
    Timeout { operation: Operation, waited: Duration },

    #[error("Buffer is closed")]
    Closed,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid buffer capacity: {capacity} (must be greater than 0)")]
    InvalidCapacity { capacity: usize },

    #[error("Invalid {name}: {value:?} (must be greater than 0)")]
    InvalidTimeout { name: &'static str, value: Duration },

    #[error("A flusher is required to build a buffer")]
    MissingFlusher,

    #[error("Buffer must be created inside a Tokio runtime")]
    NoRuntime,
}

/// How a caller should react to a failed gateway operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorRecovery {
    /// The signal may or may not have landed; trying again is safe.
    Retry,
    /// The buffer will never accept this operation again.
    Fail,
}

impl BufferError {
    pub fn timeout(operation: Operation, waited: Duration) -> Self {
        BufferError::Timeout { operation, waited }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, BufferError::Timeout { .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, BufferError::Closed)
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            BufferError::Timeout { .. } => true,
            BufferError::Closed => false,
        }
    }

    pub fn recovery_strategy(&self) -> ErrorRecovery {
        match self {
            BufferError::Timeout { .. } => ErrorRecovery::Retry,
            BufferError::Closed => ErrorRecovery::Fail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_error_recovery_strategies() {
        let timeout = BufferError::timeout(Operation::Push, Duration::from_secs(1));
        assert!(timeout.is_recoverable());
        assert!(timeout.is_timeout());
        assert_eq!(timeout.recovery_strategy(), ErrorRecovery::Retry);

        assert!(!BufferError::Closed.is_recoverable());
        assert!(BufferError::Closed.is_closed());
        assert_eq!(BufferError::Closed.recovery_strategy(), ErrorRecovery::Fail);
    }

    #[test]
    fn test_error_messages() {
        let err = BufferError::timeout(Operation::Close, Duration::from_millis(250));
        assert_eq!(err.to_string(), "close timed out after 250ms");

        let err = ConfigError::InvalidTimeout {
            name: "push timeout",
            value: Duration::ZERO,
        };
        assert!(err.to_string().contains("push timeout"));
    }
}
