use std::fmt;

/// Event that caused the controller to hand a batch to the flusher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlushReason {
    /// The accumulator reached capacity.
    Capacity,
    /// The auto-flush interval elapsed.
    Interval,
    /// A caller asked for a flush.
    Manual,
    /// Final drain while closing.
    Close,
}

impl FlushReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlushReason::Capacity => "capacity",
            FlushReason::Interval => "interval",
            FlushReason::Manual => "manual",
            FlushReason::Close => "close",
        }
    }
}

impl fmt::Display for FlushReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
