use super::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_CAPACITY: usize = 100;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Immutable parameters of a [`Buffer`](super::Buffer).
///
/// A zero `flush_interval` disables automatic flushing. Durations are
/// (de)serialized as integer milliseconds so the struct can be embedded in
/// TOML configuration as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferOptions {
    pub capacity: usize,
    #[serde(with = "duration_millis")]
    pub flush_interval: Duration,
    #[serde(with = "duration_millis")]
    pub push_timeout: Duration,
    #[serde(with = "duration_millis")]
    pub flush_timeout: Duration,
    #[serde(with = "duration_millis")]
    pub close_timeout: Duration,
}

impl Default for BufferOptions {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            flush_interval: Duration::ZERO,
            push_timeout: DEFAULT_TIMEOUT,
            flush_timeout: DEFAULT_TIMEOUT,
            close_timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// A single named setting. Applied in order by [`BufferOptions::resolve`],
/// so a later setting overwrites an earlier one of the same kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferOption {
    Capacity(usize),
    FlushInterval(Duration),
    PushTimeout(Duration),
    FlushTimeout(Duration),
    CloseTimeout(Duration),
}

impl BufferOption {
    pub(crate) fn apply(self, options: &mut BufferOptions) {
        match self {
            BufferOption::Capacity(capacity) => options.capacity = capacity,
            BufferOption::FlushInterval(interval) => options.flush_interval = interval,
            BufferOption::PushTimeout(timeout) => options.push_timeout = timeout,
            BufferOption::FlushTimeout(timeout) => options.flush_timeout = timeout,
            BufferOption::CloseTimeout(timeout) => options.close_timeout = timeout,
        }
    }
}

impl BufferOptions {
    /// Merges `overrides` over the defaults and validates the result.
    pub fn resolve<I>(overrides: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = BufferOption>,
    {
        let mut options = Self::default();
        for option in overrides {
            option.apply(&mut options);
        }
        options.validate()?;
        Ok(options)
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn with_push_timeout(mut self, timeout: Duration) -> Self {
        self.push_timeout = timeout;
        self
    }

    pub fn with_flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = timeout;
        self
    }

    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    pub fn auto_flush_enabled(&self) -> bool {
        !self.flush_interval.is_zero()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::InvalidCapacity {
                capacity: self.capacity,
            });
        }

        let timeouts = [
            ("push timeout", self.push_timeout),
            ("flush timeout", self.flush_timeout),
            ("close timeout", self.close_timeout),
        ];
        for (name, value) in timeouts {
            if value.is_zero() {
                return Err(ConfigError::InvalidTimeout { name, value });
            }
        }

        Ok(())
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
