//! Configuration of a produce run.
//!
//! All quantities are byte counts. They can be given as plain numbers or as
//! human readable sizes such as `512KB` or `1.5MB` (see [`ByteSize`]).
use std::{fmt, str::FromStr, time::Duration};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid byte size \"{input}\": {reason}")]
    InvalidByteSize { input: String, reason: &'static str },

    #[error("{name} must be greater than zero")]
    Zero { name: &'static str },

    #[error("{name} of {value} exceeds the maximum of {max}")]
    TooLarge {
        name: &'static str,
        value: ByteSize,
        max: ByteSize,
    },

    #[error("Topic name must not be empty")]
    EmptyTopic,

    #[error("Topic '{0}' has no partitions")]
    NoPartitions(String),
}

const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;
const TB: u64 = GB * 1024;

/// A quantity of bytes.
///
/// Units are powers of 1024, so `1KB == 1024` bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteSize(pub u64);

impl ByteSize {
    pub const fn b(n: u64) -> Self {
        Self(n)
    }

    pub const fn kb(n: u64) -> Self {
        Self(n * KB)
    }

    pub const fn mb(n: u64) -> Self {
        Self(n * MB)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for ByteSize {
    fn from(n: u64) -> Self {
        Self(n)
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (unit, multiplier) in [("TB", TB), ("GB", GB), ("MB", MB), ("KB", KB)] {
            if self.0 >= multiplier && self.0 % multiplier == 0 {
                return write!(f, "{}{unit}", self.0 / multiplier);
            }
        }
        write!(f, "{}B", self.0)
    }
}

impl FromStr for ByteSize {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| ConfigError::InvalidByteSize {
            input: s.to_owned(),
            reason,
        };

        let trimmed = s.trim();
        let split = trimmed
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(trimmed.len());
        let (number, unit) = trimmed.split_at(split);
        if number.is_empty() {
            return Err(invalid("missing number"));
        }

        let multiplier = match unit.trim().to_ascii_uppercase().as_str() {
            "" | "B" => 1,
            "K" | "KB" | "KIB" => KB,
            "M" | "MB" | "MIB" => MB,
            "G" | "GB" | "GIB" => GB,
            "T" | "TB" | "TIB" => TB,
            _ => return Err(invalid("unknown unit")),
        };

        if let Ok(n) = number.parse::<u64>() {
            return n
                .checked_mul(multiplier)
                .map(Self)
                .ok_or_else(|| invalid("overflow"));
        }

        let n: f64 = number.parse().map_err(|_| invalid("malformed number"))?;
        let bytes = n * multiplier as f64;
        if !bytes.is_finite() || bytes >= u64::MAX as f64 {
            return Err(invalid("overflow"));
        }
        // fractional bytes are truncated
        Ok(Self(bytes as u64))
    }
}

/// Settings for one produce run.
#[derive(Debug, Clone)]
pub struct ProduceConfig {
    topic: String,
    bytes_per_second: ByteSize,
    total_bytes: ByteSize,
    message_size: ByteSize,
    max_batch_size: ByteSize,
    drain_timeout: Duration,
}

impl ProduceConfig {
    /// Topic to produce to.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Global throughput ceiling shared by all partitions.
    pub fn bytes_per_second(&self) -> ByteSize {
        self.bytes_per_second
    }

    /// Bytes to produce over the whole run, split evenly between partitions.
    pub fn total_bytes(&self) -> ByteSize {
        self.total_bytes
    }

    /// Encoded size of every record.
    pub fn message_size(&self) -> ByteSize {
        self.message_size
    }

    /// Batch ceiling handed to the broker client.
    pub fn max_batch_size(&self) -> ByteSize {
        self.max_batch_size
    }

    /// Upper bound on how long a worker waits for outstanding acknowledgements
    /// before shutting down.
    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }
}

/// Builder for [`ProduceConfig`].
#[derive(Debug, Clone)]
pub struct ProduceConfigBuilder {
    topic: String,
    bytes_per_second: ByteSize,
    total_bytes: ByteSize,
    message_size: ByteSize,
    max_batch_size: ByteSize,
    drain_timeout: Duration,
}

impl ProduceConfigBuilder {
    /// Create a builder for `topic` with the default limits.
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            bytes_per_second: ByteSize::kb(512),
            total_bytes: ByteSize::mb(10),
            message_size: ByteSize::kb(1),
            max_batch_size: ByteSize::mb(1),
            drain_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_bytes_per_second(self, bytes_per_second: impl Into<ByteSize>) -> Self {
        Self {
            bytes_per_second: bytes_per_second.into(),
            ..self
        }
    }

    pub fn with_total_bytes(self, total_bytes: impl Into<ByteSize>) -> Self {
        Self {
            total_bytes: total_bytes.into(),
            ..self
        }
    }

    pub fn with_message_size(self, message_size: impl Into<ByteSize>) -> Self {
        Self {
            message_size: message_size.into(),
            ..self
        }
    }

    pub fn with_max_batch_size(self, max_batch_size: impl Into<ByteSize>) -> Self {
        Self {
            max_batch_size: max_batch_size.into(),
            ..self
        }
    }

    pub fn with_drain_timeout(self, drain_timeout: Duration) -> Self {
        Self {
            drain_timeout,
            ..self
        }
    }

    /// Validate the settings and build the [`ProduceConfig`].
    pub fn build(self) -> Result<ProduceConfig, ConfigError> {
        if self.topic.is_empty() {
            return Err(ConfigError::EmptyTopic);
        }

        for (name, value) in [
            ("bytes-per-second", self.bytes_per_second),
            ("max-bytes", self.total_bytes),
            ("message-size", self.message_size),
            ("max-batch-size", self.max_batch_size),
        ] {
            if value.0 == 0 {
                return Err(ConfigError::Zero { name });
            }
        }

        // the token bucket counts in u32
        let max_rate = ByteSize(u64::from(u32::MAX));
        if self.bytes_per_second > max_rate {
            return Err(ConfigError::TooLarge {
                name: "bytes-per-second",
                value: self.bytes_per_second,
                max: max_rate,
            });
        }

        // sizes in memory must be addressable on 32 bit targets
        let max_in_memory = ByteSize(u64::from(u32::MAX));
        for (name, value) in [
            ("message-size", self.message_size),
            ("max-batch-size", self.max_batch_size),
        ] {
            if value > max_in_memory {
                return Err(ConfigError::TooLarge {
                    name,
                    value,
                    max: max_in_memory,
                });
            }
        }

        Ok(ProduceConfig {
            topic: self.topic,
            bytes_per_second: self.bytes_per_second,
            total_bytes: self.total_bytes,
            message_size: self.message_size,
            max_batch_size: self.max_batch_size,
            drain_timeout: self.drain_timeout,
        })
    }
}

/// Splits `total` bytes evenly between `partitions`.
///
/// The remainder of the division is dropped, so the partitions together may
/// fall short of `total` by at most `partitions - 1` bytes.
pub fn partition_budget(
    topic: &str,
    total: ByteSize,
    partitions: usize,
) -> Result<u64, ConfigError> {
    if partitions == 0 {
        return Err(ConfigError::NoPartitions(topic.to_owned()));
    }
    Ok(total.0 / partitions as u64)
}
