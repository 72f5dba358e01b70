//! Global byte-rate limiting shared by all partition workers.
use std::num::NonZeroU32;

use governor::{DefaultDirectRateLimiter, Quota};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimiterError {
    #[error("requested {requested} tokens but the bucket only holds {capacity}")]
    InsufficientCapacity { requested: usize, capacity: u32 },

    #[error("cannot acquire zero tokens")]
    ZeroTokens,
}

/// Outcome of [`RateLimiter::acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    /// The tokens were deducted from the bucket.
    Granted,

    /// Cancellation fired before the tokens became available. Nothing was
    /// deducted.
    Cancelled,
}

/// A token bucket counting bytes.
///
/// Capacity and refill rate are both `bytes_per_second`, so up to one second
/// worth of traffic can be sent in a burst.
#[derive(Debug)]
pub struct RateLimiter {
    capacity: NonZeroU32,
    inner: DefaultDirectRateLimiter,
}

impl RateLimiter {
    pub fn new(bytes_per_second: NonZeroU32) -> Self {
        let quota = Quota::per_second(bytes_per_second).allow_burst(bytes_per_second);
        Self {
            capacity: bytes_per_second,
            inner: governor::RateLimiter::direct(quota),
        }
    }

    /// Bucket capacity in bytes.
    pub fn capacity(&self) -> u32 {
        self.capacity.get()
    }

    /// Wait until `n` tokens are available and deduct them.
    ///
    /// Returns [`Acquire::Cancelled`] without deducting anything if `cancel`
    /// fires first, including when it already fired before the call.
    pub async fn acquire(
        &self,
        n: usize,
        cancel: &CancellationToken,
    ) -> Result<Acquire, LimiterError> {
        if cancel.is_cancelled() {
            return Ok(Acquire::Cancelled);
        }

        let requested = u32::try_from(n)
            .ok()
            .and_then(NonZeroU32::new)
            .ok_or(if n == 0 {
                LimiterError::ZeroTokens
            } else {
                LimiterError::InsufficientCapacity {
                    requested: n,
                    capacity: self.capacity.get(),
                }
            })?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(Acquire::Cancelled),
            res = self.inner.until_n_ready(requested) => match res {
                Ok(_) => Ok(Acquire::Granted),
                Err(_) => Err(LimiterError::InsufficientCapacity {
                    requested: n,
                    capacity: self.capacity.get(),
                }),
            },
        }
    }
}
