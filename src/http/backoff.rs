//! Delay strategies applied between retry attempts.

use std::time::Duration;

/// Computes the pause inserted before a retry.
///
/// `attempt` is the zero-based index of the retry about to happen, so the delay
/// preceding the first retry is `delay(0)`. Implementations must be pure
/// functions of the index: the same instance is shared by concurrent calls.
pub trait BackoffStrategy: Send + Sync {
    fn delay(&self, attempt: u32) -> Duration;
}

/// Retries immediately.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoBackoff;

impl BackoffStrategy for NoBackoff {
    fn delay(&self, _attempt: u32) -> Duration {
        Duration::ZERO
    }
}

/// Waits the same fixed duration before every retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearBackoff {
    delay: Duration,
}

impl LinearBackoff {
    /// Creates a backoff waiting `delay` before each retry.
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl BackoffStrategy for LinearBackoff {
    fn delay(&self, _attempt: u32) -> Duration {
        self.delay
    }
}

/// Waits `initial_delay * multiplier^attempt`, saturating at [`Duration::MAX`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    multiplier: u32,
}

impl ExponentialBackoff {
    /// Creates a backoff starting at `initial_delay` and growing by `multiplier` per retry.
    pub fn new(initial_delay: Duration, multiplier: u32) -> Self {
        Self {
            initial_delay,
            multiplier,
        }
    }
}

impl BackoffStrategy for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        self.multiplier
            .checked_pow(attempt)
            .and_then(|factor| self.initial_delay.checked_mul(factor))
            .unwrap_or(Duration::MAX)
    }
}
