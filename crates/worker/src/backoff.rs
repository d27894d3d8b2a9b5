//! Exponential backoff for calls to the scheduler.
//!
//! The delay before retry `n` (starting at 1) is
//! `min(2^(n + offset) * base, max) + jitter`, so with the defaults the
//! first retry waits about 1.6 s and later ones cap at one minute.

use std::time::Duration;

use rand::Rng;

/// Tunable parameters for the backoff strategy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    /// Upper bound on the delay before jitter.
    pub max_delay: Duration,
    /// Added to the retry number so early retries are not too eager.
    pub exponent_offset: u32,
    /// Random extra delay is drawn from `0..max_jitter`.
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(60),
            exponent_offset: 3,
            max_jitter: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Deterministic part of the delay before retry `retry`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32
            .checked_pow(retry.saturating_add(self.exponent_offset))
            .unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delay before retry `retry`, jitter included.
    pub fn delay(&self, retry: u32) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::rng().random_range(0..jitter_ms))
        };
        self.backoff(retry) + jitter
    }
}
