//! Retry policy for ledger entries that fail to replay

use std::time::Duration;

/// Backoff and cutoff applied to failing ledger entries
///
/// After the `n`th failure an entry waits `initial_delay * multiplier^(n-1)`
/// (capped at `max_delay`) before the next pass picks it up. Once it has
/// failed `max_attempts` times it is moved to the dead-letter area.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Failures before an entry is dead-lettered; `None` retries forever
    pub max_attempts: Option<u32>,
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Upper bound for the delay
    pub max_delay: Duration,
    /// Backoff multiplier (e.g., 2.0 for exponential backoff)
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(10),
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(600),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Retry on every pass, forever
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Set the failure cutoff
    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the initial delay
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff multiplier
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Whether an entry that has failed `attempts` times is dead
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }

    /// Delay before the next replay of an entry that has failed `attempts` times
    pub fn delay_for(&self, attempts: u32) -> Duration {
        if attempts == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempts - 1).unwrap_or(i32::MAX);
        let delay_ms = self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);

        if !delay_ms.is_finite() || delay_ms >= self.max_delay.as_millis() as f64 {
            self.max_delay
        } else {
            Duration::from_millis(delay_ms as u64)
        }
    }
}
