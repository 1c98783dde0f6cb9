//! Exponential backoff tuning for the Ingestor's indefinite retry loop.
//!
//! No `max_attempts` cap — both writes retry indefinitely, so there is
//! no attempt ceiling here.

use std::time::Duration;

/// Initial/max delay and multiplier for [`crate::retry_indefinitely`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Delay is never allowed to exceed this.
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each failed attempt.
    pub backoff_multiplier: f64,
}

impl Default for BackoffConfig {
    /// ~0.5s initial delay, 1.5x multiplier, 60s cap.
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 1.5,
        }
    }
}

impl BackoffConfig {
    /// The delay to sleep before the `attempt`-th retry (0-indexed:
    /// `attempt = 0` is the delay before the first retry).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(i32::try_from(attempt).unwrap_or(i32::MAX));
        Duration::from_secs_f64(scaled.min(self.max_delay.as_secs_f64()))
    }
}
