//! Exponential backoff for the Tailer's error path.
//!
//! Shaped the same as `oplog_ingest::BackoffConfig`, kept as a separate
//! small copy here since the Tailer and the Ingestor are peer components
//! with independently tunable backoff, not a shared dependency
//! relationship.

use std::time::Duration;

/// Delay tuning for re-entering DECIDE after a LIVE-TAIL error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Delay never exceeds this.
    pub max_delay: Duration,
    /// Multiplier applied after each failed attempt.
    pub backoff_multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 1.5,
        }
    }
}

impl BackoffConfig {
    /// The delay to sleep before the `attempt`-th retry.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(i32::try_from(attempt).unwrap_or(i32::MAX));
        Duration::from_secs_f64(scaled.min(self.max_delay.as_secs_f64()))
    }
}
