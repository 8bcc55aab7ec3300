use std::time::Duration;

use config::shared::RetryConfig;
use rand::Rng;

/// Exponential backoff with jitter and a bounded number of attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    jitter_percent: u8,
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        initial_backoff: Duration,
        max_backoff: Duration,
        jitter_percent: u8,
    ) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            max_backoff,
            jitter_percent: jitter_percent.min(100),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether a job that failed its `attempt`-th delivery may run again.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay before the delivery following the failed `attempt`-th one.
    ///
    /// Doubles from the initial backoff, is capped at the maximum backoff and gets up to
    /// `jitter_percent` of random extra delay.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let base = self
            .initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff);

        let max_jitter_ms = base.as_millis() as u64 * u64::from(self.jitter_percent) / 100;
        if max_jitter_ms == 0 {
            return base;
        }

        let jitter_ms = rand::thread_rng().gen_range(0..=max_jitter_ms);
        base + Duration::from_millis(jitter_ms)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.initial_backoff_ms),
            Duration::from_millis(config.max_backoff_ms),
            config.jitter_percent,
        )
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}
