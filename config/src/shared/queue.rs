use std::time::Duration;

use serde::Deserialize;

use crate::shared::{PgConnectionConfig, ValidationError};

/// Durable job queue settings.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Database holding the `etl.merge_jobs` and `etl.connection_progress` tables.
    pub connection: PgConnectionConfig,
    /// Milliseconds a claimed job stays invisible to other workers before it is
    /// redelivered.
    #[serde(default = "default_lease_duration_ms")]
    pub lease_duration_ms: u64,
    /// Retry behavior for failed jobs.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl QueueConfig {
    pub const DEFAULT_LEASE_DURATION_MS: u64 = 5 * 60 * 1_000;

    pub fn lease_duration(&self) -> Duration {
        Duration::from_millis(self.lease_duration_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.connection.validate()?;

        if self.lease_duration_ms == 0 {
            return Err(ValidationError::invalid("lease_duration_ms", "cannot be zero"));
        }

        self.retry.validate()
    }
}

/// Exponential backoff applied between attempts of a failed job.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RetryConfig {
    /// Attempts after which a job is moved to the dead-letter state.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the second attempt.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Upper bound for the delay between attempts.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Random extra delay, as a percentage of the computed backoff.
    #[serde(default = "default_jitter_percent")]
    pub jitter_percent: u8,
}

impl RetryConfig {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

    pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 1_000;

    pub const DEFAULT_MAX_BACKOFF_MS: u64 = 60_000;

    pub const DEFAULT_JITTER_PERCENT: u8 = 20;

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_attempts == 0 {
            return Err(ValidationError::invalid("max_attempts", "cannot be zero"));
        }

        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(ValidationError::invalid(
                "initial_backoff_ms",
                "cannot exceed max_backoff_ms",
            ));
        }

        if self.jitter_percent > 100 {
            return Err(ValidationError::invalid(
                "jitter_percent",
                "must be between 0 and 100",
            ));
        }

        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            jitter_percent: default_jitter_percent(),
        }
    }
}

fn default_lease_duration_ms() -> u64 {
    QueueConfig::DEFAULT_LEASE_DURATION_MS
}

fn default_max_attempts() -> u32 {
    RetryConfig::DEFAULT_MAX_ATTEMPTS
}

fn default_initial_backoff_ms() -> u64 {
    RetryConfig::DEFAULT_INITIAL_BACKOFF_MS
}

fn default_max_backoff_ms() -> u64 {
    RetryConfig::DEFAULT_MAX_BACKOFF_MS
}

fn default_jitter_percent() -> u8 {
    RetryConfig::DEFAULT_JITTER_PERCENT
}
