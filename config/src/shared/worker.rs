use std::time::Duration;

use serde::Deserialize;

use crate::shared::ValidationError;

/// Settings of the merge worker pool.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Number of worker loops claiming jobs concurrently.
    ///
    /// Merges are serialized in the database, so values above one only help to drain
    /// bursts of redundant jobs faster.
    #[serde(default = "default_concurrency")]
    pub concurrency: u16,
    /// Milliseconds a worker waits before polling again when the queue is empty.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl WorkerConfig {
    pub const DEFAULT_CONCURRENCY: u16 = 1;

    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.concurrency == 0 {
            return Err(ValidationError::invalid("concurrency", "cannot be zero"));
        }

        if self.poll_interval_ms == 0 {
            return Err(ValidationError::invalid("poll_interval_ms", "cannot be zero"));
        }

        Ok(())
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_concurrency() -> u16 {
    WorkerConfig::DEFAULT_CONCURRENCY
}

fn default_poll_interval_ms() -> u64 {
    WorkerConfig::DEFAULT_POLL_INTERVAL_MS
}
