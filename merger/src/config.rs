use anyhow::Context;
use config::shared::{MergeConfig, PgConnectionConfig, QueueConfig, SentryConfig, WorkerConfig};
use config::{Config, load_config};
use serde::Deserialize;

/// Configuration of the merger service.
#[derive(Debug, Clone, Deserialize)]
pub struct MergerConfig {
    /// Database holding the staging and destination tables.
    pub destination: PgConnectionConfig,
    /// Queue merge jobs are claimed from.
    pub queue: QueueConfig,
    /// Staging and destination schemas.
    #[serde(default)]
    pub merge: MergeConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Optional Sentry configuration for error tracking.
    pub sentry: Option<SentryConfig>,
}

impl MergerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.destination
            .validate()
            .context("invalid destination configuration")?;
        self.queue.validate().context("invalid queue configuration")?;
        self.merge.validate().context("invalid merge configuration")?;
        self.worker.validate().context("invalid worker configuration")?;

        Ok(())
    }
}

impl Config for MergerConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}

/// Loads and validates the merger configuration.
pub fn load_merger_config() -> anyhow::Result<MergerConfig> {
    let config = load_config::<MergerConfig>().context("loading merger configuration")?;
    config.validate()?;

    Ok(config)
}
