use std::fmt;

use config::Config;
use config::shared::{ProgressStoreConfig, QueueConfig, SentryConfig, ValidationError};
use serde::Deserialize;

/// Complete configuration of the webhook API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// HTTP server settings.
    pub application: ApplicationSettings,
    /// Queue receiving merge jobs. Its database also holds the durable progress store.
    pub queue: QueueConfig,
    /// Where sync progress is kept between webhook deliveries.
    #[serde(default)]
    pub progress_store: ProgressStoreConfig,
    /// Optional Sentry configuration for error tracking.
    pub sentry: Option<SentryConfig>,
}

impl ApiConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.queue.validate()
    }
}

impl Config for ApiConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}

/// HTTP server configuration settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationSettings {
    /// Host address the API listens on.
    pub host: String,
    /// Port number the API listens on.
    pub port: u16,
}

impl fmt::Display for ApplicationSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "    host: {}", self.host)?;
        writeln!(f, "    port: {}", self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_store_defaults_to_postgres() {
        let config: ApiConfig = serde_json::from_value(serde_json::json!({
            "application": { "host": "127.0.0.1", "port": 8000 },
            "queue": {
                "connection": {
                    "host": "localhost",
                    "port": 5432,
                    "name": "postgres",
                    "username": "postgres"
                }
            }
        }))
        .unwrap();

        assert_eq!(config.progress_store, ProgressStoreConfig::Postgres);
        assert!(config.sentry.is_none());
        assert!(config.validate().is_ok());
    }
}
