use serde::Deserialize;

/// Where the per-connection sync progress is kept.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStoreConfig {
    /// Process-local memory. Progress is lost on restart and not shared between replicas.
    Memory,
    /// The `etl.connection_progress` table of the queue database.
    #[default]
    Postgres,
}
