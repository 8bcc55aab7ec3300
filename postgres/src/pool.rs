use std::time::Duration;

use config::shared::{IntoConnectOptions, PgConnectionConfig};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Maximum time spent waiting for a pooled connection before giving up.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connects to the configured database and returns a pool of at most `max_connections`.
pub async fn connect_pool(
    config: &PgConnectionConfig,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect_with(config.with_db())
        .await?;

    tracing::debug!(
        host = %config.host,
        port = config.port,
        database = %config.name,
        "connected to postgres"
    );

    Ok(pool)
}

/// Returns a pool which opens connections on first use.
///
/// Lets a service start listening before its database is reachable.
pub fn get_connection_pool(config: &PgConnectionConfig, max_connections: u32) -> PgPool {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect_lazy_with(config.with_db())
}
