use config::shared::{IntoConnectOptions, PgConnectionConfig};
use sqlx::{Executor, postgres::PgPoolOptions};
use tracing::info;

/// Applies the queue and progress store migrations to the `etl` schema.
///
/// The `search_path` is set to `etl` so the `_sqlx_migrations` table is created there
/// rather than in the destination schema.
pub async fn apply_etl_migrations(connection_config: &PgConnectionConfig) -> Result<(), sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("create schema if not exists etl;").await?;
                conn.execute("set search_path = 'etl';").await?;

                Ok(())
            })
        })
        .connect_with(connection_config.with_db())
        .await?;

    info!("applying etl migrations");

    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("etl migrations successfully applied");

    Ok(())
}
