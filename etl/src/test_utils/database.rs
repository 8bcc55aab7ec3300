use config::shared::{PgConnectionConfig, TlsConfig};
use postgres::test_utils::{create_pg_database, drop_pg_database};
use sqlx::PgPool;
use uuid::Uuid;

use crate::migrations::apply_etl_migrations;

/// Builds the connection config of a uniquely named test database.
///
/// Reads `TESTS_DATABASE_HOST`, `TESTS_DATABASE_PORT`, `TESTS_DATABASE_USERNAME` and the
/// optional `TESTS_DATABASE_PASSWORD`.
pub fn local_pg_connection_config() -> PgConnectionConfig {
    PgConnectionConfig {
        host: std::env::var("TESTS_DATABASE_HOST").expect("TESTS_DATABASE_HOST must be set"),
        port: std::env::var("TESTS_DATABASE_PORT")
            .expect("TESTS_DATABASE_PORT must be set")
            .parse()
            .expect("TESTS_DATABASE_PORT must be a valid port number"),
        name: Uuid::new_v4().to_string(),
        username: std::env::var("TESTS_DATABASE_USERNAME")
            .expect("TESTS_DATABASE_USERNAME must be set"),
        password: std::env::var("TESTS_DATABASE_PASSWORD")
            .ok()
            .map(Into::into),
        tls: TlsConfig {
            trusted_root_certs: String::new(),
            enabled: false,
        },
    }
}

/// A throwaway database with the `etl` migrations applied.
pub struct TestDatabase {
    pub config: PgConnectionConfig,
    pub pool: PgPool,
}

impl TestDatabase {
    /// Drops the database. Call at the end of each test.
    pub async fn cleanup(self) {
        self.pool.close().await;
        drop_pg_database(&self.config).await;
    }
}

/// Creates a new database and applies the `etl` migrations to it.
///
/// # Panics
///
/// Panics if the database cannot be created or migrated.
pub async fn spawn_database() -> TestDatabase {
    let config = local_pg_connection_config();
    let pool = create_pg_database(&config).await;

    apply_etl_migrations(&config)
        .await
        .expect("Failed to apply etl migrations");

    TestDatabase { config, pool }
}
