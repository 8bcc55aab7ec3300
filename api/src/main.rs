use std::env;

use anyhow::{Context, anyhow};
use api::{config::ApiConfig, startup::Application};
use config::load_config;
use config::shared::PgConnectionConfig;
use telemetry::init_tracing;
use tracing::{error, info};

mod sentry;

/// Entry point of the webhook API.
///
/// `api` serves HTTP; `api migrate` applies the queue database migrations and exits.
fn main() -> anyhow::Result<()> {
    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME"))?;

    // Sentry must be initialized before the runtime starts.
    let _sentry_guard = sentry::init()?;

    actix_web::rt::System::new().block_on(async_main())?;

    Ok(())
}

async fn async_main() -> anyhow::Result<()> {
    let config = load_config::<ApiConfig>().context("loading API configuration")?;
    config.validate().context("validating API configuration")?;
    log_pg_connection_config(&config.queue.connection);

    let mut args = env::args().skip(1);
    match (args.next(), args.next()) {
        (None, _) => {
            let application = Application::build(config).await?;
            info!(port = application.port(), "webhook api listening");
            application.run_until_stopped().await?;
        }
        (Some(command), None) if command == "migrate" => {
            Application::migrate_database(config.queue.connection).await?;
            info!("database migrated successfully");
        }
        (Some(command), None) => {
            error!(%command, "invalid command");
            return Err(anyhow!("invalid command: {command}"));
        }
        _ => {
            error!("invalid number of command line arguments");
            return Err(anyhow!("invalid number of command line arguments"));
        }
    }

    Ok(())
}

fn log_pg_connection_config(config: &PgConnectionConfig) {
    info!(
        host = config.host,
        port = config.port,
        dbname = config.name,
        username = config.username,
        tls_enabled = config.tls.enabled,
        "queue database options",
    );
}
