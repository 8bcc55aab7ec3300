use merger::config::{MergerConfig, load_merger_config};
use merger::core::start_merger;
use telemetry::init_tracing;
use telemetry::metrics::init_metrics;
use tracing::error;

mod sentry;

/// Entry point of the merger service.
fn main() -> anyhow::Result<()> {
    let config = load_merger_config()?;

    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME"))?;

    // Sentry must be initialized before the runtime starts.
    let _sentry_guard = sentry::init(config.sentry.as_ref())?;

    init_metrics(env!("CARGO_BIN_NAME"))?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(config))?;

    Ok(())
}

async fn async_main(config: MergerConfig) -> anyhow::Result<()> {
    if let Err(err) = start_merger(config).await {
        let source: &(dyn std::error::Error + 'static) = err.as_ref();
        ::sentry::capture_error(source);
        error!("{err:#}");

        return Err(err);
    }

    Ok(())
}
