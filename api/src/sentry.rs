use std::sync::Arc;

use anyhow::Result;
use api::config::ApiConfig;
use config::{Environment, load_config};
use secrecy::ExposeSecret;
use tracing::info;

/// Initializes Sentry error tracking for the API.
///
/// Returns [`None`] when no Sentry configuration is provided.
pub fn init() -> Result<Option<sentry::ClientInitGuard>> {
    let sentry_config = load_config::<ApiConfig>()
        .ok()
        .and_then(|config| config.sentry);

    let Some(sentry_config) = sentry_config else {
        info!("sentry not configured for api, skipping initialization");
        return Ok(None);
    };

    info!("initializing sentry with supplied dsn");

    let environment = Environment::load()?;
    let guard = sentry::init(sentry::ClientOptions {
        dsn: Some(sentry_config.dsn.expose_secret().parse()?),
        environment: Some(environment.to_string().into()),
        traces_sampler: Some(Arc::new(|ctx: &sentry::TransactionContext| {
            sample_trace_rate(ctx)
        })),
        integrations: vec![Arc::new(
            sentry::integrations::panic::PanicIntegration::new(),
        )],
        attach_stacktrace: true,
        ..Default::default()
    });

    sentry::configure_scope(|scope| {
        scope.set_tag("service", "api");
    });

    Ok(Some(guard))
}

/// Webhook traffic is sampled more than the probe endpoints.
fn sample_trace_rate(ctx: &sentry::TransactionContext) -> f32 {
    match ctx.name().split_once(' ').map(|(_, path)| path) {
        Some("/metrics") | Some("/health_check") => 0.001,
        _ => 0.01,
    }
}
