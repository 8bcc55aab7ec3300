use std::sync::Arc;

use anyhow::Result;
use config::Environment;
use config::shared::SentryConfig;
use secrecy::ExposeSecret;
use tracing::info;

/// Initializes Sentry error tracking for the merger.
///
/// Returns [`None`] when no Sentry configuration is provided.
pub fn init(sentry_config: Option<&SentryConfig>) -> Result<Option<sentry::ClientInitGuard>> {
    let Some(sentry_config) = sentry_config else {
        info!("sentry not configured for merger, skipping initialization");
        return Ok(None);
    };

    info!("initializing sentry with supplied dsn");

    let environment = Environment::load()?;
    let guard = sentry::init(sentry::ClientOptions {
        dsn: Some(sentry_config.dsn.expose_secret().parse()?),
        environment: Some(environment.to_string().into()),
        integrations: vec![Arc::new(
            sentry::integrations::panic::PanicIntegration::new(),
        )],
        attach_stacktrace: true,
        ..Default::default()
    });

    sentry::configure_scope(|scope| {
        scope.set_tag("service", "merger");
    });

    Ok(Some(guard))
}
