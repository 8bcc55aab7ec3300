use std::net::TcpListener;
use std::sync::Arc;

use actix_web::{App, HttpResponse, HttpServer, dev::Server, get, web};
use config::shared::{PgConnectionConfig, ProgressStoreConfig};
use etl::aggregator::{EventAggregator, MemoryProgressStore, PostgresProgressStore, ProgressStore};
use etl::dispatch::MergeDispatcher;
use etl::migrations::apply_etl_migrations;
use etl::queue::{JobQueue, PostgresJobQueue, RetryPolicy};
use etl::types::RequiredObjectSet;
use postgres::pool::get_connection_pool;
use telemetry::metrics::init_metrics_handle;
use tracing::info;
use utoipa::OpenApi;

use crate::config::ApiConfig;
use crate::request_logging::RequestLogging;
use crate::routes::{
    ErrorMessage,
    json_error_handler,
    health_check::health_check,
    metrics::metrics,
    webhook::{SyncWebhookRequest, SyncWebhookResponse, sync_webhook},
};

/// Connections shared by the progress store and the job queue.
const MAX_POOL_CONNECTIONS: u32 = 10;

/// Webhook API server wrapper.
pub struct Application {
    port: u16,
    server: Server,
}

impl Application {
    /// Builds the server from `config`, wiring the configured progress store and the
    /// Postgres job queue.
    pub async fn build(config: ApiConfig) -> anyhow::Result<Self> {
        let address = format!("{}:{}", config.application.host, config.application.port);
        let listener = TcpListener::bind(address)?;
        let port = listener.local_addr()?.port();

        let pool = get_connection_pool(&config.queue.connection, MAX_POOL_CONNECTIONS);

        let progress_store: Arc<dyn ProgressStore> = match config.progress_store {
            ProgressStoreConfig::Memory => Arc::new(MemoryProgressStore::new()),
            ProgressStoreConfig::Postgres => Arc::new(PostgresProgressStore::new(pool.clone())),
        };
        let queue: Arc<dyn JobQueue> = Arc::new(PostgresJobQueue::new(
            pool,
            config.queue.lease_duration(),
            RetryPolicy::from(&config.queue.retry),
        ));

        info!(
            progress_store = ?config.progress_store,
            "starting webhook api"
        );

        let server = run(listener, progress_store, queue).await?;

        Ok(Self { port, server })
    }

    /// Applies the `etl` schema migrations of the queue database.
    pub async fn migrate_database(config: PgConnectionConfig) -> anyhow::Result<()> {
        apply_etl_migrations(&config).await?;

        Ok(())
    }

    /// Returns the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Runs the server until it receives a shutdown signal.
    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        self.server.await
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health_check::health_check,
        crate::routes::metrics::metrics,
        crate::routes::webhook::sync_webhook,
    ),
    components(schemas(SyncWebhookRequest, SyncWebhookResponse, ErrorMessage))
)]
struct ApiDoc;

#[get("/api-docs/openapi.json")]
async fn openapi_json() -> HttpResponse {
    HttpResponse::Ok().json(ApiDoc::openapi())
}

/// Creates the HTTP server with all routes and middleware.
///
/// The store and queue are injected so tests can run the server on in-memory backends.
pub async fn run(
    listener: TcpListener,
    progress_store: Arc<dyn ProgressStore>,
    queue: Arc<dyn JobQueue>,
) -> Result<Server, anyhow::Error> {
    let prometheus_handle = web::ThinData(init_metrics_handle()?);

    let aggregator = EventAggregator::new(progress_store, RequiredObjectSet::default());
    let dispatcher = web::Data::new(MergeDispatcher::new(aggregator, queue));

    let server = HttpServer::new(move || {
        App::new()
            .wrap(RequestLogging)
            .wrap(
                sentry::integrations::actix::Sentry::builder()
                    .capture_server_errors(true)
                    .finish(),
            )
            .service(health_check)
            .service(metrics)
            .service(openapi_json)
            .service(sync_webhook)
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .app_data(prometheus_handle.clone())
            .app_data(dispatcher.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
