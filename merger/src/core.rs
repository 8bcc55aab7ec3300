use std::sync::Arc;

use anyhow::Context;
use etl::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use etl::merge::{MergeEngine, MergePlan};
use etl::migrations::apply_etl_migrations;
use etl::queue::{JobQueue, PostgresJobQueue, RetryPolicy};
use etl::workers::merge::{MergeRunner, MergeWorkerPool};
use postgres::pool::connect_pool;
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::MergerConfig;

/// Connections of the queue pool. Every worker holds at most one while claiming or
/// acknowledging a job.
const QUEUE_POOL_EXTRA_CONNECTIONS: u32 = 2;

/// Connections of the destination pool. A merge runs in a single transaction.
const DESTINATION_POOL_EXTRA_CONNECTIONS: u32 = 1;

/// Runs the merge workers until SIGTERM or SIGINT is received and every worker exited.
pub async fn start_merger(config: MergerConfig) -> anyhow::Result<()> {
    info!(
        concurrency = config.worker.concurrency,
        staging_schema = %config.merge.staging_schema,
        destination_schema = %config.merge.destination_schema,
        "starting merger"
    );

    apply_etl_migrations(&config.queue.connection)
        .await
        .context("applying queue migrations")?;

    let concurrency = u32::from(config.worker.concurrency);
    let queue_pool = connect_pool(
        &config.queue.connection,
        concurrency + QUEUE_POOL_EXTRA_CONNECTIONS,
    )
    .await
    .context("connecting to the queue database")?;
    let destination_pool = connect_pool(
        &config.destination,
        concurrency + DESTINATION_POOL_EXTRA_CONNECTIONS,
    )
    .await
    .context("connecting to the destination database")?;

    let queue: Arc<dyn JobQueue> = Arc::new(PostgresJobQueue::new(
        queue_pool,
        config.queue.lease_duration(),
        RetryPolicy::from(&config.queue.retry),
    ));
    let engine: Arc<dyn MergeRunner> = Arc::new(MergeEngine::new(
        destination_pool,
        MergePlan::crm(&config.merge),
    ));

    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let pool = MergeWorkerPool::start(&config.worker, queue, engine, shutdown_rx);

    let shutdown_handle = spawn_shutdown_listener(shutdown_tx);

    let result = pool.wait_all().await;

    // Workers can only stop on their own through an error, in which case the listener
    // is still waiting for a signal.
    shutdown_handle.abort();
    let _ = shutdown_handle.await;

    result?;

    info!("merger stopped");

    Ok(())
}

fn spawn_shutdown_listener(shutdown_tx: ShutdownTx) -> JoinHandle<()> {
    tokio::spawn(async move {
        // Jobs claimed when the process is killed are redelivered once their lease
        // expires, so a missed SIGTERM only delays the merge.
        wait_for_signal().await;

        shutdown_tx.shutdown();
    })
}

/// Completes on SIGINT or SIGTERM. A handler that cannot be installed never fires, so the
/// shutdown sender stays alive until the listener task is aborted.
async fn wait_for_signal() {
    let sigterm = signal(SignalKind::terminate())
        .inspect_err(|err| warn!(%err, "failed to register SIGTERM handler"))
        .ok();

    let sigterm = async move {
        match sigterm {
            Some(mut sigterm) => {
                sigterm.recv().await;
            }
            None => std::future::pending::<()>().await,
        }
    };
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(%err, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = ctrl_c => {
            info!("SIGINT (Ctrl+C) received, shutting down merger");
        }
        _ = sigterm => {
            info!("SIGTERM received, shutting down merger");
        }
    }
}
