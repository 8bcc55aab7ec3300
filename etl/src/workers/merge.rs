use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use config::shared::WorkerConfig;
use metrics::counter;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::concurrency::shutdown::ShutdownRx;
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::merge::{MergeEngine, MergeReport};
use crate::metrics::{MERGE_JOBS_DEAD_LETTERED_TOTAL, MERGE_JOBS_RETRIED_TOTAL};
use crate::queue::{ClaimedJob, FailureOutcome, JobQueue};
use crate::workers::policy::build_error_handling_policy;

/// Executes one merge. Implemented by [`MergeEngine`].
#[async_trait]
pub trait MergeRunner: Send + Sync {
    async fn run_merge(&self) -> EtlResult<MergeReport>;
}

#[async_trait]
impl MergeRunner for MergeEngine {
    async fn run_merge(&self) -> EtlResult<MergeReport> {
        MergeEngine::run_merge(self).await
    }
}

/// Claims merge jobs and runs them until shutdown.
///
/// The worker polls the queue every `poll_interval` while it is idle. Shutdown is observed
/// between jobs; a claimed job always runs to completion or failure.
pub struct MergeWorker {
    worker_id: u16,
    queue: Arc<dyn JobQueue>,
    runner: Arc<dyn MergeRunner>,
    poll_interval: Duration,
    shutdown_rx: ShutdownRx,
}

impl MergeWorker {
    pub fn new(
        worker_id: u16,
        queue: Arc<dyn JobQueue>,
        runner: Arc<dyn MergeRunner>,
        poll_interval: Duration,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            worker_id,
            queue,
            runner,
            poll_interval,
            shutdown_rx,
        }
    }

    pub async fn run(mut self) -> EtlResult<()> {
        info!(worker_id = self.worker_id, "starting merge worker");

        loop {
            if self.shutdown_rx.is_shutdown() {
                break;
            }

            let processed = match self.process_next().await {
                Ok(processed) => processed,
                Err(err) => {
                    // Queue errors are transient from the worker's point of view.
                    warn!(worker_id = self.worker_id, %err, "failed to process next merge job");
                    false
                }
            };
            if processed {
                continue;
            }

            tokio::select! {
                _ = self.shutdown_rx.wait() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!(worker_id = self.worker_id, "merge worker shut down");

        Ok(())
    }

    /// Claims and runs one job. Returns `false` when the queue had nothing to claim.
    pub async fn process_next(&self) -> EtlResult<bool> {
        let Some(claimed) = self.queue.claim().await? else {
            return Ok(false);
        };

        debug!(
            worker_id = self.worker_id,
            job_id = %claimed.id,
            attempt = claimed.attempt,
            "claimed merge job"
        );

        let result = self.run_claimed(&claimed).await;
        match result {
            Ok(report) => {
                self.queue.complete(claimed.id).await?;
                info!(
                    worker_id = self.worker_id,
                    job_id = %claimed.id,
                    connection_id = %claimed.job.connection_id,
                    rows_upserted = report.total_rows_upserted(),
                    "merge job completed"
                );
            }
            Err(err) => {
                let policy = build_error_handling_policy(&err);
                let outcome = self
                    .queue
                    .fail(claimed.id, &err.to_string(), policy.retry_directive())
                    .await?;

                match outcome {
                    FailureOutcome::Retrying { attempt, delay } => {
                        counter!(MERGE_JOBS_RETRIED_TOTAL).increment(1);
                        warn!(
                            worker_id = self.worker_id,
                            job_id = %claimed.id,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            %err,
                            "merge job failed, scheduled for retry"
                        );
                    }
                    FailureOutcome::DeadLettered { attempts } => {
                        counter!(MERGE_JOBS_DEAD_LETTERED_TOTAL).increment(1);
                        error!(
                            worker_id = self.worker_id,
                            job_id = %claimed.id,
                            connection_id = %claimed.job.connection_id,
                            attempts,
                            solution = policy.solution(),
                            %err,
                            "merge job dead-lettered"
                        );
                    }
                }
            }
        }

        Ok(true)
    }

    async fn run_claimed(&self, _claimed: &ClaimedJob) -> EtlResult<MergeReport> {
        #[cfg(feature = "failpoints")]
        crate::failpoints::etl_fail_point(crate::failpoints::WORKER_AFTER_CLAIM)?;

        self.runner.run_merge().await
    }
}

/// Set of merge workers sharing one queue and one runner.
pub struct MergeWorkerPool {
    join_set: JoinSet<EtlResult<()>>,
}

impl MergeWorkerPool {
    /// Spawns `config.concurrency` workers.
    pub fn start(
        config: &WorkerConfig,
        queue: Arc<dyn JobQueue>,
        runner: Arc<dyn MergeRunner>,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        let mut join_set = JoinSet::new();
        for worker_id in 0..config.concurrency {
            let worker = MergeWorker::new(
                worker_id,
                queue.clone(),
                runner.clone(),
                config.poll_interval(),
                shutdown_rx.clone(),
            );
            join_set.spawn(worker.run());
        }

        info!(concurrency = config.concurrency, "started merge workers");

        Self { join_set }
    }

    /// Waits for every worker to exit and aggregates their errors.
    pub async fn wait_all(mut self) -> EtlResult<()> {
        let mut errors = Vec::new();

        while let Some(result) = self.join_set.join_next().await {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    error!(%err, "merge worker exited with error");
                    errors.push(err);
                }
                Err(join_err) => {
                    if join_err.is_cancelled() {
                        debug!("merge worker task was cancelled");
                    } else {
                        errors.push(etl_error!(
                            ErrorKind::MergeWorkerPanic,
                            "Merge worker panicked",
                            join_err
                        ));
                    }
                }
            }
        }

        if !errors.is_empty() {
            return Err(errors.into());
        }

        Ok(())
    }
}
