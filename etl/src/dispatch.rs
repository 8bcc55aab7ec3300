use std::sync::Arc;

use metrics::counter;
use tracing::{error, info};

use crate::aggregator::EventAggregator;
use crate::error::EtlResult;
use crate::metrics::{MERGE_DISPATCHES_TOTAL, MERGE_ENQUEUE_FAILURES_TOTAL};
use crate::queue::{JobQueue, MergeJob};
use crate::types::{DispatchDecision, SyncEvent};

/// Feeds events to the [`EventAggregator`] and enqueues a merge job for each
/// [`DispatchDecision::Dispatch`].
///
/// If the enqueue fails, the connection's progress is restored before the error is
/// returned, so the next successful event triggers the dispatch again.
#[derive(Clone)]
pub struct MergeDispatcher {
    aggregator: EventAggregator,
    queue: Arc<dyn JobQueue>,
}

impl MergeDispatcher {
    pub fn new(aggregator: EventAggregator, queue: Arc<dyn JobQueue>) -> Self {
        Self { aggregator, queue }
    }

    pub fn aggregator(&self) -> &EventAggregator {
        &self.aggregator
    }

    pub async fn handle_event(&self, event: &SyncEvent) -> EtlResult<DispatchDecision> {
        let decision = self.aggregator.record(event).await?;
        if decision != DispatchDecision::Dispatch {
            return Ok(decision);
        }

        match self.queue.enqueue(MergeJob::new(&event.connection_id)).await {
            Ok(handle) => {
                counter!(MERGE_DISPATCHES_TOTAL).increment(1);
                info!(
                    connection_id = %event.connection_id,
                    job_id = %handle.id,
                    "dispatched merge job"
                );

                Ok(decision)
            }
            Err(err) => {
                counter!(MERGE_ENQUEUE_FAILURES_TOTAL).increment(1);
                error!(
                    connection_id = %event.connection_id,
                    %err,
                    "failed to enqueue merge job, restoring sync progress"
                );

                if let Err(restore_err) = self.aggregator.restore(&event.connection_id).await {
                    error!(
                        connection_id = %event.connection_id,
                        %restore_err,
                        "failed to restore sync progress"
                    );

                    return Err(vec![err, restore_err].into());
                }

                Err(err)
            }
        }
    }
}
