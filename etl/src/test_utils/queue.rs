use async_trait::async_trait;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::queue::{ClaimedJob, FailureOutcome, JobHandle, JobId, JobQueue, MergeJob, QueueStats};
use crate::workers::policy::RetryDirective;

/// Queue whose every operation fails, used to exercise enqueue failure handling.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingJobQueue;

#[async_trait]
impl JobQueue for FailingJobQueue {
    async fn enqueue(&self, _job: MergeJob) -> EtlResult<JobHandle> {
        bail!(ErrorKind::QueueError, "Queue is unavailable");
    }

    async fn claim(&self) -> EtlResult<Option<ClaimedJob>> {
        bail!(ErrorKind::QueueError, "Queue is unavailable");
    }

    async fn complete(&self, _id: JobId) -> EtlResult<()> {
        bail!(ErrorKind::QueueError, "Queue is unavailable");
    }

    async fn fail(
        &self,
        _id: JobId,
        _error: &str,
        _directive: RetryDirective,
    ) -> EtlResult<FailureOutcome> {
        bail!(ErrorKind::QueueError, "Queue is unavailable");
    }

    async fn stats(&self) -> EtlResult<QueueStats> {
        bail!(ErrorKind::QueueError, "Queue is unavailable");
    }
}
