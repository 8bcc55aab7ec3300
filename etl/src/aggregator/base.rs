use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::error::EtlResult;
use crate::types::{ObjectKind, RequiredObjectSet};

/// Result of recording one successful object sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The required set was covered. The contained kinds were cleared from the store.
    Completed(BTreeSet<ObjectKind>),
    /// The connection's progress after recording, still missing required kinds.
    Pending(BTreeSet<ObjectKind>),
}

/// Storage of the per-connection set of successfully synced object kinds.
///
/// Implementations must add the kind, check it against the required set and clear a
/// completed set as one atomic step, so concurrent deliveries complete a cycle exactly once.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Adds `kind` to the progress of `connection_id` and clears it if it now covers
    /// `required`.
    async fn record_success(
        &self,
        connection_id: &str,
        kind: ObjectKind,
        required: &RequiredObjectSet,
    ) -> EtlResult<RecordOutcome>;

    /// Adds `kinds` back to the progress of `connection_id` without checking completion.
    async fn restore(&self, connection_id: &str, kinds: &BTreeSet<ObjectKind>) -> EtlResult<()>;

    /// Returns the kinds synced since the last dispatch for `connection_id`.
    async fn progress(&self, connection_id: &str) -> EtlResult<BTreeSet<ObjectKind>>;
}
