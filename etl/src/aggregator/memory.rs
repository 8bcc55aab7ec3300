use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::aggregator::base::{ProgressStore, RecordOutcome};
use crate::error::EtlResult;
use crate::types::{ObjectKind, RequiredObjectSet};

#[derive(Debug, Default)]
struct Inner {
    progress: HashMap<String, BTreeSet<ObjectKind>>,
}

/// Process-local progress store.
///
/// Progress is lost when the process exits and is not shared between replicas.
#[derive(Debug, Clone, Default)]
pub struct MemoryProgressStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn record_success(
        &self,
        connection_id: &str,
        kind: ObjectKind,
        required: &RequiredObjectSet,
    ) -> EtlResult<RecordOutcome> {
        let mut inner = self.inner.lock().await;

        let synced = inner
            .progress
            .entry(connection_id.to_string())
            .or_default();
        synced.insert(kind);

        if required.is_satisfied_by(synced) {
            return Ok(RecordOutcome::Completed(std::mem::take(synced)));
        }

        Ok(RecordOutcome::Pending(synced.clone()))
    }

    async fn restore(&self, connection_id: &str, kinds: &BTreeSet<ObjectKind>) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;

        inner
            .progress
            .entry(connection_id.to_string())
            .or_default()
            .extend(kinds.iter().copied());

        Ok(())
    }

    async fn progress(&self, connection_id: &str) -> EtlResult<BTreeSet<ObjectKind>> {
        let inner = self.inner.lock().await;

        Ok(inner
            .progress
            .get(connection_id)
            .cloned()
            .unwrap_or_default())
    }
}
