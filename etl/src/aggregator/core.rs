use std::collections::BTreeSet;
use std::sync::Arc;

use metrics::counter;
use tracing::{debug, info};

use crate::aggregator::base::{ProgressStore, RecordOutcome};
use crate::error::EtlResult;
use crate::metrics::{OBJECT_LABEL, OUTCOME_LABEL, SYNC_EVENTS_TOTAL};
use crate::types::{DispatchDecision, ObjectKind, RequiredObjectSet, SyncEvent};

/// Turns a stream of sync events into merge dispatch decisions.
///
/// Only successful events change progress. Once every kind of the [`RequiredObjectSet`]
/// synced for a connection, in any order, the progress is cleared and the event yields
/// [`DispatchDecision::Dispatch`].
#[derive(Clone)]
pub struct EventAggregator {
    store: Arc<dyn ProgressStore>,
    required: RequiredObjectSet,
}

impl EventAggregator {
    pub fn new(store: Arc<dyn ProgressStore>, required: RequiredObjectSet) -> Self {
        Self { store, required }
    }

    pub fn required(&self) -> &RequiredObjectSet {
        &self.required
    }

    pub async fn record(&self, event: &SyncEvent) -> EtlResult<DispatchDecision> {
        if !event.result.is_success() {
            debug!(
                connection_id = %event.connection_id,
                object = %event.object,
                result = ?event.result,
                "ignoring unsuccessful sync event"
            );
            counter!(
                SYNC_EVENTS_TOTAL,
                OBJECT_LABEL => event.object.as_str(),
                OUTCOME_LABEL => "ignored"
            )
            .increment(1);

            return Ok(DispatchDecision::Ignored);
        }

        let outcome = self
            .store
            .record_success(&event.connection_id, event.object, &self.required)
            .await?;

        let decision = match outcome {
            RecordOutcome::Completed(synced) => {
                info!(
                    connection_id = %event.connection_id,
                    synced = ?synced,
                    "all required objects synced"
                );

                DispatchDecision::Dispatch
            }
            RecordOutcome::Pending(synced) => {
                let missing = self.required.missing_from(&synced);
                debug!(
                    connection_id = %event.connection_id,
                    object = %event.object,
                    missing = ?missing,
                    "recorded sync progress"
                );

                DispatchDecision::Pending { missing }
            }
        };

        let outcome_label = match decision {
            DispatchDecision::Dispatch => "dispatch",
            _ => "pending",
        };
        counter!(
            SYNC_EVENTS_TOTAL,
            OBJECT_LABEL => event.object.as_str(),
            OUTCOME_LABEL => outcome_label
        )
        .increment(1);

        Ok(decision)
    }

    /// Puts the required kinds back for `connection_id` after a dispatch could not be
    /// delivered, so the next successful event completes the cycle again.
    pub async fn restore(&self, connection_id: &str) -> EtlResult<()> {
        let kinds: BTreeSet<_> = self.required.iter().collect();

        self.store.restore(connection_id, &kinds).await
    }

    /// Returns the kinds synced since the last dispatch for `connection_id`.
    pub async fn progress(&self, connection_id: &str) -> EtlResult<BTreeSet<ObjectKind>> {
        self.store.progress(connection_id).await
    }
}
