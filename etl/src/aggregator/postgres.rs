use std::collections::BTreeSet;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::warn;

use crate::aggregator::base::{ProgressStore, RecordOutcome};
use crate::error::EtlResult;
use crate::types::{ObjectKind, RequiredObjectSet};

/// Merges kinds into a connection's progress and returns the resulting set.
///
/// The conflicting row stays locked until the surrounding transaction ends, which
/// serializes concurrent records for the same connection.
const MERGE_PROGRESS_QUERY: &str = r#"
    insert into etl.connection_progress (connection_id, objects)
    values ($1, $2::text[])
    on conflict (connection_id) do update
    set objects = (
            select coalesce(array_agg(distinct object order by object), '{}')
            from unnest(etl.connection_progress.objects || excluded.objects) as object
        ),
        updated_at = now()
    returning objects
"#;

const CLEAR_PROGRESS_QUERY: &str = r#"
    update etl.connection_progress
    set objects = '{}', updated_at = now(), completed_cycles = completed_cycles + 1
    where connection_id = $1
"#;

/// Durable progress store backed by the `etl.connection_progress` table.
#[derive(Debug, Clone)]
pub struct PostgresProgressStore {
    pool: PgPool,
}

impl PostgresProgressStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProgressStore for PostgresProgressStore {
    async fn record_success(
        &self,
        connection_id: &str,
        kind: ObjectKind,
        required: &RequiredObjectSet,
    ) -> EtlResult<RecordOutcome> {
        let mut tx = self.pool.begin().await?;

        let objects: Vec<String> = sqlx::query_scalar(MERGE_PROGRESS_QUERY)
            .bind(connection_id)
            .bind(vec![kind.as_str().to_string()])
            .fetch_one(&mut *tx)
            .await?;
        let synced = parse_object_kinds(connection_id, objects);

        if !required.is_satisfied_by(&synced) {
            tx.commit().await?;
            return Ok(RecordOutcome::Pending(synced));
        }

        sqlx::query(CLEAR_PROGRESS_QUERY)
            .bind(connection_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(RecordOutcome::Completed(synced))
    }

    async fn restore(&self, connection_id: &str, kinds: &BTreeSet<ObjectKind>) -> EtlResult<()> {
        let objects: Vec<String> = kinds.iter().map(|kind| kind.as_str().to_string()).collect();

        sqlx::query(MERGE_PROGRESS_QUERY)
            .bind(connection_id)
            .bind(objects)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn progress(&self, connection_id: &str) -> EtlResult<BTreeSet<ObjectKind>> {
        let objects: Option<Vec<String>> = sqlx::query_scalar(
            "select objects from etl.connection_progress where connection_id = $1",
        )
        .bind(connection_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(parse_object_kinds(
            connection_id,
            objects.unwrap_or_default(),
        ))
    }
}

/// Converts stored kind names, skipping names this build does not know.
fn parse_object_kinds(connection_id: &str, objects: Vec<String>) -> BTreeSet<ObjectKind> {
    objects
        .into_iter()
        .filter_map(|object| match object.parse::<ObjectKind>() {
            Ok(kind) => Some(kind),
            Err(err) => {
                warn!(connection_id, %object, %err, "skipping unknown object kind in stored progress");
                None
            }
        })
        .collect()
}
