//! Transactional merge of the staging tables into the destination tables.
//!
//! A run executes, inside one transaction:
//! 1. An advisory lock so concurrent runs queue instead of interleaving
//! 2. Creation of the destination schema and tables when missing
//! 3. One upsert per entity, in plan order
//! 4. One insert-only statement per association
//!
//! Any error rolls the whole run back.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, error, info};

use crate::error::EtlResult;
use crate::merge::plan::MergePlan;
use crate::merge::sql;
use crate::metrics::{
    ERROR_KIND_LABEL, MERGE_DURATION_SECONDS, MERGE_ROWS_UPSERTED_TOTAL, MERGE_RUNS_TOTAL,
    OUTCOME_LABEL, TABLE_LABEL,
};

/// Key of the transaction-scoped advisory lock held by every merge run.
pub const MERGE_LOCK_KEY: i64 = 0x6d65_7267_6500;

/// Rows written by one successful merge run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Rows inserted or updated per destination table.
    pub rows_upserted: BTreeMap<String, u64>,
    /// New association rows per entity type.
    pub associations_inserted: BTreeMap<String, u64>,
    pub duration: Duration,
}

impl MergeReport {
    pub fn total_rows_upserted(&self) -> u64 {
        self.rows_upserted.values().sum()
    }
}

/// Runs a [`MergePlan`] against a Postgres pool.
#[derive(Debug, Clone)]
pub struct MergeEngine {
    pool: PgPool,
    plan: MergePlan,
}

impl MergeEngine {
    pub fn new(pool: PgPool, plan: MergePlan) -> Self {
        Self { pool, plan }
    }

    pub fn plan(&self) -> &MergePlan {
        &self.plan
    }

    /// Merges all staging data. Idempotent: running it twice over the same staging data
    /// leaves every destination row untouched, `merged_at` included.
    pub async fn run_merge(&self) -> EtlResult<MergeReport> {
        let start = Instant::now();
        info!(
            destination_schema = %self.plan.destination_schema,
            "starting merge"
        );

        match self.merge_in_transaction().await {
            Ok(mut report) => {
                report.duration = start.elapsed();

                counter!(MERGE_RUNS_TOTAL, OUTCOME_LABEL => "success").increment(1);
                histogram!(MERGE_DURATION_SECONDS).record(report.duration.as_secs_f64());
                for (table, rows) in &report.rows_upserted {
                    counter!(MERGE_ROWS_UPSERTED_TOTAL, TABLE_LABEL => table.clone())
                        .increment(*rows);
                }

                info!(
                    duration_ms = report.duration.as_millis() as u64,
                    rows_upserted = report.total_rows_upserted(),
                    "merge completed"
                );

                Ok(report)
            }
            Err(err) => {
                counter!(
                    MERGE_RUNS_TOTAL,
                    OUTCOME_LABEL => "failure",
                    ERROR_KIND_LABEL => format!("{:?}", err.kind())
                )
                .increment(1);
                error!(%err, "merge failed, transaction rolled back");

                Err(err)
            }
        }
    }

    async fn merge_in_transaction(&self) -> EtlResult<MergeReport> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("select pg_advisory_xact_lock($1)")
            .bind(MERGE_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        self.ensure_destination(&mut tx).await?;

        let mut report = MergeReport::default();

        for entity in &self.plan.entities {
            let result = sqlx::query(&sql::upsert_entity(entity))
                .execute(&mut *tx)
                .await
                .inspect_err(|err| {
                    error!(staging_table = %entity.staging_table, %err, "entity upsert failed")
                })?;

            debug!(
                table = %entity.destination_table,
                rows = result.rows_affected(),
                "upserted entity rows"
            );
            report
                .rows_upserted
                .insert(entity.destination_table.name.clone(), result.rows_affected());

            #[cfg(feature = "failpoints")]
            if entity.destination_table.name == "contacts" {
                crate::failpoints::etl_fail_point(
                    crate::failpoints::MERGE_AFTER_CONTACTS_UPSERT,
                )?;
            }
        }

        for association in &self.plan.associations {
            let result = sqlx::query(&sql::insert_associations(association))
                .bind(&association.entity_type)
                .execute(&mut *tx)
                .await
                .inspect_err(|err| {
                    error!(
                        entity_type = %association.entity_type,
                        %err,
                        "association insert failed"
                    )
                })?;

            debug!(
                entity_type = %association.entity_type,
                rows = result.rows_affected(),
                "inserted associations"
            );
            report
                .associations_inserted
                .insert(association.entity_type.clone(), result.rows_affected());
        }

        tx.commit().await?;

        Ok(report)
    }

    async fn ensure_destination(&self, tx: &mut Transaction<'_, Postgres>) -> EtlResult<()> {
        sqlx::query(&sql::create_schema(&self.plan.destination_schema))
            .execute(&mut **tx)
            .await?;

        for entity in &self.plan.entities {
            sqlx::query(&sql::create_entity_table(entity))
                .execute(&mut **tx)
                .await?;
        }

        let mut association_tables: Vec<_> = self
            .plan
            .associations
            .iter()
            .map(|association| &association.destination_table)
            .collect();
        association_tables.dedup();
        for table in association_tables {
            sqlx::query(&sql::create_association_table(table))
                .execute(&mut **tx)
                .await?;
        }

        Ok(())
    }
}
