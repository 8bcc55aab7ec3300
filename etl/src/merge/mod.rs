//! Merge of CRM staging tables into the destination tables.

mod engine;
mod plan;
pub mod sql;

pub use engine::{MERGE_LOCK_KEY, MergeEngine, MergeReport};
pub use plan::{
    AssociationSpec, ColumnMapping, EMITTED_AT_COLUMN, EntityMergeSpec, MergePlan, SourceExpr,
};
