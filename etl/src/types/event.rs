use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, EtlError};
use crate::etl_error;

/// CRM object types reported by the sync service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Contact,
    Opportunity,
    Account,
    Lead,
    User,
}

impl ObjectKind {
    pub const ALL: [ObjectKind; 5] = [
        ObjectKind::Contact,
        ObjectKind::Opportunity,
        ObjectKind::Account,
        ObjectKind::Lead,
        ObjectKind::User,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Contact => "contact",
            ObjectKind::Opportunity => "opportunity",
            ObjectKind::Account => "account",
            ObjectKind::Lead => "lead",
            ObjectKind::User => "user",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectKind {
    type Err = EtlError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ObjectKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| {
                etl_error!(
                    ErrorKind::UnknownObjectKind,
                    "Unknown CRM object kind",
                    value
                )
            })
    }
}

/// Outcome of one object sync as reported by the sync service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SyncResult {
    Success,
    Failure,
    /// Any other value. Treated like a failure.
    #[serde(other)]
    Other,
}

impl SyncResult {
    pub fn is_success(&self) -> bool {
        matches!(self, SyncResult::Success)
    }
}

/// A sync completion notification for one object kind of one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEvent {
    pub connection_id: String,
    pub object: ObjectKind,
    pub result: SyncResult,
}

impl SyncEvent {
    pub fn new(connection_id: impl Into<String>, object: ObjectKind, result: SyncResult) -> Self {
        Self {
            connection_id: connection_id.into(),
            object,
            result,
        }
    }

    pub fn success(connection_id: impl Into<String>, object: ObjectKind) -> Self {
        Self::new(connection_id, object, SyncResult::Success)
    }
}

/// Object kinds that must all sync successfully before a merge is dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredObjectSet(BTreeSet<ObjectKind>);

impl RequiredObjectSet {
    pub fn new(kinds: impl IntoIterator<Item = ObjectKind>) -> Self {
        Self(kinds.into_iter().collect())
    }

    pub fn contains(&self, kind: ObjectKind) -> bool {
        self.0.contains(&kind)
    }

    /// Returns the required kinds absent from `synced`, in a stable order.
    pub fn missing_from(&self, synced: &BTreeSet<ObjectKind>) -> Vec<ObjectKind> {
        self.0.difference(synced).copied().collect()
    }

    pub fn is_satisfied_by(&self, synced: &BTreeSet<ObjectKind>) -> bool {
        self.0.is_subset(synced)
    }

    pub fn iter(&self) -> impl Iterator<Item = ObjectKind> + '_ {
        self.0.iter().copied()
    }
}

impl Default for RequiredObjectSet {
    /// The CRM merge needs contacts, opportunities and accounts.
    fn default() -> Self {
        Self::new([
            ObjectKind::Contact,
            ObjectKind::Opportunity,
            ObjectKind::Account,
        ])
    }
}

/// What the aggregator decided for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchDecision {
    /// The event did not change any progress.
    Ignored,
    /// Progress was recorded; these required kinds are still missing.
    Pending { missing: Vec<ObjectKind> },
    /// Every required kind has synced. Progress was cleared and a merge must be enqueued.
    Dispatch,
}
