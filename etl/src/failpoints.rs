use fail::fail_point;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};

/// Fires after the contacts upsert, before any other entity is merged.
pub const MERGE_AFTER_CONTACTS_UPSERT: &str = "merge.after_contacts_upsert";

/// Fires after a job is claimed, before the merge starts.
pub const WORKER_AFTER_CLAIM: &str = "merge_worker.after_claim";

/// Evaluates the failpoint `name`, returning an error when it is configured with `return`.
pub fn etl_fail_point(name: &str) -> EtlResult<()> {
    fail_point!(name, |_| {
        bail!(
            ErrorKind::FailPoint,
            "An error occurred in a fail point",
            format!("The failpoint '{name}' returned an error")
        );
    });

    Ok(())
}
