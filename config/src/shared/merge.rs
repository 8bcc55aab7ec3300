use serde::Deserialize;

use crate::shared::ValidationError;

/// Schemas read and written by the merge job.
#[derive(Debug, Clone, Deserialize)]
pub struct MergeConfig {
    /// Schema holding the raw synced CRM tables (`crm_contacts`, `crm_opportunities`, ...).
    #[serde(default = "default_staging_schema")]
    pub staging_schema: String,
    /// Schema receiving the normalized `contacts`, `opportunities`, `accounts` and
    /// `entity_accounts` tables.
    #[serde(default = "default_destination_schema")]
    pub destination_schema: String,
}

impl MergeConfig {
    pub const DEFAULT_STAGING_SCHEMA: &'static str = "supaglue";

    pub const DEFAULT_DESTINATION_SCHEMA: &'static str = "public";

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.staging_schema.trim().is_empty() {
            return Err(ValidationError::invalid("staging_schema", "cannot be empty"));
        }

        if self.destination_schema.trim().is_empty() {
            return Err(ValidationError::invalid(
                "destination_schema",
                "cannot be empty",
            ));
        }

        if self.staging_schema == self.destination_schema {
            return Err(ValidationError::invalid(
                "destination_schema",
                "must differ from staging_schema",
            ));
        }

        Ok(())
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            staging_schema: default_staging_schema(),
            destination_schema: default_destination_schema(),
        }
    }
}

fn default_staging_schema() -> String {
    MergeConfig::DEFAULT_STAGING_SCHEMA.to_string()
}

fn default_destination_schema() -> String {
    MergeConfig::DEFAULT_DESTINATION_SCHEMA.to_string()
}
