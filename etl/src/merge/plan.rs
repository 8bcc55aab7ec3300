use config::shared::MergeConfig;
use postgres::schema::TableName;

/// Column of the staging table used as the deduplication order; the latest row wins.
pub const EMITTED_AT_COLUMN: &str = "_supaglue_emitted_at";

/// Where the value of a destination column comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceExpr {
    /// A staging column, taken as is.
    Column(String),
    /// A field of the first element of a JSON array column, for example the first email
    /// address of a contact.
    FirstArrayElementField { column: String, field: String },
}

/// One destination column and how it is filled from staging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pub name: String,
    /// Postgres type of the destination column; staging values are cast to it.
    pub sql_type: String,
    pub source: SourceExpr,
    /// Part of the `(source_id, customer_id)` conflict key.
    pub key: bool,
}

impl ColumnMapping {
    pub fn key(name: &str, source_column: &str) -> Self {
        Self {
            name: name.to_string(),
            sql_type: "text".to_string(),
            source: SourceExpr::Column(source_column.to_string()),
            key: true,
        }
    }

    pub fn column(name: &str, sql_type: &str, source_column: &str) -> Self {
        Self {
            name: name.to_string(),
            sql_type: sql_type.to_string(),
            source: SourceExpr::Column(source_column.to_string()),
            key: false,
        }
    }

    pub fn first_element(name: &str, source_column: &str, field: &str) -> Self {
        Self {
            name: name.to_string(),
            sql_type: "text".to_string(),
            source: SourceExpr::FirstArrayElementField {
                column: source_column.to_string(),
                field: field.to_string(),
            },
            key: false,
        }
    }
}

/// Upsert of one staging table into one destination table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMergeSpec {
    pub staging_table: TableName,
    pub destination_table: TableName,
    /// Staging column ordering duplicates of one key; the greatest value wins.
    pub dedupe_column: String,
    pub columns: Vec<ColumnMapping>,
}

impl EntityMergeSpec {
    pub fn key_columns(&self) -> impl Iterator<Item = &ColumnMapping> {
        self.columns.iter().filter(|column| column.key)
    }

    pub fn value_columns(&self) -> impl Iterator<Item = &ColumnMapping> {
        self.columns.iter().filter(|column| !column.key)
    }
}

/// Insert-only association of staging entities with their account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationSpec {
    /// Literal stored in `entity_type`, for example `contact`.
    pub entity_type: String,
    pub staging_table: TableName,
    pub destination_table: TableName,
    pub entity_id_column: String,
    /// Staging rows where this column is null are skipped.
    pub account_id_column: String,
    pub customer_id_column: String,
    pub application_id_column: String,
}

/// Everything a merge run writes, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePlan {
    pub destination_schema: String,
    pub entities: Vec<EntityMergeSpec>,
    pub associations: Vec<AssociationSpec>,
}

impl MergePlan {
    /// Plan for the CRM staging tables written by the sync service.
    pub fn crm(config: &MergeConfig) -> Self {
        let staging = |name: &str| TableName::new(config.staging_schema.as_str(), name);
        let destination = |name: &str| TableName::new(config.destination_schema.as_str(), name);

        let contacts = EntityMergeSpec {
            staging_table: staging("crm_contacts"),
            destination_table: destination("contacts"),
            dedupe_column: EMITTED_AT_COLUMN.to_string(),
            columns: with_common_columns(vec![
                ColumnMapping::column("first_name", "text", "first_name"),
                ColumnMapping::column("last_name", "text", "last_name"),
                ColumnMapping::first_element("email", "email_addresses", "email_address"),
                ColumnMapping::first_element("phone", "phone_numbers", "phone_number"),
                ColumnMapping::column("source_account_id", "text", "account_id"),
            ]),
        };

        let opportunities = EntityMergeSpec {
            staging_table: staging("crm_opportunities"),
            destination_table: destination("opportunities"),
            dedupe_column: EMITTED_AT_COLUMN.to_string(),
            columns: with_common_columns(vec![
                ColumnMapping::column("name", "text", "name"),
                ColumnMapping::column("description", "text", "description"),
                ColumnMapping::column("amount", "numeric", "amount"),
                ColumnMapping::column("stage", "text", "stage"),
                ColumnMapping::column("status", "text", "status"),
                ColumnMapping::column("close_date", "timestamptz", "close_date"),
                ColumnMapping::column("source_account_id", "text", "account_id"),
            ]),
        };

        let accounts = EntityMergeSpec {
            staging_table: staging("crm_accounts"),
            destination_table: destination("accounts"),
            dedupe_column: EMITTED_AT_COLUMN.to_string(),
            columns: with_common_columns(vec![
                ColumnMapping::column("name", "text", "name"),
                ColumnMapping::column("description", "text", "description"),
                ColumnMapping::column("industry", "text", "industry"),
                ColumnMapping::column("website", "text", "website"),
                ColumnMapping::column("number_of_employees", "integer", "number_of_employees"),
            ]),
        };

        let association = |entity_type: &str, staging_table: &TableName| AssociationSpec {
            entity_type: entity_type.to_string(),
            staging_table: staging_table.clone(),
            destination_table: destination("entity_accounts"),
            entity_id_column: "id".to_string(),
            account_id_column: "account_id".to_string(),
            customer_id_column: "_supaglue_customer_id".to_string(),
            application_id_column: "_supaglue_application_id".to_string(),
        };
        let associations = vec![
            association("contact", &contacts.staging_table),
            association("opportunity", &opportunities.staging_table),
        ];

        Self {
            destination_schema: config.destination_schema.clone(),
            entities: vec![contacts, opportunities, accounts],
            associations,
        }
    }
}

fn with_common_columns(entity_columns: Vec<ColumnMapping>) -> Vec<ColumnMapping> {
    let mut columns = vec![
        ColumnMapping::key("source_id", "id"),
        ColumnMapping::key("customer_id", "_supaglue_customer_id"),
        ColumnMapping::column("application_id", "text", "_supaglue_application_id"),
        ColumnMapping::column("provider_name", "text", "_supaglue_provider_name"),
    ];
    columns.extend(entity_columns);
    columns.push(ColumnMapping::column("source_created_at", "timestamptz", "created_at"));
    columns.push(ColumnMapping::column("source_updated_at", "timestamptz", "updated_at"));

    columns
}
