use sqlx::PgPool;

/// Schema of the staging tables created by [`create_staging_tables`].
pub const STAGING_SCHEMA: &str = "supaglue";

const STAGING_TABLES: &str = r#"
    create schema if not exists supaglue;

    create table supaglue.crm_contacts (
        _supaglue_application_id text not null,
        _supaglue_provider_name text not null,
        _supaglue_customer_id text not null,
        _supaglue_emitted_at timestamptz not null,
        id text not null,
        first_name text,
        last_name text,
        email_addresses jsonb,
        phone_numbers jsonb,
        account_id text,
        created_at timestamptz,
        updated_at timestamptz
    );

    create table supaglue.crm_opportunities (
        _supaglue_application_id text not null,
        _supaglue_provider_name text not null,
        _supaglue_customer_id text not null,
        _supaglue_emitted_at timestamptz not null,
        id text not null,
        name text,
        description text,
        amount numeric,
        stage text,
        status text,
        close_date timestamptz,
        account_id text,
        created_at timestamptz,
        updated_at timestamptz
    );

    create table supaglue.crm_accounts (
        _supaglue_application_id text not null,
        _supaglue_provider_name text not null,
        _supaglue_customer_id text not null,
        _supaglue_emitted_at timestamptz not null,
        id text not null,
        name text,
        description text,
        industry text,
        website text,
        number_of_employees integer,
        created_at timestamptz,
        updated_at timestamptz
    );
"#;

pub const TEST_APPLICATION_ID: &str = "app-1";

pub const TEST_PROVIDER_NAME: &str = "salesforce";

/// Creates the `supaglue` staging tables the CRM merge plan reads from.
pub async fn create_staging_tables(pool: &PgPool) {
    sqlx::raw_sql(STAGING_TABLES)
        .execute(pool)
        .await
        .expect("Failed to create staging tables");
}

/// A staged contact. `emitted_secs_ago` orders duplicates; smaller is newer.
#[derive(Debug, Clone)]
pub struct StagedContact {
    pub id: &'static str,
    pub customer_id: &'static str,
    pub first_name: &'static str,
    pub email: Option<&'static str>,
    pub phone: Option<&'static str>,
    pub account_id: Option<&'static str>,
    pub emitted_secs_ago: f64,
}

impl StagedContact {
    pub fn new(id: &'static str, customer_id: &'static str, first_name: &'static str) -> Self {
        Self {
            id,
            customer_id,
            first_name,
            email: None,
            phone: None,
            account_id: None,
            emitted_secs_ago: 0.0,
        }
    }
}

pub async fn insert_contact(pool: &PgPool, contact: &StagedContact) {
    let email_addresses = contact.email.map(|email| {
        serde_json::json!([{ "email_address": email, "email_address_type": "primary" }])
    });
    let phone_numbers = match contact.phone {
        Some(phone) => {
            serde_json::json!([{ "phone_number": phone, "phone_number_type": "mobile" }])
        }
        None => serde_json::json!([]),
    };

    sqlx::query(
        r#"
        insert into supaglue.crm_contacts (
            _supaglue_application_id, _supaglue_provider_name, _supaglue_customer_id,
            _supaglue_emitted_at, id, first_name, email_addresses, phone_numbers, account_id,
            created_at, updated_at
        )
        values (
            $1, $2, $3, now() - make_interval(secs => $4), $5, $6, $7, $8, $9,
            now(), now()
        )
        "#,
    )
    .bind(TEST_APPLICATION_ID)
    .bind(TEST_PROVIDER_NAME)
    .bind(contact.customer_id)
    .bind(contact.emitted_secs_ago)
    .bind(contact.id)
    .bind(contact.first_name)
    .bind(email_addresses)
    .bind(phone_numbers)
    .bind(contact.account_id)
    .execute(pool)
    .await
    .expect("Failed to insert staged contact");
}

pub async fn insert_opportunity(
    pool: &PgPool,
    id: &str,
    customer_id: &str,
    name: &str,
    account_id: Option<&str>,
) {
    sqlx::query(
        r#"
        insert into supaglue.crm_opportunities (
            _supaglue_application_id, _supaglue_provider_name, _supaglue_customer_id,
            _supaglue_emitted_at, id, name, amount, stage, account_id
        )
        values ($1, $2, $3, now(), $4, $5, 1000, 'prospecting', $6)
        "#,
    )
    .bind(TEST_APPLICATION_ID)
    .bind(TEST_PROVIDER_NAME)
    .bind(customer_id)
    .bind(id)
    .bind(name)
    .bind(account_id)
    .execute(pool)
    .await
    .expect("Failed to insert staged opportunity");
}

pub async fn insert_account(pool: &PgPool, id: &str, customer_id: &str, name: &str) {
    sqlx::query(
        r#"
        insert into supaglue.crm_accounts (
            _supaglue_application_id, _supaglue_provider_name, _supaglue_customer_id,
            _supaglue_emitted_at, id, name, number_of_employees
        )
        values ($1, $2, $3, now(), $4, $5, 42)
        "#,
    )
    .bind(TEST_APPLICATION_ID)
    .bind(TEST_PROVIDER_NAME)
    .bind(customer_id)
    .bind(id)
    .bind(name)
    .execute(pool)
    .await
    .expect("Failed to insert staged account");
}

/// Mapped columns of a destination contact.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct DestinationContact {
    pub source_id: String,
    pub customer_id: String,
    pub first_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Returns every destination contact ordered by key.
pub async fn destination_contacts(pool: &PgPool) -> Vec<DestinationContact> {
    sqlx::query_as(
        "select source_id, customer_id, first_name, email, phone \
         from public.contacts order by source_id, customer_id",
    )
    .fetch_all(pool)
    .await
    .expect("Failed to read destination contacts")
}

/// Returns every row of `table`, all columns included, as JSON text in a stable order.
pub async fn table_snapshot(pool: &PgPool, table: &str) -> Vec<String> {
    sqlx::query_scalar(&format!(
        "select to_jsonb(t)::text from {table} as t order by 1"
    ))
    .fetch_all(pool)
    .await
    .expect("Failed to snapshot table")
}

/// Returns `(entity_id, account_id, entity_type)` of every association.
pub async fn destination_associations(pool: &PgPool) -> Vec<(String, String, String)> {
    sqlx::query_as(
        "select entity_id, account_id, entity_type from public.entity_accounts order by 3, 1",
    )
    .fetch_all(pool)
    .await
    .expect("Failed to read associations")
}

pub async fn count_rows(pool: &PgPool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("select count(*) from {table}"))
        .fetch_one(pool)
        .await
        .expect("Failed to count rows")
}
