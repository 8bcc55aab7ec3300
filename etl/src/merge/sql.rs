//! SQL generation for a [`MergePlan`](crate::merge::MergePlan).
//!
//! Identifiers come from the plan and are quoted; the only runtime value, the association
//! `entity_type`, is bound as a parameter.

use postgres::schema::{TableName, quote_ident};

use crate::merge::plan::{AssociationSpec, ColumnMapping, EntityMergeSpec, SourceExpr};

/// Bookkeeping column set when a row is inserted or one of its values changes.
pub const MERGED_AT_COLUMN: &str = "merged_at";

/// Alias of the destination table in upserts, used to compare stored and staged values.
const TARGET_ALIAS: &str = "target";

const ASSOCIATION_COLUMNS: [&str; 5] = [
    "entity_id",
    "account_id",
    "entity_type",
    "customer_id",
    "application_id",
];

pub fn create_schema(schema: &str) -> String {
    format!("create schema if not exists {}", quote_ident(schema))
}

pub fn create_entity_table(spec: &EntityMergeSpec) -> String {
    let mut definitions: Vec<String> = spec
        .columns
        .iter()
        .map(|column| {
            let null = if column.key { " not null" } else { "" };
            format!("{} {}{null}", quote_ident(&column.name), column.sql_type)
        })
        .collect();
    definitions.push(format!(
        "{} timestamptz not null default now()",
        quote_ident(MERGED_AT_COLUMN)
    ));
    definitions.push(format!(
        "primary key ({})",
        join_idents(spec.key_columns().map(|column| column.name.as_str()))
    ));

    format!(
        "create table if not exists {} ({})",
        spec.destination_table.as_quoted_identifier(),
        definitions.join(", ")
    )
}

pub fn create_association_table(table: &TableName) -> String {
    let definitions: Vec<String> = ASSOCIATION_COLUMNS
        .iter()
        .map(|column| format!("{} text not null", quote_ident(column)))
        .collect();

    format!(
        "create table if not exists {} ({}, primary key ({}))",
        table.as_quoted_identifier(),
        definitions.join(", "),
        join_idents(ASSOCIATION_COLUMNS.iter().copied())
    )
}

/// Upserts the latest staging row per key and overwrites every non-key column on conflict.
///
/// `distinct on` keeps one row per key so the statement never updates a row twice. Rows
/// whose values already match the staged ones are left untouched, so `merged_at` and the
/// affected row count only move when data changed.
pub fn upsert_entity(spec: &EntityMergeSpec) -> String {
    let key_expressions: Vec<String> = spec.key_columns().map(select_expression).collect();
    let projections: Vec<String> = spec
        .columns
        .iter()
        .map(|column| format!("{} as {}", select_expression(column), quote_ident(&column.name)))
        .collect();

    let column_names = spec.columns.iter().map(|column| column.name.as_str());
    let insert_columns = join_idents(column_names.clone().chain([MERGED_AT_COLUMN]));
    let staged_columns = join_idents(column_names);

    let value_columns: Vec<String> = spec
        .value_columns()
        .map(|column| quote_ident(&column.name))
        .collect();
    let on_conflict = if value_columns.is_empty() {
        "do nothing".to_string()
    } else {
        let updates: Vec<String> = value_columns
            .iter()
            .map(String::as_str)
            .chain([MERGED_AT_COLUMN])
            .map(|name| format!("{name} = excluded.{name}"))
            .collect();
        let qualified = |table: &str| {
            value_columns
                .iter()
                .map(|name| format!("{table}.{name}"))
                .collect::<Vec<_>>()
                .join(", ")
        };

        format!(
            "do update set {updates} where ({stored}) is distinct from ({staged})",
            updates = updates.join(", "),
            stored = qualified(TARGET_ALIAS),
            staged = qualified("excluded"),
        )
    };

    format!(
        "insert into {destination} as {TARGET_ALIAS} ({insert_columns}) \
         select {staged_columns}, now() from (\
         select distinct on ({keys}) {projections} \
         from {staging} \
         order by {keys}, {dedupe} desc nulls last\
         ) as staged \
         on conflict ({conflict}) {on_conflict}",
        destination = spec.destination_table.as_quoted_identifier(),
        keys = key_expressions.join(", "),
        projections = projections.join(", "),
        staging = spec.staging_table.as_quoted_identifier(),
        dedupe = quote_ident(&spec.dedupe_column),
        conflict = join_idents(spec.key_columns().map(|column| column.name.as_str())),
    )
}

/// Inserts `(entity, account)` pairs for staging rows with an account; existing pairs are
/// left untouched. Binds the entity type as `$1`.
pub fn insert_associations(spec: &AssociationSpec) -> String {
    let text = |column: &str| format!("cast({} as text)", quote_ident(column));

    format!(
        "insert into {destination} ({columns}) \
         select distinct {entity_id}, {account_id}, $1, {customer_id}, {application_id} \
         from {staging} \
         where {account_column} is not null \
         on conflict do nothing",
        destination = spec.destination_table.as_quoted_identifier(),
        columns = join_idents(ASSOCIATION_COLUMNS.iter().copied()),
        entity_id = text(&spec.entity_id_column),
        account_id = text(&spec.account_id_column),
        customer_id = text(&spec.customer_id_column),
        application_id = text(&spec.application_id_column),
        staging = spec.staging_table.as_quoted_identifier(),
        account_column = quote_ident(&spec.account_id_column),
    )
}

fn select_expression(column: &ColumnMapping) -> String {
    let value = match &column.source {
        SourceExpr::Column(name) => quote_ident(name),
        SourceExpr::FirstArrayElementField { column, field } => {
            format!("({} -> 0 ->> '{}')", quote_ident(column), field.replace('\'', "''"))
        }
    };

    format!("cast({value} as {})", column.sql_type)
}

fn join_idents<'a>(names: impl Iterator<Item = &'a str>) -> String {
    names.map(quote_ident).collect::<Vec<_>>().join(", ")
}
