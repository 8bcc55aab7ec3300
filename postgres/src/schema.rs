use std::fmt;

use pg_escape::quote_identifier;

/// Fully qualified Postgres table name.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct TableName {
    /// The schema containing the table.
    pub schema: String,
    /// The name of the table within the schema.
    pub name: String,
}

impl TableName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> TableName {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Returns `schema.name` with both parts quoted where Postgres requires it.
    pub fn as_quoted_identifier(&self) -> String {
        let quoted_schema = quote_identifier(&self.schema);
        let quoted_name = quote_identifier(&self.name);

        format!("{quoted_schema}.{quoted_name}")
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Quotes a single identifier, such as a column or schema name.
pub fn quote_ident(identifier: &str) -> String {
    quote_identifier(identifier).into_owned()
}
