//! SQL shared by the built-in connectors' `reset`.
//!
//! A reset runs in one transaction:
//!
//! 1. `SET CONSTRAINTS ALL DEFERRED`
//! 2. `TRUNCATE TABLE <every user table> RESTART IDENTITY CASCADE`
//! 3. `SET CONSTRAINTS ALL IMMEDIATE`
//!
//! Migration bookkeeping tables are left alone so a migrated schema stays
//! migrated.

use crate::provisioner::naming::quote_qualified;

/// Tables a reset keeps by default
pub const DEFAULT_PRESERVED_TABLES: &[&str] =
    &["schema_migrations", "_sqlx_migrations", "seaql_migrations"];

/// Lists `(schema, table)` for every table outside the system schemas
pub const LIST_USER_TABLES_SQL: &str = "SELECT schemaname::text, tablename::text \
     FROM pg_tables \
     WHERE schemaname NOT IN ('pg_catalog', 'information_schema') \
     AND schemaname NOT LIKE 'pg_toast%' \
     AND schemaname NOT LIKE 'pg_temp%' \
     ORDER BY schemaname, tablename";

pub const DEFER_CONSTRAINTS_SQL: &str = "SET CONSTRAINTS ALL DEFERRED";
pub const RESTORE_CONSTRAINTS_SQL: &str = "SET CONSTRAINTS ALL IMMEDIATE";

/// Default preserve list as owned strings
pub fn default_preserved_tables() -> Vec<String> {
    DEFAULT_PRESERVED_TABLES.iter().map(|t| t.to_string()).collect()
}

/// Build the `TRUNCATE` for `tables`, skipping preserved names.
///
/// Returns `None` when nothing is left to clear.
pub fn truncate_statement(tables: &[(String, String)], preserved: &[String]) -> Option<String> {
    let targets: Vec<String> = tables
        .iter()
        .filter(|(_, table)| !preserved.iter().any(|p| p == table))
        .map(|(schema, table)| quote_qualified(schema, table))
        .collect();

    if targets.is_empty() {
        return None;
    }
    Some(format!("TRUNCATE TABLE {} RESTART IDENTITY CASCADE", targets.join(", ")))
}
