//! SeaORM connector.

use crate::connector::reset::{
    default_preserved_tables, truncate_statement, DEFER_CONSTRAINTS_SQL, LIST_USER_TABLES_SQL,
    RESTORE_CONSTRAINTS_SQL,
};
use crate::connector::Connector;
use crate::errors::{PgTestKitError, Result};
use async_trait::async_trait;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, DbErr,
    Statement, TransactionTrait,
};
use std::time::Duration;

fn orm_error(context: &str, e: DbErr) -> PgTestKitError {
    PgTestKitError::connector_with_source(context, Box::new(e))
}

fn statement(sql: &str) -> Statement {
    Statement::from_string(DatabaseBackend::Postgres, sql.to_owned())
}

/// Connector handing out a `sea_orm::DatabaseConnection`
#[derive(Debug, Clone)]
pub struct SeaOrmConnector {
    max_connections: u32,
    preserved_tables: Vec<String>,
    db: Option<DatabaseConnection>,
}

impl Default for SeaOrmConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl SeaOrmConnector {
    pub fn new() -> Self {
        Self { max_connections: 5, preserved_tables: default_preserved_tables(), db: None }
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn preserve_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preserved_tables = tables.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait]
impl Connector for SeaOrmConnector {
    type Client = DatabaseConnection;

    async fn connect(&mut self, connection_string: &str) -> Result<DatabaseConnection> {
        let mut opt = ConnectOptions::new(connection_string.to_owned());
        opt.max_connections(self.max_connections)
            .min_connections(1)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .sqlx_logging(false);

        let db = Database::connect(opt)
            .await
            .map_err(|e| orm_error("Failed to connect to test database", e))?;

        self.db = Some(db.clone());
        Ok(db)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(db) = self.db.take() {
            db.close().await.map_err(|e| orm_error("Failed to close connection", e))?;
        }
        Ok(())
    }

    async fn reset(&mut self) -> Result<()> {
        let db = self
            .db
            .as_ref()
            .ok_or_else(|| PgTestKitError::connector("connector is not connected"))?;
        let txn = db.begin().await.map_err(|e| orm_error("Failed to begin reset", e))?;

        let rows = txn
            .query_all(statement(LIST_USER_TABLES_SQL))
            .await
            .map_err(|e| orm_error("Failed to list tables", e))?;
        let mut tables = Vec::with_capacity(rows.len());
        for row in rows {
            let schema: String =
                row.try_get("", "schemaname").map_err(|e| orm_error("Failed to read schema", e))?;
            let table: String =
                row.try_get("", "tablename").map_err(|e| orm_error("Failed to read table", e))?;
            tables.push((schema, table));
        }

        txn.execute(statement(DEFER_CONSTRAINTS_SQL))
            .await
            .map_err(|e| orm_error("Failed to defer constraints", e))?;

        if let Some(sql) = truncate_statement(&tables, &self.preserved_tables) {
            txn.execute(statement(&sql))
                .await
                .map_err(|e| orm_error("Failed to truncate tables", e))?;
        }

        txn.execute(statement(RESTORE_CONSTRAINTS_SQL))
            .await
            .map_err(|e| orm_error("Failed to restore constraints", e))?;

        txn.commit().await.map_err(|e| orm_error("Failed to commit reset", e))
    }
}
