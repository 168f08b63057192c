//! `sqlx` connection pool connector.

use crate::connector::reset::{
    default_preserved_tables, truncate_statement, DEFER_CONSTRAINTS_SQL, LIST_USER_TABLES_SQL,
    RESTORE_CONSTRAINTS_SQL,
};
use crate::connector::Connector;
use crate::errors::{PgTestKitError, Result};
use crate::observability::sanitize_url;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{debug, error};

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connector handing out a `sqlx::PgPool`
#[derive(Debug, Clone)]
pub struct PgPoolConnector {
    max_connections: u32,
    acquire_timeout: Duration,
    preserved_tables: Vec<String>,
    pool: Option<PgPool>,
}

impl Default for PgPoolConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl PgPoolConnector {
    pub fn new() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            preserved_tables: default_preserved_tables(),
            pool: None,
        }
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Replace the list of tables `reset` leaves untouched
    pub fn preserve_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preserved_tables = tables.into_iter().map(Into::into).collect();
        self
    }

    fn pool(&self) -> Result<&PgPool> {
        self.pool.as_ref().ok_or_else(|| PgTestKitError::connector("connector is not connected"))
    }
}

#[async_trait]
impl Connector for PgPoolConnector {
    type Client = PgPool;

    async fn connect(&mut self, connection_string: &str) -> Result<PgPool> {
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect(connection_string)
            .await
            .map_err(|e| {
                error!(
                    error = %e,
                    url = %sanitize_url(connection_string),
                    "Failed to connect to test database"
                );
                PgTestKitError::database(
                    e,
                    format!("Failed to connect to database: {}", sanitize_url(connection_string)),
                )
            })?;

        self.pool = Some(pool.clone());
        Ok(pool)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
        }
        Ok(())
    }

    async fn reset(&mut self) -> Result<()> {
        let pool = self.pool()?;
        let mut tx =
            pool.begin().await.map_err(|e| PgTestKitError::database(e, "Failed to begin reset"))?;

        let tables: Vec<(String, String)> = sqlx::query_as(LIST_USER_TABLES_SQL)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| PgTestKitError::database(e, "Failed to list tables"))?;

        sqlx::query(DEFER_CONSTRAINTS_SQL)
            .execute(&mut *tx)
            .await
            .map_err(|e| PgTestKitError::database(e, "Failed to defer constraints"))?;

        if let Some(statement) = truncate_statement(&tables, &self.preserved_tables) {
            debug!(tables = tables.len(), "Truncating user tables");
            sqlx::query(&statement)
                .execute(&mut *tx)
                .await
                .map_err(|e| PgTestKitError::database(e, "Failed to truncate tables"))?;
        }

        sqlx::query(RESTORE_CONSTRAINTS_SQL)
            .execute(&mut *tx)
            .await
            .map_err(|e| PgTestKitError::database(e, "Failed to restore constraints"))?;

        tx.commit().await.map_err(|e| PgTestKitError::database(e, "Failed to commit reset"))?;
        Ok(())
    }
}
