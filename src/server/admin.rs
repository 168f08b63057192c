//! # Administrative Connection
//!
//! The base connection to the maintenance database, used for every
//! create/drop statement the provisioner issues.

use crate::errors::{PgTestKitError, Result};
use crate::observability::sanitize_url;
use crate::provisioner::naming::quote_ident;
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

const ADMIN_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Administrative operations against a running server
#[async_trait]
pub trait AdminClient: Send + Sync {
    /// Round-trip to the server
    async fn ping(&self) -> Result<()>;

    /// `SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)`
    async fn database_exists(&self, name: &str) -> Result<bool>;

    /// `CREATE DATABASE "<escaped>"`
    async fn create_database(&self, name: &str) -> Result<()>;

    /// Whether a drop has anything to do (`SELECT 1 FROM pg_database WHERE datname = $1`)
    async fn database_present(&self, name: &str) -> Result<bool>;

    /// Terminate every other backend connected to `name`.
    ///
    /// Returns the number of sessions signalled.
    async fn terminate_backends(&self, name: &str) -> Result<u64>;

    /// `DROP DATABASE IF EXISTS "<escaped>"`
    async fn drop_database(&self, name: &str) -> Result<()>;

    /// Close the connection
    async fn close(&self) -> Result<()>;
}

/// `AdminClient` that opens a short-lived session per statement.
///
/// No socket outlives the call that opened it, so the client keeps working
/// when the runtime that started the server has been dropped.
pub struct PgAdmin {
    options: PgConnectOptions,
    url: String,
    closed: AtomicBool,
}

impl PgAdmin {
    /// Parse `url` and verify the server accepts a session
    pub async fn connect(url: &str) -> Result<Self> {
        let options: PgConnectOptions = url.parse().map_err(|e| {
            PgTestKitError::database(e, format!("Invalid connection string: {}", sanitize_url(url)))
        })?;
        let admin = Self { options, url: sanitize_url(url), closed: AtomicBool::new(false) };

        let session = admin.session().await.map_err(|e| {
            tracing::error!(
                error = %e,
                url = %admin.url,
                "Failed to open administrative connection"
            );
            e
        })?;
        release(session).await;
        Ok(admin)
    }

    async fn session(&self) -> Result<PgConnection> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PgTestKitError::ServerNotRunning);
        }
        match tokio::time::timeout(ADMIN_CONNECT_TIMEOUT, PgConnection::connect_with(&self.options))
            .await
        {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(PgTestKitError::database(
                e,
                format!("Failed to connect to database: {}", self.url),
            )),
            Err(_) => Err(PgTestKitError::io(
                std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"),
                format!("Failed to connect to database: {}", self.url),
            )),
        }
    }
}

async fn release(conn: PgConnection) {
    if let Err(e) = conn.close().await {
        debug!(error = %e, "Failed to close administrative session");
    }
}

#[async_trait]
impl AdminClient for PgAdmin {
    async fn ping(&self) -> Result<()> {
        let mut conn = self.session().await?;
        let result = sqlx::query("SELECT 1").execute(&mut conn).await;
        release(conn).await;
        result.map_err(|e| PgTestKitError::database(e, "Failed to ping database"))?;
        Ok(())
    }

    async fn database_exists(&self, name: &str) -> Result<bool> {
        let mut conn = self.session().await?;
        let result: std::result::Result<(bool,), _> =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
                .bind(name)
                .fetch_one(&mut conn)
                .await;
        release(conn).await;
        let (exists,) =
            result.map_err(|e| PgTestKitError::database(e, "Failed to check if database exists"))?;
        Ok(exists)
    }

    async fn create_database(&self, name: &str) -> Result<()> {
        let statement = format!("CREATE DATABASE {}", quote_ident(name));
        let mut conn = self.session().await?;
        let result = sqlx::query(&statement).execute(&mut conn).await;
        release(conn).await;
        result.map_err(|e| {
            PgTestKitError::database(e, format!("Failed to create database {}", name))
        })?;
        Ok(())
    }

    async fn database_present(&self, name: &str) -> Result<bool> {
        let mut conn = self.session().await?;
        let result: std::result::Result<Option<(i32,)>, _> =
            sqlx::query_as("SELECT 1 FROM pg_database WHERE datname = $1")
                .bind(name)
                .fetch_optional(&mut conn)
                .await;
        release(conn).await;
        let row =
            result.map_err(|e| PgTestKitError::database(e, "Failed to check if database exists"))?;
        Ok(row.is_some())
    }

    async fn terminate_backends(&self, name: &str) -> Result<u64> {
        let mut conn = self.session().await?;
        let result = sqlx::query(
            "SELECT pg_terminate_backend(pid) \
             FROM pg_stat_activity \
             WHERE datname = $1 \
             AND pid <> pg_backend_pid()",
        )
        .bind(name)
        .execute(&mut conn)
        .await;
        release(conn).await;
        let result = result.map_err(|e| {
            PgTestKitError::database(e, format!("Failed to terminate connections to {}", name))
        })?;
        Ok(result.rows_affected())
    }

    async fn drop_database(&self, name: &str) -> Result<()> {
        let statement = format!("DROP DATABASE IF EXISTS {}", quote_ident(name));
        let mut conn = self.session().await?;
        let result = sqlx::query(&statement).execute(&mut conn).await;
        release(conn).await;
        result.map_err(|e| {
            PgTestKitError::database(e, format!("Failed to drop database {}", name))
        })?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_rejects_malformed_url() {
        let err = PgAdmin::connect("not a url").await.err().unwrap();
        assert!(matches!(err, PgTestKitError::Database { .. }));
    }
}
