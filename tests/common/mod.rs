//! Common test utilities for integration tests against a real embedded server.

#![allow(dead_code)]
#![allow(clippy::duplicate_mod)]

pub mod connectors;

use pgtestkit::{ServerConfig, TestServer};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;

/// Configuration for a throwaway server: random port, `C` locale, no signal hook
pub fn test_config() -> ServerConfig {
    let runtime_dir =
        std::env::temp_dir().join(format!("pgtestkit-it-{}", uuid::Uuid::new_v4().simple()));
    ServerConfig {
        locale: "C".to_string(),
        runtime_dir: Some(runtime_dir),
        handle_signals: false,
        ..Default::default()
    }
}

/// Start a server for a single test
pub async fn start_server() -> Arc<TestServer> {
    let server = TestServer::new(test_config());
    server.start().await.expect("failed to start embedded PostgreSQL");
    server
}

/// Names of all non-template databases, read over a separate connection
pub async fn list_databases(server: &TestServer) -> Vec<String> {
    let url = server.admin_connection_string().await.expect("server not running");
    let pool = PgPoolOptions::new().max_connections(1).connect(&url).await.expect("connect");
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT datname::text FROM pg_database WHERE NOT datistemplate ORDER BY datname",
    )
    .fetch_all(&pool)
    .await
    .expect("list databases");
    pool.close().await;
    rows.into_iter().map(|(name,)| name).collect()
}
