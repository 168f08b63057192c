// Starts real PostgreSQL servers; binaries are downloaded on first use.
// To run these tests: cargo test --features postgres_tests
#![cfg(feature = "postgres_tests")]

//! Server lifecycle against an embedded PostgreSQL

mod common;

use common::{list_databases, start_server, test_config};
use pgtestkit::{PgPoolConnector, PgTestKitError, ServerConfig, ServerPhase, TestServer};
use std::sync::Arc;

#[tokio::test]
async fn test_start_stop_removes_cache_dir() {
    let server = start_server().await;

    assert_eq!(server.phase().await, ServerPhase::Running);
    let port = server.port().await.expect("port while running");
    assert!(port > 0);

    let cache_dir = server.cache_dir().await.expect("cache dir while running");
    assert!(cache_dir.join("data").exists());

    server.stop().await.unwrap();
    assert_eq!(server.phase().await, ServerPhase::Stopped);
    assert!(!cache_dir.exists());
    assert_eq!(server.port().await, None);
}

#[tokio::test]
async fn test_restart_after_stop_is_rejected() {
    let server = start_server().await;
    server.stop().await.unwrap();

    let err = server.start().await.unwrap_err();
    assert!(matches!(err, PgTestKitError::ServerAlreadyStopped));

    // stopping again is a no-op
    server.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_start_shares_one_server() {
    let server = TestServer::new(test_config());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.start().await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let port = server.port().await.unwrap();
    for _ in 0..4 {
        server.start().await.unwrap();
        assert_eq!(server.port().await, Some(port));
    }
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_failed_start_rolls_back_and_latches() {
    let config = ServerConfig { version: "not-a-version".to_string(), ..test_config() };
    let runtime_dir = config.runtime_dir.clone().unwrap();
    let server = TestServer::new(config);

    let err = server.start().await.unwrap_err();
    assert!(matches!(err, PgTestKitError::StartFailed { .. }));
    assert_eq!(server.phase().await, ServerPhase::Failed);
    assert!(!runtime_dir.exists());

    assert!(matches!(server.start().await, Err(PgTestKitError::StartFailed { .. })));
    server.stop().await.unwrap();
}

#[test]
fn test_shared_server_survives_dropped_runtime() {
    let server = TestServer::new(test_config());

    let first = tokio::runtime::Runtime::new().unwrap();
    first.block_on(async {
        server.start().await.unwrap();
        let mut db = server.create_database(PgPoolConnector::new()).await.unwrap();
        db.close().await.unwrap();
    });
    drop(first);

    let second = tokio::runtime::Runtime::new().unwrap();
    second.block_on(async {
        server.start().await.unwrap();
        let mut db = server.create_database(PgPoolConnector::new()).await.unwrap();
        let name = db.name().to_string();
        assert!(list_databases(&server).await.contains(&name));
        db.close().await.unwrap();
        assert!(!list_databases(&server).await.contains(&name));
        server.stop().await.unwrap();
    });
}
