//! # pgtestkit
//!
//! Ephemeral PostgreSQL servers for test suites. One [`TestServer`] is
//! started per test run and every test case gets its own disposable
//! database on it.
//!
//! ## Architecture
//!
//! ```text
//! test code → TestServer::create_database(connector) → TestDatabase<C>
//!                 ↓                                         ↓
//!          Backend (postgresql_embedded)          Connector (sqlx / SeaORM)
//! ```
//!
//! - **Server lifecycle** ([`server`]): starts at most once, stops
//!   idempotently, never restarts after a stop
//! - **Provisioner** ([`provisioner`]): create, reset and drop per-test databases
//! - **Connectors** ([`connector`]): bind a driver or ORM to a database
//! - **Shutdown** ([`shutdown`]): SIGINT/SIGTERM stop the server before exit
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use pgtestkit::{PgPoolConnector, Result, ServerConfig, TestServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let server = TestServer::new(ServerConfig::from_env()?);
//!     server.start().await?;
//!
//!     let mut db = server.create_database(PgPoolConnector::new()).await?;
//!     sqlx::query("CREATE TABLE users (id SERIAL PRIMARY KEY)")
//!         .execute(db.client())
//!         .await?;
//!     db.close().await?;
//!
//!     server.stop().await
//! }
//! ```

pub mod cli;
pub mod config;
pub mod connector;
pub mod errors;
pub mod harness;
pub mod observability;
pub mod provisioner;
pub mod server;
pub mod shutdown;

#[cfg(test)]
mod testing;

// Re-export commonly used types and traits
pub use config::{LoggingConfig, ServerConfig};
pub use connector::{Connector, PgPoolConnector};
#[cfg(feature = "sea-orm")]
pub use connector::SeaOrmConnector;
pub use errors::{Error, PgTestKitError, Result};
pub use provisioner::TestDatabase;
pub use server::{ServerPhase, TestServer};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
