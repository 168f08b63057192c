//! # Connectors
//!
//! A [`Connector`] binds a driver or ORM to a test database's connection
//! string. The provisioner only ever talks to this trait; the concrete client
//! type is carried as an associated type so test code gets its pool or ORM
//! connection back without downcasting.
//!
//! Built-in implementations:
//!
//! - [`PgPoolConnector`]: a raw `sqlx::PgPool`
//! - `SeaOrmConnector`: a `sea_orm::DatabaseConnection` (feature `sea-orm`)

pub mod pool;
pub mod reset;
#[cfg(feature = "sea-orm")]
pub mod sea_orm;

pub use pool::PgPoolConnector;
pub use reset::DEFAULT_PRESERVED_TABLES;
#[cfg(feature = "sea-orm")]
pub use self::sea_orm::SeaOrmConnector;

use crate::errors::Result;
use async_trait::async_trait;

/// Binds a client library to a freshly provisioned database
#[async_trait]
pub trait Connector: Send + 'static {
    /// Client handed back to the test
    type Client: Send + Sync;

    /// Open a client for `connection_string`
    async fn connect(&mut self, connection_string: &str) -> Result<Self::Client>;

    /// Release everything `connect` opened.
    ///
    /// Called exactly once by the owning handle, before the database is dropped.
    async fn close(&mut self) -> Result<()>;

    /// Remove all user data while keeping the schema
    async fn reset(&mut self) -> Result<()>;
}
