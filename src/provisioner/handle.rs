use crate::connector::Connector;
use crate::errors::{PgTestKitError, Result};
use crate::provisioner::release_database;
use crate::server::TestServer;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// A provisioned test database and the client bound to it.
///
/// Owned by the test that requested it. Call [`close`](Self::close) when
/// done; dropping an unclosed handle schedules the same cleanup on the
/// current tokio runtime without waiting for it.
pub struct TestDatabase<C: Connector> {
    name: String,
    connection_string: String,
    client: C::Client,
    connector: Option<C>,
    server: Arc<TestServer>,
}

impl<C: Connector> TestDatabase<C> {
    pub(crate) fn new(
        server: Arc<TestServer>,
        name: String,
        connection_string: String,
        client: C::Client,
        connector: C,
    ) -> Self {
        Self { name, connection_string, client, connector: Some(connector), server }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    /// Client returned by the connector
    pub fn client(&self) -> &C::Client {
        &self.client
    }

    pub fn is_closed(&self) -> bool {
        self.connector.is_none()
    }

    /// Close the connector, then drop the database.
    ///
    /// Idempotent. Both steps always run; their failures are reported
    /// together.
    pub async fn close(&mut self) -> Result<()> {
        let Some(mut connector) = self.connector.take() else {
            return Ok(());
        };

        let mut errors = Vec::new();

        if let Err(e) = connector.close().await {
            error!(database = %self.name, error = %e, "Failed to close connector");
            errors.push(e);
        }

        if let Err(e) = release_database(&self.server, &self.name).await {
            error!(database = %self.name, error = %e, "Failed to drop database");
            errors.push(e);
        }

        debug!(database = %self.name, "Closed test database");
        PgTestKitError::teardown(format!("closing test database {}", self.name), errors)
    }

    /// Clear all user data, keeping the schema and a live connection
    pub async fn reset(&mut self) -> Result<()> {
        let connector = self.connector.as_mut().ok_or_else(|| {
            PgTestKitError::invalid_argument(format!("test database {} is closed", self.name))
        })?;
        connector.reset().await
    }

    /// [`reset`](Self::reset), panicking on failure
    pub async fn must_reset(&mut self) {
        if let Err(e) = self.reset().await {
            panic!("failed to reset test database {}: {}", self.name, e);
        }
    }
}

impl<C: Connector> fmt::Debug for TestDatabase<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestDatabase")
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl<C: Connector> Drop for TestDatabase<C> {
    fn drop(&mut self) {
        let Some(mut connector) = self.connector.take() else {
            return;
        };

        warn!(
            database = %self.name,
            "TestDatabase dropped without close; cleaning up in the background"
        );

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(database = %self.name, "No tokio runtime; database lives until the server stops");
            return;
        };

        let server = Arc::clone(&self.server);
        let name = std::mem::take(&mut self.name);
        runtime.spawn(async move {
            if let Err(e) = connector.close().await {
                error!(database = %name, error = %e, "Failed to close connector");
            }
            if let Err(e) = release_database(&server, &name).await {
                error!(database = %name, error = %e, "Failed to drop database");
            }
        });
    }
}
