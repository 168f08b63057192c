//! # Database Provisioner
//!
//! Creates one uniquely named database per test case on the running
//! [`TestServer`], binds it through a caller-supplied [`Connector`] and hands
//! back a [`TestDatabase`] that drops the database again on close.
//!
//! The lifecycle lock is held for the administrative part only (existence
//! check, `CREATE DATABASE`, connector bind and reset). Queries issued through
//! the returned client are never serialized here.

pub mod handle;
pub mod naming;

pub use handle::TestDatabase;
pub use naming::{generate_database_name, quote_ident, validate_database_name};

use crate::connector::Connector;
use crate::db_span;
use crate::errors::{PgTestKitError, ProvisionStage, Result};
use crate::server::{AdminClient, TestServer};
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument};

impl TestServer {
    /// Create a fresh database with a generated name and bind `connector` to it.
    ///
    /// Fails with [`PgTestKitError::ServerNotRunning`] unless the server is
    /// running. A failed connect drops the new database; a failed reset also
    /// closes the connector.
    pub async fn create_database<C: Connector>(
        self: &Arc<Self>,
        connector: C,
    ) -> Result<TestDatabase<C>> {
        self.provision(connector, naming::generate_database_name()).await
    }

    /// Like [`create_database`](Self::create_database) with a caller-chosen name.
    ///
    /// An existing database of that name is reused rather than recreated.
    pub async fn create_database_named<C: Connector>(
        self: &Arc<Self>,
        connector: C,
        name: impl Into<String>,
    ) -> Result<TestDatabase<C>> {
        let name = name.into();
        naming::validate_database_name(&name)?;
        self.provision(connector, name).await
    }

    async fn provision<C: Connector>(
        self: &Arc<Self>,
        mut connector: C,
        name: String,
    ) -> Result<TestDatabase<C>> {
        let span = db_span!("create_database", database = %name);

        async move {
            let state = self.state().lock().await;
            let admin = state.running_admin().ok_or(PgTestKitError::ServerNotRunning)?;

            let exists = admin
                .database_exists(&name)
                .await
                .map_err(|e| PgTestKitError::provision(&name, ProvisionStage::Create, e))?;
            if exists {
                debug!("Database already exists, skipping creation");
            } else {
                admin
                    .create_database(&name)
                    .await
                    .map_err(|e| PgTestKitError::provision(&name, ProvisionStage::Create, e))?;
            }

            let url = naming::connection_string(
                &self.config().username,
                &self.config().password,
                state.port,
                &name,
            );

            let client = match connector.connect(&url).await {
                Ok(client) => client,
                Err(e) => {
                    error!(error = %e, "Connector failed to connect; dropping database");
                    if let Err(drop_err) = drop_database(admin, &name).await {
                        error!(error = %drop_err, "Failed to drop database after connect error");
                    }
                    return Err(PgTestKitError::provision(&name, ProvisionStage::Connect, e));
                }
            };

            if let Err(e) = connector.reset().await {
                error!(error = %e, "Connector failed to reset; cleaning up");
                if let Err(close_err) = connector.close().await {
                    error!(error = %close_err, "Failed to close connector after reset error");
                }
                if let Err(drop_err) = drop_database(admin, &name).await {
                    error!(error = %drop_err, "Failed to drop database after reset error");
                }
                return Err(PgTestKitError::provision(&name, ProvisionStage::Reset, e));
            }

            drop(state);
            info!(database = %name, "Created test database");
            Ok(TestDatabase::new(Arc::clone(self), name, url, client, connector))
        }
        .instrument(span)
        .await
    }
}

/// Drop `name` over the administrative connection.
///
/// Terminating other sessions is best effort; the drop itself tolerates a
/// database that is already gone.
pub(crate) async fn drop_database(admin: &dyn AdminClient, name: &str) -> Result<()> {
    if !admin.database_present(name).await? {
        debug!(database = %name, "Database does not exist, skipping drop");
        return Ok(());
    }

    match admin.terminate_backends(name).await {
        Ok(terminated) => debug!(database = %name, terminated, "Terminated connections"),
        Err(e) => warn!(database = %name, error = %e, "Failed to terminate connections"),
    }

    admin.drop_database(name).await?;
    debug!(database = %name, "Dropped database");
    Ok(())
}

/// Drop `name` if the server that owns it is still running
pub(crate) async fn release_database(server: &TestServer, name: &str) -> Result<()> {
    let state = server.state().lock().await;
    match state.running_admin() {
        Some(admin) => drop_database(admin, name).await,
        None => {
            debug!(database = %name, "Server no longer running, database removed with the cluster");
            Ok(())
        }
    }
}
