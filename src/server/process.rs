//! # Server Process Management
//!
//! Seam between the lifecycle and the process that actually runs PostgreSQL.
//! The default backend drives `postgresql_embedded`, which downloads and
//! caches server binaries, runs `initdb` and starts/stops the server.

use crate::config::ServerConfig;
use crate::errors::{PgTestKitError, Result};
use crate::server::admin::{AdminClient, PgAdmin};
use async_trait::async_trait;
use postgresql_embedded::{PostgreSQL, Settings, VersionReq};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Everything the process manager needs to launch one server
#[derive(Debug, Clone)]
pub struct LaunchSettings {
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    pub locale: String,
    pub version: String,
    pub runtime_dir: PathBuf,
    pub data_dir: PathBuf,
    pub binaries_dir: Option<PathBuf>,
    pub timeout: Duration,
}

impl LaunchSettings {
    /// Resolve launch settings from configuration for a chosen port and cache directory
    pub fn resolve(config: &ServerConfig, port: u16, runtime_dir: PathBuf) -> Self {
        let data_dir = config.data_dir.clone().unwrap_or_else(|| runtime_dir.join("data"));
        Self {
            port,
            username: config.username.clone(),
            password: config.password.clone(),
            database: config.database.clone(),
            locale: config.locale.clone(),
            version: config.version.clone(),
            runtime_dir,
            data_dir,
            binaries_dir: config.binaries_dir.clone(),
            timeout: config.start_timeout(),
        }
    }
}

/// A running server process
#[async_trait]
pub trait ServerProcess: Send + Sync {
    /// Stop the server. Called at most once by the lifecycle.
    async fn stop(&mut self) -> Result<()>;
}

/// Factory for server processes and their administrative connections
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Start a server described by `settings`
    async fn launch(&self, settings: &LaunchSettings) -> Result<Box<dyn ServerProcess>>;

    /// Open the base administrative connection to a launched server
    async fn connect_admin(&self, url: &str) -> Result<Box<dyn AdminClient>>;
}

/// Backend running PostgreSQL through `postgresql_embedded`
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbeddedBackend;

impl EmbeddedBackend {
    fn settings(launch: &LaunchSettings) -> Result<Settings> {
        let version = VersionReq::parse(&launch.version).map_err(|e| {
            PgTestKitError::config_with_source(
                format!("Invalid PostgreSQL version requirement '{}'", launch.version),
                Box::new(e),
            )
        })?;

        let mut configuration = HashMap::new();
        for key in ["lc_messages", "lc_monetary", "lc_numeric", "lc_time"] {
            configuration.insert(key.to_string(), launch.locale.clone());
        }

        let mut settings = Settings::default();
        settings.version = version;
        settings.port = launch.port;
        settings.username = launch.username.clone();
        settings.password = launch.password.clone();
        settings.data_dir = launch.data_dir.clone();
        settings.password_file = launch.runtime_dir.join(".pgpass");
        settings.temporary = false;
        settings.timeout = Some(launch.timeout);
        settings.configuration = configuration;
        if let Some(dir) = &launch.binaries_dir {
            settings.installation_dir = dir.clone();
        }
        Ok(settings)
    }
}

#[async_trait]
impl Backend for EmbeddedBackend {
    async fn launch(&self, launch: &LaunchSettings) -> Result<Box<dyn ServerProcess>> {
        let settings = Self::settings(launch)?;
        let mut postgresql = PostgreSQL::new(settings);

        tracing::debug!(
            port = launch.port,
            data_dir = %launch.data_dir.display(),
            version = %launch.version,
            "Installing and initialising PostgreSQL"
        );
        postgresql.setup().await.map_err(|e| {
            PgTestKitError::process_with_source("Failed to set up embedded postgres", Box::new(e))
        })?;

        postgresql.start().await.map_err(|e| {
            PgTestKitError::process_with_source("Failed to start embedded postgres", Box::new(e))
        })?;

        if !launch.database.is_empty() && launch.database != crate::config::DEFAULT_DATABASE {
            let exists = postgresql.database_exists(&launch.database).await?;
            if !exists {
                if let Err(e) = postgresql.create_database(&launch.database).await {
                    let _ = postgresql.stop().await;
                    return Err(PgTestKitError::process_with_source(
                        format!("Failed to create maintenance database {}", launch.database),
                        Box::new(e),
                    ));
                }
            }
        }

        Ok(Box::new(EmbeddedProcess { postgresql }))
    }

    async fn connect_admin(&self, url: &str) -> Result<Box<dyn AdminClient>> {
        Ok(Box::new(PgAdmin::connect(url).await?))
    }
}

/// Server started by [`EmbeddedBackend`]
pub struct EmbeddedProcess {
    postgresql: PostgreSQL,
}

#[async_trait]
impl ServerProcess for EmbeddedProcess {
    async fn stop(&mut self) -> Result<()> {
        self.postgresql.stop().await.map_err(|e| {
            PgTestKitError::process_with_source("Failed to stop embedded postgres", Box::new(e))
        })
    }
}
