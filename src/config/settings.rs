//! # Configuration Settings
//!
//! Defines the configuration accepted by server start and by logging setup.

use crate::errors::{PgTestKitError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use validator::Validate;

/// Default superuser name
pub const DEFAULT_USER: &str = "postgres";
/// Default superuser password
pub const DEFAULT_PASSWORD: &str = "postgres";
/// Default maintenance database used by the administrative connection
pub const DEFAULT_DATABASE: &str = "postgres";
/// Default server locale
pub const DEFAULT_LOCALE: &str = "en_US.UTF-8";
/// Default PostgreSQL version requirement
pub const DEFAULT_VERSION: &str = "=15";

/// Prefix for environment variable overrides (`PGTESTKIT_PORT`, ...)
pub const ENV_PREFIX: &str = "PGTESTKIT";

/// Environment variable naming an optional configuration file
pub const ENV_CONFIG_FILE: &str = "PGTESTKIT_CONFIG";

/// Configuration for starting the embedded PostgreSQL server
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ServerConfig {
    /// Superuser name
    #[validate(length(min = 1, max = 63, message = "Username must be 1-63 characters"))]
    pub username: String,

    /// Superuser password
    #[validate(length(min = 1, message = "Password cannot be empty"))]
    pub password: String,

    /// Maintenance database the administrative connection uses
    #[validate(length(min = 1, max = 63, message = "Database name must be 1-63 characters"))]
    pub database: String,

    /// Locale applied to the server's `lc_*` settings
    #[validate(length(min = 1, message = "Locale cannot be empty"))]
    pub locale: String,

    /// PostgreSQL version requirement (semver, e.g. `=15` or `^16.2`)
    #[validate(length(min = 1, message = "Version cannot be empty"))]
    pub version: String,

    /// Explicit port; a free port is picked when unset
    pub port: Option<u16>,

    /// Per-run cache directory; defaults to `~/.pgtestkit/postgres_<port>`
    pub runtime_dir: Option<PathBuf>,

    /// Data directory; defaults to `<runtime_dir>/data`
    pub data_dir: Option<PathBuf>,

    /// Where server binaries are installed; defaults to the process manager's shared cache
    pub binaries_dir: Option<PathBuf>,

    /// Upper bound on how long the process manager may take to start the server
    #[validate(range(
        min = 1,
        max = 3600,
        message = "Start timeout must be between 1 and 3600 seconds"
    ))]
    pub start_timeout_seconds: u64,

    /// Install the SIGINT/SIGTERM shutdown listener after the first successful start
    pub handle_signals: bool,

    /// Keep the cache directory after stop (debugging aid)
    pub keep_cache_dir: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            username: DEFAULT_USER.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            locale: DEFAULT_LOCALE.to_string(),
            version: DEFAULT_VERSION.to_string(),
            port: None,
            runtime_dir: None,
            data_dir: None,
            binaries_dir: None,
            start_timeout_seconds: 120,
            handle_signals: true,
            keep_cache_dir: false,
        }
    }
}

impl ServerConfig {
    /// Load configuration from defaults, an optional file, then `PGTESTKIT_*` variables.
    ///
    /// Later sources override earlier ones. The result is validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let config: Self = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the environment, honouring `PGTESTKIT_CONFIG` if set
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(ENV_CONFIG_FILE) {
            Some(path) => Self::load(Some(Path::new(&path))),
            None => Self::load(None),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(PgTestKitError::from)?;
        self.validate_custom()
    }

    fn validate_custom(&self) -> Result<()> {
        if self.port == Some(0) {
            return Err(PgTestKitError::validation_field(
                "Port override must be non-zero; leave it unset to pick a free port",
                "port",
            ));
        }

        if postgresql_embedded::VersionReq::parse(&self.version).is_err() {
            return Err(PgTestKitError::validation_field(
                format!("Invalid version requirement '{}'", self.version),
                "version",
            ));
        }

        if self.database.contains('\0') || self.username.contains('\0') {
            return Err(PgTestKitError::validation("Identifiers cannot contain NUL bytes"));
        }

        Ok(())
    }

    /// Get the start timeout as Duration
    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_seconds)
    }
}

/// Output format for diagnostic logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Structured JSON lines
    #[default]
    Json,
    /// Human-readable multi-line output
    Pretty,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Whether diagnostics are emitted at all
    pub enabled: bool,

    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,

    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { enabled: false, level: "info".to_string(), format: LogFormat::Json }
    }
}

impl LoggingConfig {
    /// Create LoggingConfig from environment variables
    ///
    /// - `PGTESTKIT_LOG`: `1`/`true` enables logging
    /// - `PGTESTKIT_LOG_LEVEL`: default filter (`info` when unset)
    /// - `PGTESTKIT_LOG_FORMAT`: `json` or `pretty`
    /// - `ENV=development`: selects `pretty` unless a format is given explicitly
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = lookup("PGTESTKIT_LOG")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        let level = lookup("PGTESTKIT_LOG_LEVEL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "info".to_string());

        let format = match lookup("PGTESTKIT_LOG_FORMAT") {
            Some(v) if v.eq_ignore_ascii_case("pretty") => LogFormat::Pretty,
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => {
                if lookup("ENV").is_some_and(|v| v == "development") {
                    LogFormat::Pretty
                } else {
                    LogFormat::Json
                }
            }
        };

        Self { enabled, level, format }
    }
}
