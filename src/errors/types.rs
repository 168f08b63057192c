//! # Error Types
//!
//! Error types for server lifecycle, provisioning and teardown using `thiserror`.

use std::fmt;
use std::sync::Arc;

/// Custom result type for pgtestkit operations
pub type Result<T> = std::result::Result<T, PgTestKitError>;

/// Main error type for pgtestkit
#[derive(thiserror::Error, Debug)]
pub enum PgTestKitError {
    /// A start was attempted after the server had been stopped
    #[error("Server has been stopped and cannot be restarted")]
    ServerAlreadyStopped,

    /// Provisioning was attempted while the server was not running
    #[error("Database server is not running")]
    ServerNotRunning,

    /// Caller supplied an unusable argument
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// The one-time start failed; every caller observes the same failure
    #[error("Failed to start PostgreSQL server")]
    StartFailed {
        #[source]
        source: Arc<PgTestKitError>,
    },

    /// Creating, connecting or resetting a test database failed.
    /// Partial state has already been rolled back.
    #[error("Failed to provision test database {database}: {stage}")]
    Provision {
        database: String,
        stage: ProvisionStage,
        #[source]
        source: Box<PgTestKitError>,
    },

    /// One or more cleanup steps failed. Every step was attempted.
    #[error("{} error(s) occurred while {operation}: {}", .errors.len(), join_errors(.errors))]
    Teardown {
        operation: String,
        errors: Vec<PgTestKitError>,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// Database errors from the administrative connection or a connector
    #[error("Database error: {context}")]
    Database {
        #[source]
        source: sqlx::Error,
        context: String,
    },

    /// I/O errors with additional context
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// Errors reported by the external server process manager
    #[error("Server process error: {message}")]
    Process {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Errors raised by a connector implementation
    #[error("Connector error: {message}")]
    Connector {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Step of the provisioning sequence that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStage {
    Create,
    Connect,
    Reset,
}

impl fmt::Display for ProvisionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionStage::Create => write!(f, "create"),
            ProvisionStage::Connect => write!(f, "connect"),
            ProvisionStage::Reset => write!(f, "reset"),
        }
    }
}

fn join_errors(errors: &[PgTestKitError]) -> String {
    errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ")
}

impl PgTestKitError {
    /// Create an invalid argument error
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::InvalidArgument { message: message.into() }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a configuration error with source
    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None }
    }

    /// Create a validation error with field information
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    /// Wrap a `sqlx` error with context
    pub fn database<S: Into<String>>(source: sqlx::Error, context: S) -> Self {
        Self::Database { source, context: context.into() }
    }

    /// Wrap an I/O error with context
    pub fn io<S: Into<String>>(source: std::io::Error, context: S) -> Self {
        Self::Io { source, context: context.into() }
    }

    /// Create a process manager error
    pub fn process<S: Into<String>>(message: S) -> Self {
        Self::Process { message: message.into(), source: None }
    }

    /// Create a process manager error with source
    pub fn process_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Process { message: message.into(), source: Some(source) }
    }

    /// Create a connector error
    pub fn connector<S: Into<String>>(message: S) -> Self {
        Self::Connector { message: message.into(), source: None }
    }

    /// Create a connector error with source
    pub fn connector_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Connector { message: message.into(), source: Some(source) }
    }

    /// Wrap a failure of one provisioning step
    pub fn provision<D: Into<String>>(database: D, stage: ProvisionStage, source: Self) -> Self {
        Self::Provision { database: database.into(), stage, source: Box::new(source) }
    }

    /// Collapse collected cleanup failures into a single result.
    ///
    /// Returns `Ok(())` when `errors` is empty.
    pub fn teardown<S: Into<String>>(operation: S, errors: Vec<PgTestKitError>) -> Result<()> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Self::Teardown { operation: operation.into(), errors })
        }
    }

    /// Add context to an error
    pub(crate) fn add_context(&mut self, context: &str) {
        match self {
            PgTestKitError::Io { context: ctx, .. }
            | PgTestKitError::Database { context: ctx, .. } => {
                *ctx = format!("{}: {}", context, ctx);
            }
            PgTestKitError::Process { message: msg, .. }
            | PgTestKitError::Connector { message: msg, .. } => {
                *msg = format!("{}: {}", context, msg);
            }
            _ => {}
        }
    }

    /// Whether this error means the server was never (or is no longer) usable
    pub fn is_lifecycle_error(&self) -> bool {
        matches!(
            self,
            PgTestKitError::ServerAlreadyStopped
                | PgTestKitError::ServerNotRunning
                | PgTestKitError::StartFailed { .. }
        )
    }
}

/// Extension trait for attaching context to results
pub trait ErrorContext<T> {
    /// Prefix the error (when present) with `context`
    fn context(self, context: &str) -> Result<T>;
}

impl<T> ErrorContext<T> for Result<T> {
    fn context(self, context: &str) -> Result<T> {
        self.map_err(|mut e| {
            e.add_context(context);
            e
        })
    }
}

// Error conversions for common external error types
impl From<sqlx::Error> for PgTestKitError {
    fn from(error: sqlx::Error) -> Self {
        Self::Database { source: error, context: "Database operation failed".to_string() }
    }
}

impl From<std::io::Error> for PgTestKitError {
    fn from(error: std::io::Error) -> Self {
        Self::Io { source: error, context: "I/O operation failed".to_string() }
    }
}

impl From<postgresql_embedded::Error> for PgTestKitError {
    fn from(error: postgresql_embedded::Error) -> Self {
        Self::process_with_source("Embedded PostgreSQL operation failed", Box::new(error))
    }
}

impl From<config::ConfigError> for PgTestKitError {
    fn from(error: config::ConfigError) -> Self {
        Self::config_with_source("Configuration loading failed", Box::new(error))
    }
}

impl From<validator::ValidationErrors> for PgTestKitError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::validation(format!("Validation failed: {}", message))
    }
}
