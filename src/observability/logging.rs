//! # Structured Logging
//!
//! Subscriber setup and span helpers on top of the tracing ecosystem.
//!
//! The library itself only emits `tracing` events. Hosts (the CLI, a custom
//! test harness) decide whether and how they are rendered by calling
//! [`init_logging`]. JSON lines are the default; `ENV=development` or
//! `PGTESTKIT_LOG_FORMAT=pretty` switches to a human-readable format.

use crate::config::{LogFormat, LoggingConfig, ServerConfig};
use tracing_subscriber::{fmt, EnvFilter};

/// Create a tracing span for an administrative database operation.
///
/// ```rust,ignore
/// let span = db_span!("create_database", database = %name);
/// ```
#[macro_export]
macro_rules! db_span {
    ($operation:expr) => {
        tracing::debug_span!(
            "db_operation",
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
    ($operation:expr, $($field:tt)*) => {
        tracing::debug_span!(
            "db_operation",
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Install the global subscriber described by `config`.
///
/// Returns `true` when a subscriber was installed by this call. Disabled
/// logging, or a subscriber already set elsewhere (e.g. by a test harness),
/// yields `false`.
pub fn init_logging(config: &LoggingConfig) -> bool {
    if !config.enabled {
        return false;
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let result = match config.format {
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_file(true)
            .with_line_number(true)
            .try_init(),
        LogFormat::Pretty => fmt()
            .pretty()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
    };

    result.is_ok()
}

/// Log server configuration at startup
pub fn log_config_info(config: &ServerConfig) {
    tracing::info!(
        username = %config.username,
        database = %config.database,
        version = %config.version,
        locale = %config.locale,
        port = ?config.port,
        runtime_dir = ?config.runtime_dir,
        handle_signals = config.handle_signals,
        "pgtestkit server configuration"
    );
}

/// Sanitize a connection URL for logging (hide credentials)
pub fn sanitize_url(url: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url) {
        if parsed.password().is_some() || !parsed.username().is_empty() {
            let port = parsed.port().map(|p| format!(":{}", p)).unwrap_or_default();
            format!(
                "{}://***:***@{}{}{}",
                parsed.scheme(),
                parsed.host_str().unwrap_or("unknown"),
                port,
                parsed.path()
            )
        } else {
            url.to_string()
        }
    } else {
        url.to_string()
    }
}
