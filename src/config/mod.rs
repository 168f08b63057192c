//! # Configuration Management
//!
//! Server start and logging configuration, loaded from defaults, an optional
//! TOML file and `PGTESTKIT_*` environment variables.

pub mod settings;

pub use settings::{
    LogFormat, LoggingConfig, ServerConfig, DEFAULT_DATABASE, DEFAULT_LOCALE, DEFAULT_PASSWORD,
    DEFAULT_USER, DEFAULT_VERSION, ENV_CONFIG_FILE, ENV_PREFIX,
};
