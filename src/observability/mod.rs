//! # Observability
//!
//! Structured logging for the server lifecycle and the provisioner.

pub mod logging;

pub use logging::{init_logging, log_config_info, sanitize_url};
