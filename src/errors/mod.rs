//! # Error Handling
//!
//! Error types shared by the server lifecycle, the provisioner and connectors.

pub mod types;

pub use types::{ErrorContext, PgTestKitError, ProvisionStage, Result};

/// Short alias used across the crate
pub type Error = PgTestKitError;
