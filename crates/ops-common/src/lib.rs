//! opsctl common types and errors.
//!
//! This crate provides foundational types shared across ops-core modules:
//! - Common error types with stable codes
//! - Output format specifications
//! - Report schema versioning

pub mod error;
pub mod output;

pub use error::{Error, Result};
pub use output::OutputFormat;

/// Version of the diagnostic report JSON schema.
///
/// Bumped whenever the serialized report shape changes in a way consumers
/// can observe.
pub const SCHEMA_VERSION: &str = "1";
