//! Error types for the opsctl backend supervisor.
//!
//! This module provides structured error handling with:
//! - Stable error codes for machine parsing
//! - Category classification for error grouping
//! - Recoverability hints for automation
//! - Remediation suggestions for humans
//!
//! # Human-Facing Output
//!
//! Errors can be formatted for human consumption with headline, reason, and fix:
//! ```text
//! ✗ Port Ownership Blocked
//!   Reason: port owner pid 4242 is not a managed backend: java -jar trader.jar
//!   Fix: Inspect the owner with 'opsctl status'. Re-run with '--force' to terminate it anyway.
//! ```
//!
//! # Machine-Facing Output
//!
//! Errors serialize to structured JSON:
//! ```json
//! {
//!   "code": 41,
//!   "category": "lifecycle",
//!   "message": "port owner pid 4242 is not a managed backend: java -jar trader.jar",
//!   "recoverable": false,
//!   "context": { "pid": 4242 }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for opsctl operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Configuration and persisted-state errors (paths, pid record).
    Config,
    /// HTTP probe layer errors.
    Probe,
    /// Port and process inspection errors.
    Inspection,
    /// Process lifecycle errors (spawn, terminate, ownership).
    Lifecycle,
    /// Asynchronous job orchestration errors.
    Job,
    /// File I/O and serialization errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Probe => write!(f, "probe"),
            ErrorCategory::Inspection => write!(f, "inspection"),
            ErrorCategory::Lifecycle => write!(f, "lifecycle"),
            ErrorCategory::Job => write!(f, "job"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Unified error type for opsctl.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid pid record: {0}")]
    InvalidPidRecord(String),

    #[error("backend interpreter not found: {}", path.display())]
    MissingInterpreter { path: PathBuf },

    // Probe errors (20-29)
    #[error("probe error: {0}")]
    Probe(String),

    // Inspection errors (30-39)
    #[error("process inspection unavailable: {0}")]
    InspectUnavailable(String),

    #[error("process inspection failed: {0}")]
    InspectFailed(String),

    #[error("process {pid} not found")]
    ProcessNotFound { pid: u32 },

    // Lifecycle errors (40-49)
    #[error("failed to spawn backend: {0}")]
    SpawnFailed(String),

    #[error("port owner pid {pid} is not a managed backend: {cmdline}")]
    OwnershipBlocked { pid: u32, cmdline: String },

    #[error("process {pid} survived SIGKILL")]
    TerminateFailed { pid: u32 },

    #[error("port {port} still has listeners after termination")]
    PortBusy { port: u16 },

    #[error("backend did not become healthy within {seconds}s")]
    NotHealthy { seconds: u64 },

    // Job errors (50-59)
    #[error("job enqueue rejected: {0}")]
    EnqueueRejected(String),

    #[error("job enqueue response did not contain a job id")]
    MissingJobId,

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Configuration errors
    /// - 20-29: Probe errors
    /// - 30-39: Inspection errors
    /// - 40-49: Lifecycle errors
    /// - 50-59: Job errors
    /// - 60-69: I/O errors
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InvalidPidRecord(_) => 11,
            Error::MissingInterpreter { .. } => 12,
            Error::Probe(_) => 20,
            Error::InspectUnavailable(_) => 30,
            Error::InspectFailed(_) => 31,
            Error::ProcessNotFound { .. } => 32,
            Error::SpawnFailed(_) => 40,
            Error::OwnershipBlocked { .. } => 41,
            Error::TerminateFailed { .. } => 42,
            Error::PortBusy { .. } => 43,
            Error::NotHealthy { .. } => 44,
            Error::EnqueueRejected(_) => 50,
            Error::MissingJobId => 51,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) | Error::InvalidPidRecord(_) | Error::MissingInterpreter { .. } => {
                ErrorCategory::Config
            }

            Error::Probe(_) => ErrorCategory::Probe,

            Error::InspectUnavailable(_)
            | Error::InspectFailed(_)
            | Error::ProcessNotFound { .. } => ErrorCategory::Inspection,

            Error::SpawnFailed(_)
            | Error::OwnershipBlocked { .. }
            | Error::TerminateFailed { .. }
            | Error::PortBusy { .. }
            | Error::NotHealthy { .. } => ErrorCategory::Lifecycle,

            Error::EnqueueRejected(_) | Error::MissingJobId => ErrorCategory::Job,

            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Returns whether this error is potentially recoverable.
    ///
    /// Recoverable errors may be resolved by:
    /// - Retrying with a delay
    /// - Restarting the backend
    /// - Fixing configuration and re-running
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Config errors: recoverable by fixing paths/state
            Error::Config(_) => true,
            Error::InvalidPidRecord(_) => true,
            Error::MissingInterpreter { .. } => true,

            // Probe: transient by nature
            Error::Probe(_) => true,

            // Inspection: platform tooling may be installable
            Error::InspectUnavailable(_) => true,
            Error::InspectFailed(_) => true,
            Error::ProcessNotFound { .. } => false, // Process is gone

            // Lifecycle
            Error::SpawnFailed(_) => true,
            Error::OwnershipBlocked { .. } => false, // Needs explicit --force
            Error::TerminateFailed { .. } => false,  // Likely D-state or protected
            Error::PortBusy { .. } => true,
            Error::NotHealthy { .. } => true, // Retry with longer timeout

            // Job
            Error::EnqueueRejected(_) => true,
            Error::MissingJobId => false, // Contract violation

            // I/O: often transient
            Error::Io(_) => true,
            Error::Json(_) => true,
        }
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::Config(_) => {
                "Check --service-root and --state-dir point at valid locations."
            }
            Error::InvalidPidRecord(_) => {
                "Delete the pid file under the state directory and re-run 'opsctl status'."
            }
            Error::MissingInterpreter { .. } => {
                "Create the backend virtualenv under <service-root>/.venv before starting."
            }

            Error::Probe(_) => {
                "Verify the base URL is well formed and the host is reachable."
            }

            Error::InspectUnavailable(_) => {
                "Install 'lsof' and 'ps', or run on a host with a readable /proc filesystem."
            }
            Error::InspectFailed(_) => {
                "Retry the inspection. If persistent, check /proc permissions."
            }
            Error::ProcessNotFound { .. } => {
                "The process exited before the operation completed. This is normal for short-lived processes."
            }

            Error::SpawnFailed(_) => {
                "Check the backend interpreter and module are runnable from the service root."
            }
            Error::OwnershipBlocked { .. } => {
                "Inspect the owner with 'opsctl status'. Re-run with '--force' to terminate it anyway."
            }
            Error::TerminateFailed { .. } => {
                "The process ignored SIGKILL. Check for D-state (uninterruptible sleep) or kernel threads."
            }
            Error::PortBusy { .. } => {
                "Another process re-bound the port. Run 'opsctl status' to see the current owners."
            }
            Error::NotHealthy { .. } => {
                "Check the backend log under the state directory, then retry with a longer '--timeout'."
            }

            Error::EnqueueRejected(_) => {
                "Inspect the enqueue response payload. Run 'opsctl doctor' for a full diagnosis."
            }
            Error::MissingJobId => {
                "The enqueue endpoint must return a job id under 'job_id', 'id', or 'jobId'."
            }

            Error::Io(_) => {
                "Check disk space, permissions, and that the state directory exists. Retry the operation."
            }
            Error::Json(_) => {
                "Invalid JSON in file. Check syntax with 'cat <file> | jq .' or delete and regenerate."
            }
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::Config(_) => "Configuration Error",
            Error::InvalidPidRecord(_) => "Invalid Pid Record",
            Error::MissingInterpreter { .. } => "Backend Interpreter Missing",

            Error::Probe(_) => "Probe Error",

            Error::InspectUnavailable(_) => "Inspection Unavailable",
            Error::InspectFailed(_) => "Inspection Failed",
            Error::ProcessNotFound { .. } => "Process Not Found",

            Error::SpawnFailed(_) => "Backend Spawn Failed",
            Error::OwnershipBlocked { .. } => "Port Ownership Blocked",
            Error::TerminateFailed { .. } => "Termination Failed",
            Error::PortBusy { .. } => "Port Still Busy",
            Error::NotHealthy { .. } => "Backend Not Healthy",

            Error::EnqueueRejected(_) => "Job Enqueue Rejected",
            Error::MissingJobId => "Missing Job Id",

            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Parse Error",
        }
    }
}

/// Structured error response for JSON output.
///
/// Used by machine-readable output modes for error reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Human-readable error message.
    pub message: String,

    /// Whether the error is potentially recoverable.
    pub recoverable: bool,

    /// Additional structured context (e.g., pid, port).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        // Add error-specific context
        match err {
            Error::ProcessNotFound { pid } | Error::TerminateFailed { pid } => {
                context.insert("pid".to_string(), serde_json::json!(pid));
            }
            Error::OwnershipBlocked { pid, cmdline } => {
                context.insert("pid".to_string(), serde_json::json!(pid));
                context.insert("cmdline".to_string(), serde_json::json!(cmdline));
            }
            Error::PortBusy { port } => {
                context.insert("port".to_string(), serde_json::json!(port));
            }
            Error::NotHealthy { seconds } => {
                context.insert("timeout_seconds".to_string(), serde_json::json!(seconds));
            }
            Error::MissingInterpreter { path } => {
                context.insert("path".to_string(), serde_json::json!(path));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
            context,
        }
    }
}

impl StructuredError {
    /// Add additional context to the error.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }

    /// Serialize to pretty JSON string.
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| self.to_json())
    }
}

/// Format an error for human-readable stderr output.
///
/// Output format:
/// ```text
/// ✗ [Headline]
///   Reason: [Error message]
///   Fix: [Remediation hint]
/// ```
pub fn format_error_human(err: &Error, use_color: bool) -> String {
    let (red, cyan, reset) = if use_color {
        ("\x1b[31m", "\x1b[36m", "\x1b[0m")
    } else {
        ("", "", "")
    };

    format!(
        "{red}✗{reset} {headline}\n  Reason: {message}\n  {cyan}Fix:{reset} {remediation}",
        red = red,
        cyan = cyan,
        reset = reset,
        headline = err.headline(),
        message = err,
        remediation = err.remediation()
    )
}
