//! Error types for the capture engine.
//!
//! Every fallible operation in the crate returns [`CaptureError`]. None of the
//! variants are fatal to the capture loop: per-vehicle failures are caught at the
//! vehicle boundary, attributed, and surfaced as [`TickDiagnostic`](crate::TickDiagnostic)
//! entries on the returned status.
//!
//! ## Error Categories
//!
//! - **Source Errors**: the telemetry source is unavailable, failed a read, or timed out
//! - **Sample Errors**: a single vehicle reading could not be normalized
//! - **Process Errors**: the OS process list could not be enumerated
//! - **Configuration Errors**: invalid options, unreadable or unparsable config files
//! - **Handler Errors**: a caller-supplied lap sink rejected a lap
//!
//! Discarded laps are not errors. They are emitted with a
//! [`DiscardReason`](crate::DiscardReason) instead.
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use laplogger::CaptureError;
//!
//! let error = CaptureError::source_unavailable("shared memory not mapped");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::VehicleId;

/// Result type alias for capture operations.
pub type Result<T, E = CaptureError> = std::result::Result<T, E>;

/// Main error type for capture operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CaptureError {
    #[error("Telemetry source unavailable: {reason}")]
    SourceUnavailable { reason: String },

    #[error("Telemetry source failed during {operation}")]
    Source {
        operation: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Malformed sample{}: field '{field}' {details}", vehicle_suffix(.vehicle))]
    MalformedSample { vehicle: Option<VehicleId>, field: String, details: String },

    #[error("Process enumeration failed: {reason}")]
    ProcessEnumeration {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("{operation} timed out after {duration:?}")]
    Timeout { operation: String, duration: Duration },

    #[error("Invalid configuration for '{field}': {details}")]
    Config { field: String, details: String },

    #[error("File error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },

    #[error("Lap sink '{sink}' failed")]
    Handler {
        sink: String,
        #[source]
        source: anyhow::Error,
    },
}

fn vehicle_suffix(vehicle: &Option<VehicleId>) -> String {
    match vehicle {
        Some(id) => format!(" from vehicle {}", id),
        None => String::new(),
    }
}

/// Coarse classification of a [`CaptureError`], cheap to copy into status snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SourceUnavailable,
    Source,
    MalformedSample,
    ProcessEnumeration,
    Timeout,
    Config,
    File,
    Parse,
    Handler,
}

impl CaptureError {
    /// Returns whether this error is expected to clear on a later tick.
    pub fn is_retryable(&self) -> bool {
        match self {
            CaptureError::SourceUnavailable { .. } => true,
            CaptureError::Source { .. } => true,
            CaptureError::MalformedSample { .. } => true,
            CaptureError::ProcessEnumeration { .. } => true,
            CaptureError::Timeout { .. } => true,
            CaptureError::Handler { .. } => true,
            CaptureError::Config { .. } => false,
            CaptureError::File { .. } => false,
            CaptureError::Parse { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            CaptureError::SourceUnavailable { .. } => vec![
                "Ensure the simulation is running and a session is loaded",
                "Check that the shared memory plugin is enabled",
                "Wait for the next tick; the loop retries automatically",
            ],
            CaptureError::Source { .. } => vec![
                "Check the telemetry adapter logs for the failing read",
                "Verify the simulation version matches the adapter",
            ],
            CaptureError::MalformedSample { .. } => vec![
                "Inspect the raw reading for missing or non-finite channels",
                "The vehicle is skipped for this tick only",
            ],
            CaptureError::ProcessEnumeration { .. } => vec![
                "Check process listing permissions",
                "Presence degrades to absent until enumeration recovers",
            ],
            CaptureError::Timeout { .. } => vec![
                "Increase source_timeout_ms",
                "Check system load and simulation responsiveness",
            ],
            CaptureError::Config { .. } => vec![
                "Check the option value against its documented range",
                "Remove the option to fall back to its default",
            ],
            CaptureError::File { .. } => vec![
                "Check file exists and is readable",
                "Check file permissions",
            ],
            CaptureError::Parse { .. } => vec![
                "Check the YAML syntax",
                "Verify option names and value types",
            ],
            CaptureError::Handler { .. } => vec![
                "Check the sink's own logs",
                "Move slow persistence off the tick path with a ChannelSink",
            ],
        }
    }

    /// Classification used for status diagnostics.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CaptureError::SourceUnavailable { .. } => ErrorKind::SourceUnavailable,
            CaptureError::Source { .. } => ErrorKind::Source,
            CaptureError::MalformedSample { .. } => ErrorKind::MalformedSample,
            CaptureError::ProcessEnumeration { .. } => ErrorKind::ProcessEnumeration,
            CaptureError::Timeout { .. } => ErrorKind::Timeout,
            CaptureError::Config { .. } => ErrorKind::Config,
            CaptureError::File { .. } => ErrorKind::File,
            CaptureError::Parse { .. } => ErrorKind::Parse,
            CaptureError::Handler { .. } => ErrorKind::Handler,
        }
    }

    /// Helper constructor for an unavailable source.
    pub fn source_unavailable(reason: impl Into<String>) -> Self {
        CaptureError::SourceUnavailable { reason: reason.into() }
    }

    /// Helper constructor for a failed source read.
    pub fn source_failed(operation: impl Into<String>) -> Self {
        CaptureError::Source { operation: operation.into(), source: None }
    }

    /// Helper constructor for a failed source read with its cause.
    pub fn source_failed_with_source(
        operation: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        CaptureError::Source { operation: operation.into(), source: Some(source) }
    }

    /// Helper constructor for a reading that failed normalization.
    pub fn malformed(
        vehicle: Option<VehicleId>,
        field: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        CaptureError::MalformedSample { vehicle, field: field.into(), details: details.into() }
    }

    /// Helper constructor for process enumeration failures.
    pub fn process_enumeration(reason: impl Into<String>) -> Self {
        CaptureError::ProcessEnumeration { reason: reason.into(), source: None }
    }

    /// Helper constructor for a source call that did not finish in time.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        CaptureError::Timeout { operation: operation.into(), duration }
    }

    /// Helper constructor for invalid configuration.
    pub fn config(field: impl Into<String>, details: impl Into<String>) -> Self {
        CaptureError::Config { field: field.into(), details: details.into() }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        CaptureError::File { path, source }
    }

    /// Helper constructor for a failing lap sink.
    pub fn handler(sink: impl Into<String>, source: anyhow::Error) -> Self {
        CaptureError::Handler { sink: sink.into(), source }
    }
}

impl From<serde_yaml_ng::Error> for CaptureError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        CaptureError::Parse { context: "YAML".to_string(), details: err.to_string() }
    }
}
