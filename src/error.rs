//! Error types for the SAN provisioner
//!
//! Provides structured error types for the storage controller and host
//! collaborators, configuration loading, and the remote transports.

use std::time::Duration;
use thiserror::Error;

/// Unified error type for the provisioner
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    // =========================================================================
    // Connection Errors
    // =========================================================================
    #[error("Connection to {target} failed: {reason}")]
    Connection { target: String, reason: String },

    #[error("Authentication rejected by {target}")]
    Authentication { target: String },

    // =========================================================================
    // Operation Errors
    // =========================================================================
    #[error("Operation {operation} failed: {reason}")]
    Operation { operation: String, reason: String },

    #[error("Precondition not met: {0}")]
    Precondition(String),

    #[error("Command `{command}` exited with {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    // =========================================================================
    // Transport / Parse Errors
    // =========================================================================
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of an error, mirroring the failure taxonomy the
/// orchestrator logs against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A remote system was unreachable or refused the credentials
    Connection,
    /// A requested action returned no handle or a failure flag
    Operation,
    /// A resource required by a later step is absent
    Precondition,
    /// Local configuration or input is wrong
    Configuration,
}

impl Error {
    pub(crate) fn connection(target: impl Into<String>, reason: impl ToString) -> Self {
        Error::Connection {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn operation(operation: impl Into<String>, reason: impl ToString) -> Self {
        Error::Operation {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Connection { .. }
            | Error::Authentication { .. }
            | Error::Http(_)
            | Error::Io(_)
            | Error::Timeout { .. } => ErrorKind::Connection,

            Error::Precondition(_) => ErrorKind::Precondition,

            Error::Configuration(_)
            | Error::Validation { .. }
            | Error::YamlParse(_) => ErrorKind::Configuration,

            Error::Operation { .. }
            | Error::CommandFailed { .. }
            | Error::JsonParse(_)
            | Error::Internal(_) => ErrorKind::Operation,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            // Bad credentials will not get better on the next attempt
            Error::Authentication { .. } => false,
            _ => self.is_transient(),
        }
    }

    /// Check if this error is transient
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(e) => {
                e.is_timeout() || e.is_connect() || e.status().map_or(false, |s| s.is_server_error())
            }
            Error::Connection { .. } | Error::Io(_) | Error::Timeout { .. } => true,
            _ => false,
        }
    }
}

/// Result type alias for the provisioner
pub type Result<T> = std::result::Result<T, Error>;
