//! Error taxonomy for the orchestrator

use crate::report::ReportError;
use std::path::PathBuf;
use thiserror::Error;

/// Session-level errors
///
/// Only `Configuration` and the report errors ever leave a session as an `Err`.
/// Tool invocation failures are absorbed into failed step results and
/// cancellation is reported through the session outcome.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Malformed target, step or resource shape; raised before execution starts
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A subprocess could not be run or did not succeed
    #[error("Tool invocation failed in step '{step}': {message}")]
    ToolInvocation { step: String, message: String },

    /// The session was interrupted by the user or by its wall-clock ceiling
    #[error("Session cancelled: {reason}")]
    SessionCancelled { reason: String },

    /// The report could not be written to disk
    #[error("Failed to write report to {path}: {source}")]
    ReportWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The report could not be rendered
    #[error("Report error: {0}")]
    Report(#[from] ReportError),
}

impl OrchestratorError {
    pub fn config(message: impl Into<String>) -> Self {
        OrchestratorError::Configuration(message.into())
    }

    /// Whether this error should terminate the process with a non-zero code
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            OrchestratorError::Configuration(_)
                | OrchestratorError::ReportWrite { .. }
                | OrchestratorError::Report(_)
        )
    }
}

/// Errors raised while loading project or pricing files
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Invalid(String),
}

impl From<ConfigError> for OrchestratorError {
    fn from(err: ConfigError) -> Self {
        OrchestratorError::Configuration(err.to_string())
    }
}

pub type Result<T, E = OrchestratorError> = std::result::Result<T, E>;
