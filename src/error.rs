//! Error types for leak profiling runs.
//!
//! Failures are split by blast radius: a metric or operation failure aborts only
//! its owning scenario, while an unreachable service aborts the whole run.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for profiler operations.
pub type Result<T> = std::result::Result<T, ProfilerError>;

/// Unified error type for all profiler operations.
#[derive(Debug, Error)]
pub enum ProfilerError {
    // Measurement errors
    #[error("memory metric unavailable: {reason}")]
    UnavailableMetric { reason: String },

    // Scenario errors
    #[error("scenario '{scenario}' failed at iteration {iteration}: {cause}")]
    OperationFailed {
        scenario: String,
        iteration: u32,
        cause: Box<ProfilerError>,
    },

    #[error("scenario '{scenario}' teardown failed: {cause}")]
    Teardown {
        scenario: String,
        cause: Box<ProfilerError>,
    },

    #[error("command {command} failed: {reason}")]
    Command { command: String, reason: String },

    // Service lifecycle errors
    #[error("service unreachable: {reason}")]
    ServiceUnreachable { reason: String },

    // Configuration errors
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read config file '{path}': {reason}")]
    ConfigRead { path: PathBuf, reason: String },

    #[error("failed to parse config file '{path}': {reason}")]
    ConfigParse { path: PathBuf, reason: String },

    // Output errors
    #[error("failed to write report: {0}")]
    ReportWrite(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProfilerError {
    /// Create an unavailable metric error.
    pub fn unavailable_metric(reason: impl Into<String>) -> Self {
        Self::UnavailableMetric {
            reason: reason.into(),
        }
    }

    /// Wrap a failure raised while running one iteration of a scenario.
    pub fn operation_failed(scenario: impl Into<String>, iteration: u32, cause: Self) -> Self {
        Self::OperationFailed {
            scenario: scenario.into(),
            iteration,
            cause: Box::new(cause),
        }
    }

    /// Wrap a failure raised while clearing scenario state.
    pub fn teardown(scenario: impl Into<String>, cause: Self) -> Self {
        Self::Teardown {
            scenario: scenario.into(),
            cause: Box::new(cause),
        }
    }

    /// Create a command failure error.
    pub fn command(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Command {
            command: command.into(),
            reason: reason.into(),
        }
    }

    /// Create a service unreachable error.
    pub fn service_unreachable(reason: impl Into<String>) -> Self {
        Self::ServiceUnreachable {
            reason: reason.into(),
        }
    }

    /// Whether this error must abort the entire run rather than a single scenario.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ServiceUnreachable { .. }
                | Self::InvalidConfig(_)
                | Self::ConfigRead { .. }
                | Self::ConfigParse { .. }
        )
    }

    /// The iteration index carried by an operation failure, if any.
    #[must_use]
    pub const fn failed_iteration(&self) -> Option<u32> {
        match self {
            Self::OperationFailed { iteration, .. } => Some(*iteration),
            _ => None,
        }
    }
}
