//! Error types for the stagerun pipeline runner.
//!
//! Every failure a stage can surface maps onto one variant of
//! [`StagerunError`]. The runner never retries; an error fails the stage,
//! skips the remaining stages and leaves the cleanup stage to run.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StagerunError>;

/// The main error type for stagerun operations.
#[derive(Debug, Error)]
pub enum StagerunError {
    /// The pipeline definition is invalid.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// The configuration is invalid.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A scoped execution context could not be acquired or released.
    #[error("{0}")]
    Scope(#[from] ScopeError),

    /// A command exited with a non-zero status.
    #[error("Command `{command}` failed with exit code {exit_code}")]
    CommandFailed {
        /// The rendered command line.
        command: String,
        /// The exit code, or -1 when the process was killed by a signal.
        exit_code: i32,
    },

    /// A command did not finish within its timeout.
    #[error("Command `{command}` timed out after {timeout_secs}s")]
    CommandTimeout {
        /// The rendered command line.
        command: String,
        /// The configured timeout.
        timeout_secs: u64,
    },

    /// The style checker reported more new warnings than allowed.
    #[error("Lint gate failed: {new_warnings} new warning(s), threshold {threshold}")]
    LintViolations {
        /// Number of warnings not present in the baseline.
        new_warnings: usize,
        /// Maximum number of new warnings tolerated.
        threshold: usize,
    },

    /// The build output contains more compiler warnings than allowed.
    #[error("Compiler warning gate failed: {total} warning(s), threshold {threshold}")]
    CompilerWarnings {
        /// Number of warnings after exclusions.
        total: usize,
        /// Maximum number of warnings tolerated.
        threshold: usize,
    },

    /// The test report contains failed or errored test cases.
    #[error("Test report has {failed} failed and {errored} errored case(s) out of {total}")]
    TestFailures {
        /// Number of failed test cases.
        failed: usize,
        /// Number of errored test cases.
        errored: usize,
        /// Total number of test cases.
        total: usize,
    },

    /// A report could not be located or parsed.
    #[error("{0}")]
    Report(#[from] ReportError),

    /// The run was aborted.
    #[error("Pipeline aborted: {0}")]
    Cancelled(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StagerunError {
    /// Returns a stable, machine-readable name for the error category.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Config(_) => "config",
            Self::Scope(_) => "scope",
            Self::CommandFailed { .. } => "command_failed",
            Self::CommandTimeout { .. } => "command_timeout",
            Self::LintViolations { .. } => "lint_violations",
            Self::CompilerWarnings { .. } => "compiler_warnings",
            Self::TestFailures { .. } => "test_failures",
            Self::Report(_) => "report",
            Self::Cancelled(_) => "cancelled",
            Self::Serialization(_) => "serialization",
            Self::Io(_) => "io",
        }
    }

    /// Returns true if the error represents an external abort.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

impl From<serde_json::Error> for StagerunError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Diagnostic metadata attached to validation errors.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ErrorInfo {
    /// Error code (e.g., "PIPELINE-DUPLICATE_STAGE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }
}

/// Error raised when a pipeline definition is rejected.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional diagnostic info.
    pub error_info: Option<ErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the diagnostic info.
    #[must_use]
    pub fn with_error_info(mut self, info: ErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}

/// Errors raised while acquiring or releasing a scoped execution context.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScopeError {
    /// The host does not carry the requested machine label.
    #[error("No executor matches label '{label}' (host labels: {})", available.join(", "))]
    LabelUnavailable {
        /// The requested label.
        label: String,
        /// Labels carried by this host.
        available: Vec<String>,
    },

    /// The isolation runtime is not installed.
    #[error("Isolation runtime '{program}' not found on PATH")]
    RuntimeUnavailable {
        /// The runtime program name.
        program: String,
    },

    /// The scheduler refused or failed to grant an allocation.
    #[error("Allocation on partition '{partition}' failed: {reason}")]
    AllocationFailed {
        /// The requested partition.
        partition: String,
        /// Why the allocation failed.
        reason: String,
    },

    /// Releasing a scope failed.
    #[error("Releasing {scope} failed: {reason}")]
    ReleaseFailed {
        /// Description of the scope.
        scope: String,
        /// Why the release failed.
        reason: String,
    },

    /// A command template references an unknown placeholder or is empty.
    #[error("Invalid command template {template:?}: {reason}")]
    Template {
        /// The offending template.
        template: Vec<String>,
        /// What is wrong with it.
        reason: String,
    },
}

/// Errors raised while locating or parsing reports and logs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReportError {
    /// No file matched the report pattern.
    #[error("No report matches '{pattern}'")]
    NotFound {
        /// The glob pattern that was searched.
        pattern: String,
    },

    /// A report exists but cannot be parsed.
    #[error("Malformed report {}: {reason}", path.display())]
    Malformed {
        /// The report path.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// The requested warning parser does not exist.
    #[error("Unknown warning parser '{name}'")]
    UnknownParser {
        /// The requested parser name.
        name: String,
    },

    /// A glob or regex pattern is invalid.
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },
}
