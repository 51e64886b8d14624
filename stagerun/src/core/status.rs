//! Stage and run status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The outcome of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Completed successfully.
    Ok,
    /// Did not run: an earlier stage failed, the run was aborted, or there was nothing to do.
    Skip,
    /// Interrupted by an external abort.
    Cancel,
    /// Failed.
    Fail,
}

impl StageStatus {
    /// Lowercase name used in logs, events and summaries.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Skip => "skip",
            Self::Cancel => "cancel",
            Self::Fail => "fail",
        }
    }

    /// A skip does not halt the run.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Ok | Self::Skip)
    }

    /// Failures and cancellations halt the run.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The final status of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every stage, including cleanup, succeeded.
    Success,
    /// A stage failed.
    Failed,
    /// The run was aborted from outside.
    Aborted,
}

impl RunStatus {
    /// Process exit code conventionally reported to the automation server.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Failed => 1,
            Self::Aborted => 130,
        }
    }

    /// Returns true if the run succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_status_display() {
        assert_eq!(StageStatus::Ok.to_string(), "ok");
        assert_eq!(StageStatus::Fail.to_string(), "fail");
        assert_eq!(StageStatus::Cancel.to_string(), "cancel");
    }

    #[test]
    fn test_skip_does_not_halt() {
        assert!(StageStatus::Skip.is_success());
        assert!(StageStatus::Cancel.is_failure());
        assert!(!StageStatus::Ok.is_failure());
    }

    #[test]
    fn test_stage_status_serialize() {
        let json = serde_json::to_string(&StageStatus::Skip).unwrap();
        assert_eq!(json, r#""skip""#);
    }

    #[test]
    fn test_run_status_exit_codes() {
        assert_eq!(RunStatus::Success.exit_code(), 0);
        assert_eq!(RunStatus::Failed.exit_code(), 1);
        assert_eq!(RunStatus::Aborted.exit_code(), 130);
        assert_eq!(RunStatus::Aborted.to_string(), "aborted");
    }
}
