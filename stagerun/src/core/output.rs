//! Stage output type with factory methods.

use super::{StageArtifact, StageEvent, StageStatus};
use crate::errors::StagerunError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The output of a stage execution.
///
/// `StageOutput` is immutable once created and provides factory methods
/// for creating outputs with different statuses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageOutput {
    /// The status of the stage execution.
    pub status: StageStatus,

    /// Structured data produced by the stage (warning counts, test totals...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<HashMap<String, serde_json::Value>>,

    /// Artifacts produced by the stage.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<StageArtifact>,

    /// Events emitted by the stage.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<StageEvent>,

    /// Error message (for failed executions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Error category (see [`StagerunError::kind`]).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,

    /// Skip reason (for skipped executions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,

    /// Cancel reason (for cancelled executions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
}

impl Default for StageOutput {
    fn default() -> Self {
        Self::ok_empty()
    }
}

impl StageOutput {
    fn with_status(status: StageStatus) -> Self {
        Self {
            status,
            data: None,
            artifacts: Vec::new(),
            events: Vec::new(),
            error: None,
            error_kind: None,
            skip_reason: None,
            cancel_reason: None,
        }
    }

    /// Creates a successful output with data.
    #[must_use]
    pub fn ok(data: HashMap<String, serde_json::Value>) -> Self {
        Self {
            data: Some(data),
            ..Self::with_status(StageStatus::Ok)
        }
    }

    /// Creates a successful output with no data.
    #[must_use]
    pub fn ok_empty() -> Self {
        Self::with_status(StageStatus::Ok)
    }

    /// Creates a successful output with a single value.
    #[must_use]
    pub fn ok_value(key: impl Into<String>, value: serde_json::Value) -> Self {
        let mut data = HashMap::new();
        data.insert(key.into(), value);
        Self::ok(data)
    }

    /// Creates a skip output with a reason.
    #[must_use]
    pub fn skip(reason: impl Into<String>) -> Self {
        Self {
            skip_reason: Some(reason.into()),
            ..Self::with_status(StageStatus::Skip)
        }
    }

    /// Creates a cancel output with a reason.
    #[must_use]
    pub fn cancel(reason: impl Into<String>) -> Self {
        Self {
            cancel_reason: Some(reason.into()),
            ..Self::with_status(StageStatus::Cancel)
        }
    }

    /// Creates a failure output with an error message.
    #[must_use]
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::with_status(StageStatus::Fail)
        }
    }

    /// Converts an error into a failure (or cancel) output.
    #[must_use]
    pub fn from_error(err: &StagerunError) -> Self {
        if let StagerunError::Cancelled(reason) = err {
            return Self::cancel(reason.clone());
        }
        Self {
            error: Some(err.to_string()),
            error_kind: Some(err.kind().to_string()),
            ..Self::with_status(StageStatus::Fail)
        }
    }

    /// Adds artifacts to the output.
    #[must_use]
    pub fn with_artifacts(mut self, artifacts: Vec<StageArtifact>) -> Self {
        self.artifacts.extend(artifacts);
        self
    }

    /// Adds events to the output.
    #[must_use]
    pub fn with_events(mut self, events: Vec<StageEvent>) -> Self {
        self.events.extend(events);
        self
    }

    /// Adds data to the output (merges with existing data).
    #[must_use]
    pub fn with_data(mut self, data: HashMap<String, serde_json::Value>) -> Self {
        match &mut self.data {
            Some(existing) => existing.extend(data),
            None => self.data = Some(data),
        }
        self
    }

    /// Adds a single data entry.
    #[must_use]
    pub fn add_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value);
        self
    }

    /// Returns true if the output indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns true if the output indicates failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.status.is_failure()
    }

    /// Gets a value from the data.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.as_ref().and_then(|d| d.get(key))
    }

    /// Human-readable reason for a non-ok status.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.error
            .as_deref()
            .or(self.cancel_reason.as_deref())
            .or(self.skip_reason.as_deref())
    }
}
