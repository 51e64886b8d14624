//! Lifecycle events emitted while a pipeline runs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An event emitted during pipeline execution.
///
/// Events are consumed by event sinks for logging or by tests that need
/// to observe ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageEvent {
    /// The event type (e.g., "stage.started", "scope.released").
    #[serde(rename = "type")]
    pub event_type: String,

    /// When the event occurred (ISO 8601).
    pub timestamp: String,

    /// The event payload data.
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
}

impl StageEvent {
    /// Creates a new event.
    #[must_use]
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp: crate::utils::iso_timestamp(),
            data: HashMap::new(),
        }
    }

    /// Adds a data field to the event.
    #[must_use]
    pub fn add_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Returns the payload as a JSON object.
    #[must_use]
    pub fn payload(&self) -> serde_json::Value {
        serde_json::Value::Object(self.data.clone().into_iter().collect())
    }

    /// Creates a "pipeline.started" event.
    #[must_use]
    pub fn pipeline_started(pipeline: &str, run_id: &str) -> Self {
        Self::new("pipeline.started")
            .add_data("pipeline", serde_json::json!(pipeline))
            .add_data("run_id", serde_json::json!(run_id))
    }

    /// Creates a "pipeline.completed" event.
    #[must_use]
    pub fn pipeline_completed(pipeline: &str, status: &str, duration_ms: f64) -> Self {
        Self::new("pipeline.completed")
            .add_data("pipeline", serde_json::json!(pipeline))
            .add_data("status", serde_json::json!(status))
            .add_data("duration_ms", serde_json::json!(duration_ms))
    }

    /// Creates a "stage.started" event.
    #[must_use]
    pub fn started(stage_name: &str) -> Self {
        Self::new("stage.started").add_data("stage", serde_json::json!(stage_name))
    }

    /// Creates a "stage.completed" event.
    #[must_use]
    pub fn completed(stage_name: &str, duration_ms: f64) -> Self {
        Self::new("stage.completed")
            .add_data("stage", serde_json::json!(stage_name))
            .add_data("duration_ms", serde_json::json!(duration_ms))
    }

    /// Creates a "stage.failed" event.
    #[must_use]
    pub fn failed(stage_name: &str, error: &str) -> Self {
        Self::new("stage.failed")
            .add_data("stage", serde_json::json!(stage_name))
            .add_data("error", serde_json::json!(error))
    }

    /// Creates a "stage.skipped" event.
    #[must_use]
    pub fn skipped(stage_name: &str, reason: &str) -> Self {
        Self::new("stage.skipped")
            .add_data("stage", serde_json::json!(stage_name))
            .add_data("reason", serde_json::json!(reason))
    }

    /// Creates a "stage.cancelled" event.
    #[must_use]
    pub fn cancelled(stage_name: &str, reason: &str) -> Self {
        Self::new("stage.cancelled")
            .add_data("stage", serde_json::json!(stage_name))
            .add_data("reason", serde_json::json!(reason))
    }

    /// Creates a "scope.acquired" event.
    #[must_use]
    pub fn scope_acquired(stage_name: &str, scope: &str) -> Self {
        Self::new("scope.acquired")
            .add_data("stage", serde_json::json!(stage_name))
            .add_data("scope", serde_json::json!(scope))
    }

    /// Creates a "scope.released" event.
    #[must_use]
    pub fn scope_released(stage_name: &str, scope: &str) -> Self {
        Self::new("scope.released")
            .add_data("stage", serde_json::json!(stage_name))
            .add_data("scope", serde_json::json!(scope))
    }
}
