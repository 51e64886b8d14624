//! Structured span helpers for pipeline and stage execution.
//!
//! The runner opens one `tracing` span per run and one per stage; these types
//! carry the attributes attached to those spans and to the summary log line
//! written when a stage finishes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

/// Span attributes for a pipeline run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineSpanAttributes {
    /// Pipeline name.
    pub pipeline_name: Option<String>,
    /// Run ID.
    pub run_id: Option<String>,
    /// Job name reported by the automation server.
    pub job_name: Option<String>,
    /// Build number reported by the automation server.
    pub build_number: Option<String>,
}

impl PipelineSpanAttributes {
    /// Creates new pipeline span attributes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the pipeline name.
    #[must_use]
    pub fn with_pipeline_name(mut self, name: impl Into<String>) -> Self {
        self.pipeline_name = Some(name.into());
        self
    }

    /// Sets the run ID.
    #[must_use]
    pub fn with_run_id(mut self, id: impl Into<String>) -> Self {
        self.run_id = Some(id.into());
        self
    }

    /// Sets the job name.
    #[must_use]
    pub fn with_job_name(mut self, job: impl Into<String>) -> Self {
        self.job_name = Some(job.into());
        self
    }

    /// Sets the build number.
    #[must_use]
    pub fn with_build_number(mut self, number: impl Into<String>) -> Self {
        self.build_number = Some(number.into());
        self
    }

    /// Flattens the attributes into dotted keys.
    #[must_use]
    pub fn to_attributes(&self) -> BTreeMap<String, String> {
        let mut attrs = BTreeMap::new();
        let fields = [
            ("pipeline.name", &self.pipeline_name),
            ("pipeline.run_id", &self.run_id),
            ("ci.job_name", &self.job_name),
            ("ci.build_number", &self.build_number),
        ];
        for (key, value) in fields {
            if let Some(v) = value {
                attrs.insert(key.to_string(), v.clone());
            }
        }
        attrs
    }

    /// Opens a `tracing` span carrying these attributes.
    #[must_use]
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "pipeline",
            pipeline = self.pipeline_name.as_deref().unwrap_or(""),
            run_id = self.run_id.as_deref().unwrap_or(""),
            job = self.job_name.as_deref().unwrap_or(""),
            build = self.build_number.as_deref().unwrap_or(""),
        )
    }
}

/// Span attributes for a single stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageSpanAttributes {
    /// Stage name.
    pub stage_name: String,
    /// Descriptions of the scopes the stage ran in, outermost first.
    pub scopes: Vec<String>,
    /// Final stage status.
    pub status: Option<String>,
    /// Duration in milliseconds.
    pub duration_ms: Option<f64>,
    /// Error message if failed.
    pub error: Option<String>,
}

impl StageSpanAttributes {
    /// Creates new stage span attributes.
    #[must_use]
    pub fn new(stage_name: impl Into<String>) -> Self {
        Self {
            stage_name: stage_name.into(),
            ..Default::default()
        }
    }

    /// Sets the scope descriptions.
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Sets the stage status.
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Sets the duration.
    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Sets the error.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Flattens the attributes into dotted keys.
    #[must_use]
    pub fn to_attributes(&self) -> BTreeMap<String, String> {
        let mut attrs = BTreeMap::new();
        attrs.insert("stage.name".to_string(), self.stage_name.clone());
        if !self.scopes.is_empty() {
            attrs.insert("stage.scopes".to_string(), self.scopes.join(" > "));
        }
        if let Some(ref v) = self.status {
            attrs.insert("stage.status".to_string(), v.clone());
        }
        if let Some(v) = self.duration_ms {
            attrs.insert("stage.duration_ms".to_string(), format!("{v:.1}"));
        }
        if let Some(ref v) = self.error {
            attrs.insert("stage.error".to_string(), v.clone());
        }
        attrs
    }

    /// Opens a `tracing` span for the stage.
    #[must_use]
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!("stage", stage = %self.stage_name)
    }

    /// Logs the finished stage at a level matching its outcome.
    pub fn record(&self) {
        let status = self.status.as_deref().unwrap_or("unknown");
        let duration_ms = self.duration_ms.unwrap_or_default();
        let scopes = self.scopes.join(" > ");
        match &self.error {
            Some(error) => tracing::error!(
                stage = %self.stage_name,
                status,
                duration_ms,
                scopes = %scopes,
                error = %error,
                "Stage finished"
            ),
            None => tracing::info!(
                stage = %self.stage_name,
                status,
                duration_ms,
                scopes = %scopes,
                "Stage finished"
            ),
        }
    }
}

/// Wall-clock timer for a span.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finishes the span and returns the duration.
    #[must_use]
    pub fn finish(self) -> f64 {
        self.elapsed_ms()
    }
}
