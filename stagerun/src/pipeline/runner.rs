//! Sequential, fail-fast pipeline execution with guaranteed cleanup.

use super::StageSpec;
use crate::cancellation::{run_with_cleanup, CleanupReport};
use crate::context::{ExecutionContext, PipelineContext, StageContext};
use crate::core::{RunStatus, StageEvent, StageOutput, StageStatus};
use crate::errors::{Result, StagerunError};
use crate::observability::{PipelineSpanAttributes, SpanTimer, StageSpanAttributes};
use crate::scopes::ScopeStack;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

/// What happened to one stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    /// Stage name.
    pub name: String,
    /// Scopes the stage ran in, outermost first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
    /// Wall-clock duration, scope acquisition and release included.
    pub duration_ms: f64,
    /// The stage output (status, data, artifacts, error).
    pub output: StageOutput,
    /// Scopes whose release failed, with the reason.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub release_failures: Vec<(String, String)>,
}

impl StageRecord {
    fn skipped(name: &str, reason: &str) -> Self {
        Self {
            name: name.to_string(),
            scopes: Vec::new(),
            duration_ms: 0.0,
            output: StageOutput::skip(reason),
            release_failures: Vec::new(),
        }
    }

    /// The stage status.
    #[must_use]
    pub fn status(&self) -> StageStatus {
        self.output.status
    }
}

/// The first stage that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Stage name.
    pub stage: String,
    /// Error message.
    pub error: String,
    /// Error category, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl FailureRecord {
    fn from_record(record: &StageRecord) -> Self {
        Self {
            stage: record.name.clone(),
            error: record.output.reason().unwrap_or("failed").to_string(),
            kind: record.output.error_kind.clone(),
        }
    }
}

/// Summary of a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// Run ID.
    pub run_id: Uuid,
    /// Pipeline name.
    pub pipeline: String,
    /// Job label, e.g. `nightly#42`.
    pub job: String,
    /// Final status.
    pub status: RunStatus,
    /// Stages that actually started, cleanup included, in order.
    pub execution_order: Vec<String>,
    /// One record per regular stage, in declared order.
    pub stages: Vec<StageRecord>,
    /// The cleanup stage.
    pub cleanup: StageRecord,
    /// The first failure, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_failure: Option<FailureRecord>,
    /// Abort reason, if the run was aborted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
    /// When the run started (ISO 8601).
    pub started_at: String,
    /// Total duration in milliseconds.
    pub duration_ms: f64,
}

impl RunResult {
    /// Returns true if the run succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Finds a stage record by name, cleanup included.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageRecord> {
        self.stages
            .iter()
            .chain(std::iter::once(&self.cleanup))
            .find(|r| r.name == name)
    }

    /// Serializes the result as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if a stage produced unserializable data.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Writes the JSON summary to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an IO or serialization error.
    pub async fn write_summary(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, self.to_json()?).await?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Progress {
    order: Vec<String>,
    records: Vec<StageRecord>,
    first_failure: Option<FailureRecord>,
    abort_reason: Option<String>,
}

impl Progress {
    fn halt_reason(&self) -> Option<String> {
        if let Some(reason) = &self.abort_reason {
            return Some(format!("pipeline aborted: {reason}"));
        }
        self.first_failure
            .as_ref()
            .map(|f| format!("stage '{}' failed", f.stage))
    }
}

/// A validated, ordered list of stages plus a cleanup stage.
#[derive(Debug, Clone)]
pub struct Pipeline {
    name: String,
    stages: Vec<StageSpec>,
    cleanup: StageSpec,
    release_timeout: Duration,
}

impl Pipeline {
    pub(crate) fn new(
        name: String,
        stages: Vec<StageSpec>,
        cleanup: StageSpec,
        release_timeout: Duration,
    ) -> Self {
        Self {
            name,
            stages,
            cleanup,
            release_timeout,
        }
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the regular stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    /// Names of the regular stages in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Name of the cleanup stage.
    #[must_use]
    pub fn cleanup_name(&self) -> &str {
        &self.cleanup.name
    }

    /// Runs every stage in order, stopping at the first failure or abort,
    /// then runs the cleanup stage exactly once.
    pub async fn run(&self, ctx: Arc<PipelineContext>) -> RunResult {
        let identity = ctx.identity().clone();
        let mut attrs = PipelineSpanAttributes::new()
            .with_pipeline_name(&self.name)
            .with_run_id(identity.run_id.to_string())
            .with_job_name(&identity.job_name);
        if let Some(number) = &identity.build_number {
            attrs = attrs.with_build_number(number);
        }

        self.run_inner(ctx, identity.label(), identity.started_at)
            .instrument(attrs.span())
            .await
    }

    async fn run_inner(&self, ctx: Arc<PipelineContext>, job: String, started_at: String) -> RunResult {
        let timer = SpanTimer::start(self.name.clone());
        let run_id = ctx.run_id();
        ctx.try_emit_event(&StageEvent::pipeline_started(&self.name, &run_id.to_string()));
        info!(pipeline = %self.name, %run_id, stages = self.stages.len(), "Pipeline started");

        let (progress, cleanup) = run_with_cleanup(self.run_stages(&ctx), || {
            self.run_stage(&self.cleanup, &ctx, false)
        })
        .await;

        let Progress {
            mut order,
            records,
            mut first_failure,
            abort_reason,
        } = progress;
        order.push(cleanup.name.clone());

        let cleanup_failed = cleanup.status().is_failure();
        if cleanup_failed {
            warn!(
                stage = %cleanup.name,
                error = cleanup.output.reason().unwrap_or("failed"),
                "Cleanup stage failed"
            );
        }

        let status = if abort_reason.is_some() {
            RunStatus::Aborted
        } else if first_failure.is_some() {
            RunStatus::Failed
        } else if cleanup_failed {
            first_failure = Some(FailureRecord::from_record(&cleanup));
            RunStatus::Failed
        } else {
            RunStatus::Success
        };

        let duration_ms = timer.finish();
        ctx.try_emit_event(&StageEvent::pipeline_completed(
            &self.name,
            &status.to_string(),
            duration_ms,
        ));
        info!(
            pipeline = %self.name,
            %status,
            duration_ms,
            failed_stage = first_failure.as_ref().map_or("", |f| f.stage.as_str()),
            "Pipeline finished"
        );

        RunResult {
            run_id,
            pipeline: self.name.clone(),
            job,
            status,
            execution_order: order,
            stages: records,
            cleanup,
            first_failure,
            abort_reason,
            started_at,
            duration_ms,
        }
    }

    async fn run_stages(&self, ctx: &Arc<PipelineContext>) -> Progress {
        let mut progress = Progress::default();

        for spec in &self.stages {
            if progress.halt_reason().is_none() {
                if let Some(reason) = ctx.cancellation().reason() {
                    info!(stage = %spec.name, %reason, "Run aborted before stage");
                    progress.abort_reason = Some(reason);
                }
            }
            if let Some(reason) = progress.halt_reason() {
                ctx.try_emit_event(&StageEvent::skipped(&spec.name, &reason));
                progress.records.push(StageRecord::skipped(&spec.name, &reason));
                continue;
            }

            progress.order.push(spec.name.clone());
            let record = self.run_stage(spec, ctx, true).await;
            match record.status() {
                StageStatus::Fail => {
                    progress.first_failure = Some(FailureRecord::from_record(&record));
                }
                StageStatus::Cancel => {
                    progress.abort_reason = Some(
                        record
                            .output
                            .cancel_reason
                            .clone()
                            .or_else(|| ctx.cancellation().reason())
                            .unwrap_or_else(|| "cancelled".to_string()),
                    );
                }
                _ => {}
            }
            progress.records.push(record);
        }

        progress
    }

    /// Runs one stage inside its scopes.
    ///
    /// With `abortable` set, a failure observed while the run is cancelled
    /// is reported as a cancellation.
    async fn run_stage(&self, spec: &StageSpec, ctx: &Arc<PipelineContext>, abortable: bool) -> StageRecord {
        let span = StageSpanAttributes::new(&spec.name).span();
        self.run_stage_inner(spec, ctx, abortable).instrument(span).await
    }

    async fn run_stage_inner(
        &self,
        spec: &StageSpec,
        ctx: &Arc<PipelineContext>,
        abortable: bool,
    ) -> StageRecord {
        let timer = SpanTimer::start(spec.name.clone());
        ctx.try_emit_event(&StageEvent::started(&spec.name));

        let env = ctx.scope_env();
        let mut release_failures = Vec::new();
        let (mut output, scopes) =
            match ScopeStack::enter(&spec.scopes, &env, self.release_timeout).await {
                Ok(stack) => {
                    let scopes = stack.descriptions();
                    for scope in &scopes {
                        ctx.try_emit_event(&StageEvent::scope_acquired(&spec.name, scope));
                    }
                    let stage_ctx =
                        StageContext::new(ctx.clone(), spec.name.clone(), stack.active().to_vec());
                    let output = execute_guarded(spec, &stage_ctx).await;

                    let report = stack.exit(self.release_timeout).await;
                    note_releases(ctx, &spec.name, &report, &mut release_failures);
                    (output, scopes)
                }
                Err((err, report)) => {
                    note_releases(ctx, &spec.name, &report, &mut release_failures);
                    let output = match ctx.cancellation().reason() {
                        Some(reason) if abortable => StageOutput::cancel(reason),
                        _ => StageOutput::from_error(&StagerunError::Scope(err)),
                    };
                    (output, Vec::new())
                }
            };

        if output.is_success() {
            if let Some((_, reason)) = release_failures.first() {
                output.status = StageStatus::Fail;
                output.error = Some(reason.clone());
                output.error_kind = Some("scope".to_string());
            }
        }
        if abortable && output.status == StageStatus::Fail {
            if let Some(reason) = ctx.cancellation().reason() {
                output = StageOutput::cancel(reason)
                    .with_artifacts(output.artifacts)
                    .with_events(output.events);
            }
        }

        let duration_ms = timer.finish();
        emit_outcome(ctx.as_ref(), &spec.name, &output, duration_ms);

        let mut attrs = StageSpanAttributes::new(&spec.name)
            .with_scopes(scopes.clone())
            .with_status(output.status.to_string())
            .with_duration_ms(duration_ms);
        if output.status == StageStatus::Fail {
            attrs = attrs.with_error(output.reason().unwrap_or("failed"));
        }
        attrs.record();

        StageRecord {
            name: spec.name.clone(),
            scopes,
            duration_ms,
            output,
            release_failures,
        }
    }
}

async fn execute_guarded(spec: &StageSpec, ctx: &StageContext) -> StageOutput {
    match std::panic::AssertUnwindSafe(spec.stage.execute(ctx))
        .catch_unwind()
        .await
    {
        Ok(output) => output,
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            warn!(stage = %spec.name, panic = %message, "Stage panicked");
            StageOutput::fail(format!("stage panicked: {message}"))
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn note_releases(
    ctx: &PipelineContext,
    stage: &str,
    report: &CleanupReport,
    failures: &mut Vec<(String, String)>,
) {
    for scope in &report.completed {
        ctx.try_emit_event(&StageEvent::scope_released(stage, scope));
    }
    for (scope, reason) in &report.failed {
        warn!(stage, scope = %scope, %reason, "Scope release failed");
        failures.push((scope.clone(), reason.clone()));
    }
}

fn emit_outcome(ctx: &PipelineContext, stage: &str, output: &StageOutput, duration_ms: f64) {
    let event = match output.status {
        StageStatus::Fail => StageEvent::failed(stage, output.reason().unwrap_or("failed")),
        StageStatus::Cancel => StageEvent::cancelled(stage, output.reason().unwrap_or("cancelled")),
        StageStatus::Skip => StageEvent::skipped(stage, output.reason().unwrap_or("skipped")),
        _ => StageEvent::completed(stage, duration_ms),
    };
    ctx.try_emit_event(&event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunIdentity;
    use crate::events::CollectingEventSink;
    use crate::pipeline::PipelineBuilder;
    use crate::stages::NoOpStage;
    use crate::testing::{ScriptedCommandRunner, RecordingStage};
    use pretty_assertions::assert_eq;

    fn context(sink: Arc<CollectingEventSink>) -> Arc<PipelineContext> {
        Arc::new(
            PipelineContext::new(
                RunIdentity::new("unit").with_build_number("3"),
                "/ws",
                Arc::new(ScriptedCommandRunner::new()),
            )
            .with_event_sink(sink),
        )
    }

    #[tokio::test]
    async fn test_events_follow_stage_lifecycle() {
        let sink = Arc::new(CollectingEventSink::new());
        let log = Arc::default();
        let pipeline = PipelineBuilder::new("ci")
            .stage(Arc::new(RecordingStage::ok("A", Arc::clone(&log))))
            .unwrap()
            .cleanup(StageSpec::from_stage(Arc::new(NoOpStage::new("Z"))))
            .unwrap()
            .build()
            .unwrap();

        let result = pipeline.run(context(sink.clone())).await;

        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.job, "unit#3");
        assert_eq!(
            sink.event_types(),
            vec![
                "pipeline.started",
                "stage.started",
                "stage.completed",
                "stage.started",
                "stage.completed",
                "pipeline.completed",
            ]
        );
    }

    #[tokio::test]
    async fn test_summary_serializes() {
        let pipeline = PipelineBuilder::new("ci")
            .stage(Arc::new(NoOpStage::new("A")))
            .unwrap()
            .cleanup(StageSpec::from_stage(Arc::new(NoOpStage::new("Z"))))
            .unwrap()
            .build()
            .unwrap();
        let result = pipeline.run(context(Arc::new(CollectingEventSink::new()))).await;

        let json: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["execution_order"], serde_json::json!(["A", "Z"]));
        assert_eq!(json["cleanup"]["output"]["status"], "ok");

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out/summary.json");
        result.write_summary(&path).await.unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_panic_message_variants() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("static");
        assert_eq!(panic_message(boxed.as_ref()), "static");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
