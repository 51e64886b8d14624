//! Pipeline and stage execution contexts.

use super::RunIdentity;
use crate::cancellation::CancellationToken;
use crate::core::StageEvent;
use crate::errors::{Result, StagerunError};
use crate::events::{EventSink, NoOpEventSink};
use crate::process::{CommandOutput, CommandRunner, ShellCommand};
use crate::scopes::{ActiveScope, ScopeEnv};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Behavior shared by pipeline and stage contexts.
pub trait ExecutionContext: Send + Sync {
    /// Returns the run ID.
    fn run_id(&self) -> Uuid;

    /// Returns the workspace directory.
    fn workspace(&self) -> &Path;

    /// Emits a lifecycle event to the configured sink.
    fn try_emit_event(&self, event: &StageEvent);

    /// Checks if the run has been aborted.
    fn is_cancelled(&self) -> bool;
}

/// Context shared by every stage of one run.
pub struct PipelineContext {
    identity: RunIdentity,
    workspace: PathBuf,
    artifacts_dir: PathBuf,
    env: BTreeMap<String, String>,
    runner: Arc<dyn CommandRunner>,
    event_sink: Arc<dyn EventSink>,
    cancel: Arc<CancellationToken>,
}

impl PipelineContext {
    /// Creates a context for `workspace`. Artifacts default to
    /// `<workspace>@artifacts`.
    #[must_use]
    pub fn new(
        identity: RunIdentity,
        workspace: impl Into<PathBuf>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        let workspace = workspace.into();
        let mut artifacts = workspace.as_os_str().to_os_string();
        artifacts.push("@artifacts");
        Self {
            identity,
            workspace,
            artifacts_dir: PathBuf::from(artifacts),
            env: BTreeMap::new(),
            runner,
            event_sink: Arc::new(NoOpEventSink),
            cancel: Arc::new(CancellationToken::new()),
        }
    }

    /// Sets the artifacts directory.
    #[must_use]
    pub fn with_artifacts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifacts_dir = dir.into();
        self
    }

    /// Adds an environment variable passed to every command.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Shares an externally owned cancellation token (wired to signals).
    #[must_use]
    pub fn with_cancellation(mut self, cancel: Arc<CancellationToken>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns the run identity.
    #[must_use]
    pub fn identity(&self) -> &RunIdentity {
        &self.identity
    }

    /// Returns the artifacts directory.
    #[must_use]
    pub fn artifacts_dir(&self) -> &Path {
        &self.artifacts_dir
    }

    /// Returns the command runner.
    #[must_use]
    pub fn runner(&self) -> &Arc<dyn CommandRunner> {
        &self.runner
    }

    /// Returns the event sink.
    #[must_use]
    pub fn event_sink(&self) -> &Arc<dyn EventSink> {
        &self.event_sink
    }

    /// Returns the cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> &Arc<CancellationToken> {
        &self.cancel
    }

    /// Environment every command sees, before scope variables.
    #[must_use]
    pub fn base_env(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert(
            "WORKSPACE".to_string(),
            self.workspace.to_string_lossy().into_owned(),
        );
        env.insert("JOB_NAME".to_string(), self.identity.job_name.clone());
        if let Some(number) = &self.identity.build_number {
            env.insert("BUILD_NUMBER".to_string(), number.clone());
        }
        env.insert("STAGERUN_RUN_ID".to_string(), self.identity.run_id.to_string());
        env.extend(self.env.clone());
        env
    }

    /// What scopes need to acquire and release themselves.
    #[must_use]
    pub fn scope_env(&self) -> ScopeEnv {
        ScopeEnv {
            runner: self.runner.clone(),
            workspace: self.workspace.clone(),
            job_name: self.identity.label(),
            env: self.base_env(),
            cancel: self.cancel.clone(),
        }
    }
}

impl ExecutionContext for PipelineContext {
    fn run_id(&self) -> Uuid {
        self.identity.run_id
    }

    fn workspace(&self) -> &Path {
        &self.workspace
    }

    fn try_emit_event(&self, event: &StageEvent) {
        let emitted = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.event_sink.try_emit(event);
        }));
        if emitted.is_err() {
            warn!(event_type = %event.event_type, "Event sink panicked");
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("identity", &self.identity)
            .field("workspace", &self.workspace)
            .field("artifacts_dir", &self.artifacts_dir)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Context handed to a single stage.
#[derive(Debug, Clone)]
pub struct StageContext {
    pipeline: Arc<PipelineContext>,
    stage_name: String,
    scopes: Vec<ActiveScope>,
}

impl StageContext {
    /// Creates a stage context. `scopes` are ordered outermost first.
    #[must_use]
    pub fn new(
        pipeline: Arc<PipelineContext>,
        stage_name: impl Into<String>,
        scopes: Vec<ActiveScope>,
    ) -> Self {
        Self {
            pipeline,
            stage_name: stage_name.into(),
            scopes,
        }
    }

    /// Returns the stage name.
    #[must_use]
    pub fn stage_name(&self) -> &str {
        &self.stage_name
    }

    /// Returns the pipeline context.
    #[must_use]
    pub fn pipeline(&self) -> &Arc<PipelineContext> {
        &self.pipeline
    }

    /// Returns the active scopes, outermost first.
    #[must_use]
    pub fn scopes(&self) -> &[ActiveScope] {
        &self.scopes
    }

    /// Returns the artifacts directory.
    #[must_use]
    pub fn artifacts_dir(&self) -> &Path {
        self.pipeline.artifacts_dir()
    }

    /// Resolves a workspace-relative path.
    #[must_use]
    pub fn workspace_path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.pipeline.workspace().join(relative)
    }

    /// Applies the run environment, scope variables and scope prefixes.
    ///
    /// Inner scopes override outer environment variables; the outermost
    /// prefix ends up first on the command line.
    #[must_use]
    pub fn prepare(&self, command: ShellCommand) -> ShellCommand {
        let mut env = self.pipeline.base_env();
        for scope in &self.scopes {
            env.extend(scope.env.clone());
        }
        env.extend(command.env.clone());

        let cwd = command
            .cwd
            .clone()
            .unwrap_or_else(|| self.pipeline.workspace().to_path_buf());

        let mut prepared = self.scopes.iter().rev().fold(command, |cmd, scope| {
            cmd.with_prefix(&scope.prefix)
        });
        prepared.env = env;
        prepared.cwd = Some(cwd);
        prepared
    }

    /// Runs a command inside this stage's scopes.
    ///
    /// # Errors
    ///
    /// Propagates spawn failures, timeouts and cancellation. A non-zero exit
    /// is returned as output, not as an error.
    pub async fn run_command(&self, command: ShellCommand) -> Result<CommandOutput> {
        let prepared = self.prepare(command);
        self.pipeline
            .runner()
            .run(&prepared, self.pipeline.cancellation())
            .await
    }

    /// Runs a command and treats a non-zero exit as [`StagerunError::CommandFailed`].
    ///
    /// # Errors
    ///
    /// Everything [`StageContext::run_command`] returns, plus non-zero exits.
    pub async fn run_checked(&self, command: ShellCommand) -> Result<CommandOutput> {
        let rendered = self.prepare(command.clone()).display();
        let output = self.run_command(command).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(StagerunError::CommandFailed {
                command: rendered,
                exit_code: output.code(),
            })
        }
    }

    /// Emits an event tagged with this stage's name.
    pub fn emit(&self, event_type: &str, data: serde_json::Value) {
        let event = StageEvent::new(event_type)
            .add_data("stage", serde_json::json!(self.stage_name))
            .add_data("data", data);
        self.pipeline.try_emit_event(&event);
    }
}

impl ExecutionContext for StageContext {
    fn run_id(&self) -> Uuid {
        self.pipeline.run_id()
    }

    fn workspace(&self) -> &Path {
        self.pipeline.workspace()
    }

    fn try_emit_event(&self, event: &StageEvent) {
        self.pipeline.try_emit_event(event);
    }

    fn is_cancelled(&self) -> bool {
        self.pipeline.is_cancelled()
    }
}
