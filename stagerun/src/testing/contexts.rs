//! Context builders for tests.

use super::ScriptedCommandRunner;
use crate::cancellation::CancellationToken;
use crate::context::{PipelineContext, RunIdentity, StageContext};
use crate::events::{EventSink, NoOpEventSink};
use crate::process::{CommandRunner, LocalCommandRunner};
use crate::scopes::{ActiveScope, ScopeEnv};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A scope environment backed by a [`ScriptedCommandRunner`] that accepts everything.
#[must_use]
pub fn scope_env() -> ScopeEnv {
    scope_env_with(Arc::new(ScriptedCommandRunner::new()), "test")
}

/// A scope environment using `runner`.
#[must_use]
pub fn scope_env_with(runner: Arc<dyn CommandRunner>, job_name: &str) -> ScopeEnv {
    ScopeEnv {
        runner,
        workspace: PathBuf::from("/ws"),
        job_name: job_name.to_string(),
        env: BTreeMap::new(),
        cancel: Arc::new(CancellationToken::new()),
    }
}

/// A stage context named `test` over `workspace`, with a scripted runner.
#[must_use]
pub fn stage_context(workspace: &Path) -> StageContext {
    stage_context_with(workspace, Arc::new(ScriptedCommandRunner::new()), Vec::new())
}

/// A stage context named `test` with the given runner and scopes.
#[must_use]
pub fn stage_context_with(
    workspace: &Path,
    runner: Arc<dyn CommandRunner>,
    scopes: Vec<ActiveScope>,
) -> StageContext {
    let pipeline = PipelineContext::new(RunIdentity::new("test"), workspace, runner);
    StageContext::new(Arc::new(pipeline), "test", scopes)
}

/// A stage context that really runs commands.
///
/// The workspace is `<root>/ws` (created) and artifacts go to
/// `<root>/artifacts`.
///
/// # Panics
///
/// Panics if the workspace cannot be created.
#[must_use]
pub fn local_stage_context(root: &Path) -> StageContext {
    local_stage_context_with_sink(root, Arc::new(NoOpEventSink))
}

/// Like [`local_stage_context`], reporting stage events to `sink`.
///
/// # Panics
///
/// Panics if the workspace cannot be created.
#[must_use]
pub fn local_stage_context_with_sink(root: &Path, sink: Arc<dyn EventSink>) -> StageContext {
    let workspace = root.join("ws");
    std::fs::create_dir_all(&workspace).expect("create test workspace");
    let pipeline = PipelineContext::new(
        RunIdentity::new("test"),
        workspace,
        Arc::new(LocalCommandRunner::new()),
    )
    .with_artifacts_dir(root.join("artifacts"))
    .with_event_sink(sink);
    StageContext::new(Arc::new(pipeline), "test", Vec::new())
}

/// Writes a shell script into the stage's workspace.
///
/// # Panics
///
/// Panics if the file cannot be written.
pub fn write_script(ctx: &StageContext, relative: &str, body: &str) {
    let path = ctx.workspace_path(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create script directory");
    }
    std::fs::write(&path, body).expect("write script");
}
