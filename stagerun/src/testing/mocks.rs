//! Mock stages, scopes and command runners.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use crate::cancellation::CancellationToken;
use crate::context::StageContext;
use crate::core::StageOutput;
use crate::errors::{Result, ScopeError, StagerunError};
use crate::process::{CommandOutput, CommandRunner, ShellCommand};
use crate::scopes::{ActiveScope, ExecutionScope, ScopeEnv};
use crate::stages::Stage;

/// Shared log of stage names in execution order.
pub type ExecutionLog = Arc<Mutex<Vec<String>>>;

/// A stage that appends its name to a shared log and returns a fixed output.
#[derive(Debug)]
pub struct RecordingStage {
    name: String,
    log: ExecutionLog,
    output: StageOutput,
    calls: Mutex<usize>,
}

impl RecordingStage {
    /// A recording stage that succeeds.
    #[must_use]
    pub fn ok(name: impl Into<String>, log: ExecutionLog) -> Self {
        Self::with_output(name, log, StageOutput::ok_empty())
    }

    /// A recording stage that fails with `error`.
    #[must_use]
    pub fn failing(name: impl Into<String>, log: ExecutionLog, error: impl Into<String>) -> Self {
        Self::with_output(name, log, StageOutput::fail(error))
    }

    /// A recording stage returning `output`.
    #[must_use]
    pub fn with_output(name: impl Into<String>, log: ExecutionLog, output: StageOutput) -> Self {
        Self {
            name: name.into(),
            log,
            output,
            calls: Mutex::new(0),
        }
    }

    /// Number of times the stage ran.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl Stage for RecordingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext) -> StageOutput {
        *self.calls.lock() += 1;
        self.log.lock().push(self.name.clone());
        self.output.clone()
    }
}

/// A stage that always fails.
#[derive(Debug)]
pub struct FailingStage {
    name: String,
    error: String,
}

impl FailingStage {
    /// Creates a new failing stage.
    #[must_use]
    pub fn new(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            error: error.into(),
        }
    }
}

#[async_trait]
impl Stage for FailingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext) -> StageOutput {
        StageOutput::fail(&self.error)
    }
}

/// A stage that panics.
#[derive(Debug)]
pub struct PanickingStage {
    name: String,
}

impl PanickingStage {
    /// Creates a new panicking stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Stage for PanickingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext) -> StageOutput {
        panic!("stage {} exploded", self.name)
    }
}

/// A stage that waits, giving up early if the run is aborted.
#[derive(Debug)]
pub struct SlowStage {
    name: String,
    delay: Duration,
    log: Option<ExecutionLog>,
}

impl SlowStage {
    /// Creates a new slow stage.
    #[must_use]
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
            log: None,
        }
    }

    /// Records the stage name in `log` when it starts.
    #[must_use]
    pub fn recording(mut self, log: ExecutionLog) -> Self {
        self.log = Some(log);
        self
    }
}

#[async_trait]
impl Stage for SlowStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        if let Some(log) = &self.log {
            log.lock().push(self.name.clone());
        }
        let cancel = ctx.pipeline().cancellation();
        tokio::select! {
            () = tokio::time::sleep(self.delay) => StageOutput::ok_empty(),
            () = cancel.cancelled() => StageOutput::cancel(cancel.reason().unwrap_or_default()),
        }
    }
}

/// A scope that logs `acquire <name>` / `release <name>`.
#[derive(Debug)]
pub struct RecordingScope {
    name: String,
    log: ExecutionLog,
    fail_acquire: bool,
    fail_release: bool,
}

impl RecordingScope {
    /// A scope that always acquires and releases.
    #[must_use]
    pub fn new(name: impl Into<String>, log: ExecutionLog) -> Self {
        Self {
            name: name.into(),
            log,
            fail_acquire: false,
            fail_release: false,
        }
    }

    /// A scope whose acquisition fails.
    #[must_use]
    pub fn failing_acquire(name: impl Into<String>, log: ExecutionLog) -> Self {
        Self {
            fail_acquire: true,
            ..Self::new(name, log)
        }
    }

    /// A scope whose release fails.
    #[must_use]
    pub fn failing_release(name: impl Into<String>, log: ExecutionLog) -> Self {
        Self {
            fail_release: true,
            ..Self::new(name, log)
        }
    }
}

#[async_trait]
impl ExecutionScope for RecordingScope {
    fn describe(&self) -> String {
        self.name.clone()
    }

    async fn acquire(&self, _env: &ScopeEnv) -> std::result::Result<ActiveScope, ScopeError> {
        self.log.lock().push(format!("acquire {}", self.name));
        if self.fail_acquire {
            return Err(ScopeError::AllocationFailed {
                partition: self.name.clone(),
                reason: "scripted failure".to_string(),
            });
        }
        Ok(ActiveScope::new(self.name.clone()).with_prefix(vec![format!("[{}]", self.name)]))
    }

    async fn release(&self, scope: ActiveScope, _env: &ScopeEnv) -> std::result::Result<(), ScopeError> {
        self.log.lock().push(format!("release {}", self.name));
        if self.fail_release {
            return Err(ScopeError::ReleaseFailed {
                scope: scope.description,
                reason: "scripted failure".to_string(),
            });
        }
        Ok(())
    }
}

/// A command runner that answers from a script instead of spawning processes.
///
/// Commands are matched by substring of their rendered command line; the
/// first matching rule wins and unmatched commands exit 0.
#[derive(Debug, Default)]
pub struct ScriptedCommandRunner {
    rules: Vec<(String, CommandOutput)>,
    commands: Mutex<Vec<ShellCommand>>,
}

impl ScriptedCommandRunner {
    /// Creates a runner where every command succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers commands containing `needle` with `output`.
    #[must_use]
    pub fn respond(mut self, needle: impl Into<String>, output: CommandOutput) -> Self {
        self.rules.push((needle.into(), output));
        self
    }

    /// Makes commands containing `needle` exit with `code`.
    #[must_use]
    pub fn exit_with(self, needle: impl Into<String>, code: i32) -> Self {
        self.respond(needle, CommandOutput::exited(code))
    }

    /// Rendered command lines seen so far.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().iter().map(ShellCommand::display).collect()
    }

    /// Full commands seen so far, environment included.
    #[must_use]
    pub fn recorded(&self) -> Vec<ShellCommand> {
        self.commands.lock().clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedCommandRunner {
    async fn run(&self, command: &ShellCommand, cancel: &CancellationToken) -> Result<CommandOutput> {
        if let Some(reason) = cancel.reason() {
            return Err(StagerunError::Cancelled(reason));
        }
        self.commands.lock().push(command.clone());

        let rendered = command.display();
        let output = self
            .rules
            .iter()
            .find(|(needle, _)| rendered.contains(needle.as_str()))
            .map_or_else(|| CommandOutput::exited(0), |(_, output)| output.clone());
        Ok(output)
    }
}
