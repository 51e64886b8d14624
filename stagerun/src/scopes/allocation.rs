//! Scheduler allocation scope.

use super::{render_template, ActiveScope, ExecutionScope, ScopeEnv};
use crate::cancellation::CancellationToken;
use crate::config::SchedulerConfig;
use crate::errors::ScopeError;
use crate::process::ShellCommand;
use async_trait::async_trait;
use regex::Regex;
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable carrying the allocation id inside the scope.
pub const ALLOCATION_ID_ENV: &str = "STAGERUN_ALLOCATION_ID";

/// Holds a compute allocation from the resource scheduler.
///
/// Acquisition runs the allocate command and extracts the allocation id from
/// its output; commands inside the scope are launched through the run
/// template; release cancels the allocation.
#[derive(Debug, Clone)]
pub struct AllocationScope {
    partition: String,
    allocate_template: Vec<String>,
    run_template: Vec<String>,
    release_template: Vec<String>,
    allocation_pattern: String,
    allocate_timeout: Option<Duration>,
}

impl AllocationScope {
    /// Creates an allocation scope from the scheduler settings.
    #[must_use]
    pub fn from_config(partition: impl Into<String>, config: &SchedulerConfig) -> Self {
        Self {
            partition: partition.into(),
            allocate_template: config.allocate_template.clone(),
            run_template: config.run_template.clone(),
            release_template: config.release_template.clone(),
            allocation_pattern: config.allocation_pattern.clone(),
            allocate_timeout: config.allocate_timeout_secs.map(Duration::from_secs),
        }
    }

    fn failed(&self, reason: impl Into<String>) -> ScopeError {
        ScopeError::AllocationFailed {
            partition: self.partition.clone(),
            reason: reason.into(),
        }
    }

    fn command(&self, argv: &[String], env: &ScopeEnv) -> Result<ShellCommand, ScopeError> {
        let mut cmd = ShellCommand::from_argv(argv).ok_or_else(|| ScopeError::Template {
            template: Vec::new(),
            reason: "template is empty".to_string(),
        })?;
        cmd.env = env.env.clone();
        Ok(cmd.cwd(&env.workspace))
    }
}

#[async_trait]
impl ExecutionScope for AllocationScope {
    fn describe(&self) -> String {
        format!("allocation({})", self.partition)
    }

    async fn acquire(&self, env: &ScopeEnv) -> Result<ActiveScope, ScopeError> {
        let pattern = Regex::new(&self.allocation_pattern)
            .map_err(|e| self.failed(format!("invalid allocation pattern: {e}")))?;
        let argv = render_template(
            &self.allocate_template,
            &[("partition", self.partition.as_str()), ("job", env.job_name.as_str())],
        )?;

        let mut cmd = self.command(&argv, env)?;
        if let Some(limit) = self.allocate_timeout {
            cmd = cmd.with_timeout(limit);
        }

        let output = env
            .runner
            .run(&cmd, &env.cancel)
            .await
            .map_err(|e| self.failed(e.to_string()))?;
        if !output.success() {
            return Err(self.failed(format!(
                "`{}` exited with {}: {}",
                cmd.display(),
                output.code(),
                output.stderr.trim()
            )));
        }

        let combined = output.combined();
        let allocation = pattern
            .captures(&combined)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| self.failed("no allocation id in scheduler output"))?;

        let prefix = render_template(&self.run_template, &[("allocation", allocation.as_str())])?;
        info!(partition = %self.partition, %allocation, "Allocation granted");

        Ok(ActiveScope::new(format!("{}#{allocation}", self.describe()))
            .with_prefix(prefix)
            .with_env(ALLOCATION_ID_ENV, allocation.clone())
            .with_handle(allocation))
    }

    async fn release(&self, scope: ActiveScope, env: &ScopeEnv) -> Result<(), ScopeError> {
        let release_failed = |reason: String| ScopeError::ReleaseFailed {
            scope: scope.description.clone(),
            reason,
        };
        let allocation = scope
            .handle
            .clone()
            .ok_or_else(|| release_failed("no allocation id recorded".to_string()))?;

        let argv = render_template(&self.release_template, &[("allocation", allocation.as_str())])?;
        let cmd = self.command(&argv, env)?;

        // Releases also run after an abort, so they get a fresh token.
        let output = env
            .runner
            .run(&cmd, &CancellationToken::new())
            .await
            .map_err(|e| release_failed(e.to_string()))?;
        if !output.success() {
            warn!(%allocation, exit_code = output.code(), "Allocation release failed");
            return Err(release_failed(format!(
                "`{}` exited with {}",
                cmd.display(),
                output.code()
            )));
        }

        info!(partition = %self.partition, %allocation, "Allocation released");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{CommandOutput, MockCommandRunner};
    use crate::testing::scope_env_with;
    use std::sync::Arc;

    fn scope() -> AllocationScope {
        AllocationScope::from_config("batch", &SchedulerConfig::default())
    }

    #[tokio::test]
    async fn test_acquire_parses_allocation_id() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|cmd, _| {
                cmd.argv()
                    == vec!["salloc", "--no-shell", "--partition", "batch", "--job-name", "nightly"]
            })
            .returning(|_, _| {
                Ok(CommandOutput::exited(0).with_stderr("salloc: Granted job allocation 4242\n"))
            });

        let env = scope_env_with(Arc::new(runner), "nightly");
        let active = scope().acquire(&env).await.unwrap();

        assert_eq!(active.description, "allocation(batch)#4242");
        assert_eq!(active.prefix, vec!["srun", "--jobid", "4242"]);
        assert_eq!(active.env.get(ALLOCATION_ID_ENV).map(String::as_str), Some("4242"));
        assert_eq!(active.handle.as_deref(), Some("4242"));
    }

    #[tokio::test]
    async fn test_acquire_fails_without_id() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .returning(|_, _| Ok(CommandOutput::exited(0).with_stderr("salloc: pending\n")));

        let env = scope_env_with(Arc::new(runner), "nightly");
        let err = scope().acquire(&env).await.unwrap_err();
        assert!(matches!(err, ScopeError::AllocationFailed { ref partition, .. } if partition == "batch"));
    }

    #[tokio::test]
    async fn test_acquire_fails_on_non_zero_exit() {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().returning(|_, _| {
            Ok(CommandOutput::exited(1).with_stderr("salloc: error: invalid partition\n"))
        });

        let env = scope_env_with(Arc::new(runner), "nightly");
        let err = scope().acquire(&env).await.unwrap_err();
        assert!(err.to_string().contains("invalid partition"));
    }

    #[tokio::test]
    async fn test_release_runs_scancel_even_when_cancelled() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|cmd, cancel| cmd.argv() == vec!["scancel", "4242"] && !cancel.is_cancelled())
            .times(1)
            .returning(|_, _| Ok(CommandOutput::exited(0)));

        let env = scope_env_with(Arc::new(runner), "nightly");
        env.cancel.cancel("SIGTERM");
        let active = ActiveScope::new("allocation(batch)#4242").with_handle("4242");
        scope().release(active, &env).await.unwrap();
    }

    #[tokio::test]
    async fn test_release_failure_reported() {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().returning(|_, _| Ok(CommandOutput::exited(1)));

        let env = scope_env_with(Arc::new(runner), "nightly");
        let active = ActiveScope::new("allocation(batch)#1").with_handle("1");
        let err = scope().release(active, &env).await.unwrap_err();
        assert!(matches!(err, ScopeError::ReleaseFailed { .. }));
    }
}
