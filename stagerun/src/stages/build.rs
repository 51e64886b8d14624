//! Build and downstream build stages.

use super::{into_output, Stage};
use crate::analysis::archive_file;
use crate::config::{BuildConfig, DownstreamConfig};
use crate::context::{ExecutionContext, StageContext};
use crate::core::{ArtifactKind, StageOutput};
use crate::errors::Result;
use crate::process::ShellCommand;
use async_trait::async_trait;
use tracing::warn;

/// Runs the build script, teeing its output into the build log.
///
/// The log is archived whether or not the build succeeds.
#[derive(Debug, Clone)]
pub struct BuildStage {
    name: String,
    config: BuildConfig,
    shell_debug: bool,
}

impl BuildStage {
    /// Creates a build stage.
    #[must_use]
    pub fn new(name: impl Into<String>, config: BuildConfig, shell_debug: bool) -> Self {
        Self {
            name: name.into(),
            config,
            shell_debug,
        }
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageOutput> {
        let command = ShellCommand::script(&self.config.script, self.shell_debug)
            .log_to(ctx.workspace_path(&self.config.log_file))
            .with_timeout_secs(self.config.timeout_secs);

        let result = ctx.run_checked(command).await;

        let archived = archive_file(
            ctx.workspace(),
            &self.config.log_file,
            ctx.artifacts_dir(),
            ArtifactKind::Log,
        );
        let artifacts = match archived {
            Ok(artifact) => vec![artifact],
            Err(e) => {
                warn!(log = %self.config.log_file, error = %e, "Build log not archived");
                Vec::new()
            }
        };

        match result {
            Ok(output) => Ok(StageOutput::ok_value("duration_ms", serde_json::json!(output.duration_ms))
                .with_artifacts(artifacts)),
            Err(err) => Ok(StageOutput::from_error(&err).with_artifacts(artifacts)),
        }
    }
}

#[async_trait]
impl Stage for BuildStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        into_output(self.run(ctx).await)
    }
}

/// Checks out and builds the downstream project.
#[derive(Debug, Clone)]
pub struct DownstreamBuildStage {
    name: String,
    config: DownstreamConfig,
    shell_debug: bool,
}

impl DownstreamBuildStage {
    /// Creates a downstream build stage.
    #[must_use]
    pub fn new(name: impl Into<String>, config: DownstreamConfig, shell_debug: bool) -> Self {
        Self {
            name: name.into(),
            config,
            shell_debug,
        }
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageOutput> {
        for script in [&self.config.checkout_script, &self.config.build_script] {
            ctx.run_checked(
                ShellCommand::script(script, self.shell_debug)
                    .with_timeout_secs(self.config.timeout_secs),
            )
            .await?;
        }
        Ok(StageOutput::ok_empty())
    }
}

#[async_trait]
impl Stage for DownstreamBuildStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        into_output(self.run(ctx).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageStatus;
    use crate::testing::{local_stage_context, stage_context_with, write_script, ScriptedCommandRunner};
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_build_writes_and_archives_log() {
        let dir = TempDir::new().unwrap();
        let ctx = local_stage_context(dir.path());
        write_script(&ctx, "ci/build.sh", "echo compiling\n");

        let output = BuildStage::new("Build", BuildConfig::default(), true)
            .execute(&ctx)
            .await;

        assert_eq!(output.status, StageStatus::Ok, "{:?}", output.error);
        let log = std::fs::read_to_string(ctx.workspace_path("build.log")).unwrap();
        assert!(log.contains("compiling"));
        // sh -x traces to stderr, which lands in the same log
        assert!(log.contains("+ echo compiling"));
        assert_eq!(output.artifacts[0].name, "build.log");
        assert!(output.artifacts[0].path.is_file());
    }

    #[tokio::test]
    async fn test_build_failure_still_archives_log() {
        let dir = TempDir::new().unwrap();
        let ctx = local_stage_context(dir.path());
        write_script(&ctx, "ci/build.sh", "echo 'src/a.c:1:1: error: boom'\nexit 2\n");

        let output = BuildStage::new("Build", BuildConfig::default(), true)
            .execute(&ctx)
            .await;

        assert_eq!(output.status, StageStatus::Fail);
        assert_eq!(output.error_kind.as_deref(), Some("command_failed"));
        assert_eq!(output.artifacts.len(), 1);
    }

    #[tokio::test]
    async fn test_downstream_runs_checkout_then_build() {
        let runner = Arc::new(ScriptedCommandRunner::new());
        let ctx = stage_context_with(Path::new("/ws"), runner.clone(), Vec::new());

        let output = DownstreamBuildStage::new("Downstream build", DownstreamConfig::default(), true)
            .execute(&ctx)
            .await;

        assert!(output.is_success());
        assert_eq!(
            runner.commands(),
            vec![
                "sh -x ci/checkout_downstream.sh",
                "sh -x ci/build_downstream.sh"
            ]
        );
    }

    #[tokio::test]
    async fn test_downstream_stops_after_failed_checkout() {
        let runner = Arc::new(ScriptedCommandRunner::new().exit_with("checkout_downstream", 1));
        let ctx = stage_context_with(Path::new("/ws"), runner.clone(), Vec::new());

        let output = DownstreamBuildStage::new("Downstream build", DownstreamConfig::default(), false)
            .execute(&ctx)
            .await;

        assert!(output.is_failure());
        assert_eq!(runner.commands(), vec!["sh ci/checkout_downstream.sh"]);
    }
}
