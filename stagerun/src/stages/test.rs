//! Test stage: run tests, archive images, read JUnit reports.

use super::{into_output, Stage};
use crate::analysis::{archive_matching, parse_reports};
use crate::config::TestConfig;
use crate::context::{ExecutionContext, StageContext};
use crate::core::{ArtifactKind, StageOutput};
use crate::errors::{Result, StagerunError};
use crate::process::ShellCommand;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{info, warn};

/// Runs the test script and turns the JUnit report into a verdict.
///
/// Images and reports are archived before the verdict so they survive a
/// failing run. A non-zero script exit takes precedence over the report;
/// a missing report fails the stage.
#[derive(Debug, Clone)]
pub struct TestStage {
    name: String,
    config: TestConfig,
    shell_debug: bool,
}

impl TestStage {
    /// Creates a test stage.
    #[must_use]
    pub fn new(name: impl Into<String>, config: TestConfig, shell_debug: bool) -> Self {
        Self {
            name: name.into(),
            config,
            shell_debug,
        }
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageOutput> {
        let command = ShellCommand::script(&self.config.script, self.shell_debug)
            .with_timeout_secs(self.config.timeout_secs);
        let rendered = ctx.prepare(command.clone()).display();
        let output = ctx.run_command(command).await?;

        let workspace = ctx.workspace();
        let mut artifacts = archive_matching(
            workspace,
            &self.config.image_pattern,
            ctx.artifacts_dir(),
            ArtifactKind::Image,
        )?;
        artifacts.extend(archive_matching(
            workspace,
            &self.config.report_pattern,
            ctx.artifacts_dir(),
            ArtifactKind::TestReport,
        )?);

        if !output.success() {
            let err = StagerunError::CommandFailed {
                command: rendered,
                exit_code: output.code(),
            };
            return Ok(StageOutput::from_error(&err).with_artifacts(artifacts));
        }

        let (report, reports) = match parse_reports(workspace, &self.config.report_pattern) {
            Ok(parsed) => parsed,
            Err(err) => return Ok(StageOutput::from_error(&err).with_artifacts(artifacts)),
        };

        info!(
            reports = reports.len(),
            total = report.total,
            passed = report.passed,
            failed = report.failed,
            errored = report.errored,
            skipped = report.skipped,
            "Test report read"
        );
        ctx.emit("test.report_read", serde_json::to_value(&report)?);

        let data = HashMap::from([
            ("total".to_string(), serde_json::json!(report.total)),
            ("passed".to_string(), serde_json::json!(report.passed)),
            ("failed".to_string(), serde_json::json!(report.failed)),
            ("errored".to_string(), serde_json::json!(report.errored)),
            ("skipped".to_string(), serde_json::json!(report.skipped)),
            ("failures".to_string(), serde_json::to_value(&report.failures)?),
        ]);

        if report.is_green() {
            return Ok(StageOutput::ok(data).with_artifacts(artifacts));
        }

        for case in &report.failures {
            warn!(
                suite = %case.suite,
                test = %format!("{}.{}", case.classname, case.name),
                outcome = ?case.outcome,
                message = case.message.as_deref().unwrap_or(""),
                "Test did not pass"
            );
        }
        let err = StagerunError::TestFailures {
            failed: report.failed,
            errored: report.errored,
            total: report.total,
        };
        Ok(StageOutput::from_error(&err)
            .with_data(data)
            .with_artifacts(artifacts))
    }
}

#[async_trait]
impl Stage for TestStage {
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
    use crate::testing::{local_stage_context, write_script};
    use tempfile::TempDir;

    const SCRIPT_GREEN: &str = r#"mkdir -p test-results test-images
printf '<testsuite name="unit"><testcase name="a"/><testcase name="b"/></testsuite>' > test-results/unit.xml
printf 'png' > test-images/plot.png
"#;

    const SCRIPT_RED: &str = r#"mkdir -p test-results
printf '<testsuite name="unit"><testcase name="a"><failure message="boom"/></testcase></testsuite>' > test-results/unit.xml
"#;

    #[tokio::test]
    async fn test_green_report_passes_and_archives() {
        let dir = TempDir::new().unwrap();
        let ctx = local_stage_context(dir.path());
        write_script(&ctx, "ci/test.sh", SCRIPT_GREEN);

        let output = TestStage::new("Test", TestConfig::default(), true)
            .execute(&ctx)
            .await;

        assert_eq!(output.status, StageStatus::Ok, "{:?}", output.error);
        assert_eq!(output.get("total"), Some(&serde_json::json!(2)));
        let kinds: Vec<ArtifactKind> = output.artifacts.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![ArtifactKind::Image, ArtifactKind::TestReport]);
        assert!(ctx.artifacts_dir().join("test-images/plot.png").is_file());
    }

    #[tokio::test]
    async fn test_failed_case_fails_stage() {
        let dir = TempDir::new().unwrap();
        let ctx = local_stage_context(dir.path());
        write_script(&ctx, "ci/test.sh", SCRIPT_RED);

        let output = TestStage::new("Test", TestConfig::default(), true)
            .execute(&ctx)
            .await;

        assert_eq!(output.status, StageStatus::Fail);
        assert_eq!(output.error_kind.as_deref(), Some("test_failures"));
        assert_eq!(output.get("failed"), Some(&serde_json::json!(1)));
    }

    #[tokio::test]
    async fn test_missing_report_fails_stage() {
        let dir = TempDir::new().unwrap();
        let ctx = local_stage_context(dir.path());
        write_script(&ctx, "ci/test.sh", "true\n");

        let output = TestStage::new("Test", TestConfig::default(), false)
            .execute(&ctx)
            .await;

        assert_eq!(output.error_kind.as_deref(), Some("report"));
    }

    #[tokio::test]
    async fn test_script_exit_takes_precedence() {
        let dir = TempDir::new().unwrap();
        let ctx = local_stage_context(dir.path());
        write_script(&ctx, "ci/test.sh", &format!("{SCRIPT_GREEN}exit 4\n"));

        let output = TestStage::new("Test", TestConfig::default(), false)
            .execute(&ctx)
            .await;

        assert_eq!(output.error_kind.as_deref(), Some("command_failed"));
        assert_eq!(output.artifacts.len(), 2);
    }
}
