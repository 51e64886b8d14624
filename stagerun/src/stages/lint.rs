//! Style check with a new-warning gate.

use super::{into_output, Stage};
use crate::analysis::{archive_file, QualityGate, WarningBaseline, WarningParser};
use crate::config::LintConfig;
use crate::context::{ExecutionContext, StageContext};
use crate::core::{ArtifactKind, StageArtifact, StageOutput};
use crate::errors::{Result, StagerunError};
use crate::process::ShellCommand;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{info, warn};

/// File name of the warnings summary written to the artifacts directory.
pub const LINT_SUMMARY_FILE: &str = "lint-warnings.json";

/// Runs the style checker, archives its log and gates on new warnings.
///
/// The checker's own exit code is recorded but ignored: checkers exit
/// non-zero whenever they report anything, and the gate decides.
#[derive(Debug, Clone)]
pub struct LintStage {
    name: String,
    config: LintConfig,
    baseline_path: PathBuf,
}

impl LintStage {
    /// Creates a lint stage. `baseline_path` need not exist.
    #[must_use]
    pub fn new(name: impl Into<String>, config: LintConfig, baseline_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            config,
            baseline_path: baseline_path.into(),
        }
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageOutput> {
        let parser = WarningParser::from_name(&self.config.parser)?;
        let command = ShellCommand::from_argv(&self.config.command)
            .ok_or_else(|| StagerunError::Config("lint.command is empty".to_string()))?;
        let log_path = ctx.workspace_path(&self.config.log_file);

        let output = ctx
            .run_command(
                command
                    .log_to(&log_path)
                    .with_timeout_secs(self.config.timeout_secs),
            )
            .await?;

        let log = tokio::fs::read_to_string(&log_path).await?;
        let mut artifacts = vec![archive_file(
            ctx.workspace(),
            &self.config.log_file,
            ctx.artifacts_dir(),
            ArtifactKind::Log,
        )?];

        let warnings = parser.parse(&log);
        let baseline = WarningBaseline::load(&self.baseline_path)?;
        let outcome = QualityGate::new_warnings(self.config.threshold).evaluate(&warnings, baseline.as_ref());

        tokio::fs::create_dir_all(ctx.artifacts_dir()).await?;
        let summary_path = ctx.artifacts_dir().join(LINT_SUMMARY_FILE);
        tokio::fs::write(&summary_path, serde_json::to_vec_pretty(&warnings)?).await?;
        artifacts.push(StageArtifact::new(ArtifactKind::Warnings, LINT_SUMMARY_FILE, &summary_path));

        info!(
            parser = %parser,
            exit_code = output.code(),
            total = outcome.total,
            new = outcome.new,
            threshold = outcome.threshold,
            "Lint warnings counted"
        );
        ctx.emit(
            "lint.warnings_counted",
            serde_json::json!({
                "parser": parser.to_string(),
                "total": outcome.total,
                "new": outcome.new,
                "threshold": outcome.threshold,
                "passed": outcome.passed,
            }),
        );

        let data = HashMap::from([
            ("checker_exit_code".to_string(), serde_json::json!(output.code())),
            ("total_warnings".to_string(), serde_json::json!(outcome.total)),
            ("new_warnings".to_string(), serde_json::json!(outcome.new)),
            ("threshold".to_string(), serde_json::json!(outcome.threshold)),
        ]);

        if outcome.passed {
            return Ok(StageOutput::ok(data).with_artifacts(artifacts));
        }

        let err = StagerunError::LintViolations {
            new_warnings: outcome.counted,
            threshold: outcome.threshold,
        };
        warn!(error = %err, "Lint gate failed");
        Ok(StageOutput::from_error(&err)
            .with_data(data)
            .with_artifacts(artifacts))
    }
}

#[async_trait]
impl Stage for LintStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        into_output(self.run(ctx).await)
    }
}
