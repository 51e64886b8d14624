//! Compiler warning scan of the build log.

use super::{into_output, Stage};
use crate::analysis::{exclude_matching, QualityGate, WarningParser};
use crate::config::LogAnalysisConfig;
use crate::context::StageContext;
use crate::core::{ArtifactKind, StageArtifact, StageOutput};
use crate::errors::{ReportError, Result, StagerunError};
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use tracing::{info, warn};

/// Re-parses the build log and fails on compiler warnings.
///
/// Warnings in files matching the exclude pattern are dropped before
/// counting.
#[derive(Debug, Clone)]
pub struct LogAnalysisStage {
    name: String,
    parser: WarningParser,
    exclude: Option<Regex>,
    threshold: usize,
    log_file: String,
}

impl LogAnalysisStage {
    /// Creates a log analysis stage reading `log_file` (workspace-relative).
    ///
    /// # Errors
    ///
    /// Fails on an unknown parser or an invalid exclude pattern.
    pub fn new(
        name: impl Into<String>,
        config: &LogAnalysisConfig,
        log_file: impl Into<String>,
    ) -> Result<Self> {
        let exclude = config
            .exclude_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| ReportError::InvalidPattern {
                pattern: config.exclude_pattern.clone().unwrap_or_default(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            name: name.into(),
            parser: WarningParser::from_name(&config.parser)?,
            exclude,
            threshold: config.threshold,
            log_file: log_file.into(),
        })
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageOutput> {
        let log_path = ctx.workspace_path(&self.log_file);
        let log = match tokio::fs::read_to_string(&log_path).await {
            Ok(log) => log,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ReportError::NotFound {
                    pattern: self.log_file.clone(),
                }
                .into());
            }
            Err(e) => return Err(e.into()),
        };

        let found = self.parser.parse(&log);
        let found_count = found.len();
        let warnings = exclude_matching(found, self.exclude.as_ref());
        let outcome = QualityGate::total_warnings(self.threshold).evaluate(&warnings, None);

        tokio::fs::create_dir_all(ctx.artifacts_dir()).await?;
        let summary_path = ctx.artifacts_dir().join("compiler-warnings.json");
        tokio::fs::write(&summary_path, serde_json::to_vec_pretty(&warnings)?).await?;
        let artifact =
            StageArtifact::new(ArtifactKind::Warnings, "compiler-warnings.json", &summary_path);

        info!(
            parser = %self.parser,
            found = found_count,
            excluded = found_count - warnings.len(),
            total = outcome.total,
            threshold = outcome.threshold,
            "Compiler warnings counted"
        );

        let data = HashMap::from([
            ("total_warnings".to_string(), serde_json::json!(outcome.total)),
            ("excluded_warnings".to_string(), serde_json::json!(found_count - warnings.len())),
            ("threshold".to_string(), serde_json::json!(outcome.threshold)),
        ]);

        if outcome.passed {
            return Ok(StageOutput::ok(data).with_artifacts(vec![artifact]));
        }

        for warning in warnings.iter().take(20) {
            warn!(%warning, "Compiler warning");
        }
        let err = StagerunError::CompilerWarnings {
            total: outcome.total,
            threshold: outcome.threshold,
        };
        Ok(StageOutput::from_error(&err)
            .with_data(data)
            .with_artifacts(vec![artifact]))
    }
}

#[async_trait]
impl Stage for LogAnalysisStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        into_output(self.run(ctx).await)
    }
}
