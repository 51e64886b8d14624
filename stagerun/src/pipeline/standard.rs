//! The standard CI pipeline assembled from [`PipelineConfig`].

use super::{Pipeline, PipelineBuilder, StageSpec};
use crate::cancellation::CancellationToken;
use crate::config::{PipelineConfig, ScopeKind};
use crate::context::{PipelineContext, RunIdentity};
use crate::errors::Result;
use crate::process::CommandRunner;
use crate::scopes::{ExecutionScope, ScopeSpec};
use crate::stages::{
    names, BuildStage, CheckoutStage, DownstreamBuildStage, LintStage, LogAnalysisStage,
    ResetWorkspaceStage, TestStage,
};
use std::sync::Arc;

/// Builds reset, checkout, lint, build, log analysis, downstream build and
/// test, with a workspace reset as the cleanup stage.
///
/// # Errors
///
/// Returns a configuration error if `config` does not validate.
pub fn standard_pipeline(config: &PipelineConfig) -> Result<Pipeline> {
    config.validate()?;

    let scopes = |kinds: &[ScopeKind]| -> Vec<Arc<dyn ExecutionScope>> {
        kinds
            .iter()
            .map(|kind| ScopeSpec::from_kind(*kind, config).build(config))
            .collect()
    };

    let pipeline = PipelineBuilder::new(config.name.clone())
        .with_release_timeout(config.cleanup_timeout())
        .stage(Arc::new(ResetWorkspaceStage::new(names::RESET)))?
        .stage_spec(
            StageSpec::from_stage(Arc::new(CheckoutStage::new(
                names::CHECKOUT,
                config.source.clone(),
            )))
            .with_scopes(scopes(&config.source.scopes)),
        )?
        .stage_spec(
            StageSpec::from_stage(Arc::new(LintStage::new(
                names::LINT,
                config.lint.clone(),
                config.resolved_baseline_path(),
            )))
            .with_scopes(scopes(&config.lint.scopes)),
        )?
        .stage_spec(
            StageSpec::from_stage(Arc::new(BuildStage::new(
                names::BUILD,
                config.build.clone(),
                config.shell_debug,
            )))
            .with_scopes(scopes(&config.build.scopes)),
        )?
        .stage(Arc::new(LogAnalysisStage::new(
            names::LOG_ANALYSIS,
            &config.log_analysis,
            config.build.log_file.clone(),
        )?))?
        .stage_spec(
            StageSpec::from_stage(Arc::new(DownstreamBuildStage::new(
                names::DOWNSTREAM,
                config.downstream.clone(),
                config.shell_debug,
            )))
            .with_scopes(scopes(&config.downstream.scopes)),
        )?
        .stage_spec(
            StageSpec::from_stage(Arc::new(TestStage::new(
                names::TEST,
                config.test.clone(),
                config.shell_debug,
            )))
            .with_scopes(scopes(&config.test.scopes)),
        )?
        .cleanup(StageSpec::from_stage(Arc::new(ResetWorkspaceStage::new(
            names::CLEANUP,
        ))))?
        .build()?;

    Ok(pipeline)
}

/// Creates the run context for `config`.
#[must_use]
pub fn pipeline_context(
    config: &PipelineConfig,
    runner: Arc<dyn CommandRunner>,
    cancel: Arc<CancellationToken>,
) -> PipelineContext {
    let mut identity = RunIdentity::new(config.job_name.clone());
    if let Some(number) = &config.build_number {
        identity = identity.with_build_number(number.clone());
    }
    PipelineContext::new(identity, config.workspace.clone(), runner)
        .with_artifacts_dir(config.resolved_artifacts_dir())
        .with_cancellation(cancel)
}
