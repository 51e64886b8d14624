//! Pipeline builder with validation.

use super::{Pipeline, StageSpec};
use crate::errors::{ErrorInfo, PipelineValidationError};
use crate::stages::Stage;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Default per-scope release timeout.
pub const DEFAULT_RELEASE_TIMEOUT: Duration = Duration::from_secs(60);

/// Builder for creating validated pipelines.
///
/// Stages run in the order they are added. Exactly one cleanup stage must
/// be set; it runs after the others whatever their outcome.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    name: String,
    stages: Vec<StageSpec>,
    names: HashSet<String>,
    cleanup: Option<StageSpec>,
    release_timeout: Duration,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            names: HashSet::new(),
            cleanup: None,
            release_timeout: DEFAULT_RELEASE_TIMEOUT,
        }
    }

    /// Adds a stage with no scopes, named after the stage.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is blank or already used.
    pub fn stage(self, stage: Arc<dyn Stage>) -> Result<Self, PipelineValidationError> {
        self.stage_spec(StageSpec::from_stage(stage))
    }

    /// Adds a stage specification.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is blank or already used.
    pub fn stage_spec(mut self, spec: StageSpec) -> Result<Self, PipelineValidationError> {
        self.add_stage_spec(spec)?;
        Ok(self)
    }

    /// Adds a stage specification in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is blank or already used.
    pub fn add_stage_spec(&mut self, spec: StageSpec) -> Result<(), PipelineValidationError> {
        self.claim_name(&spec)?;
        self.stages.push(spec);
        Ok(())
    }

    /// Sets the cleanup stage.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is blank, already used, or a cleanup
    /// stage was already set.
    pub fn cleanup(mut self, spec: StageSpec) -> Result<Self, PipelineValidationError> {
        if let Some(existing) = &self.cleanup {
            return Err(PipelineValidationError::new(format!(
                "Pipeline already has cleanup stage '{}'",
                existing.name
            ))
            .with_stages(vec![existing.name.clone(), spec.name.clone()])
            .with_error_info(
                ErrorInfo::new("PIPELINE-DUPLICATE_CLEANUP", "More than one cleanup stage")
                    .with_fix_hint("Fold the cleanup work into a single stage."),
            ));
        }
        self.claim_name(&spec)?;
        self.cleanup = Some(spec);
        Ok(self)
    }

    /// Sets the timeout applied to each scope release.
    #[must_use]
    pub fn with_release_timeout(mut self, timeout: Duration) -> Self {
        self.release_timeout = timeout;
        self
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no stages or no cleanup stage.
    pub fn build(self) -> Result<Pipeline, PipelineValidationError> {
        if self.stages.is_empty() {
            return Err(PipelineValidationError::new("Pipeline has no stages").with_error_info(
                ErrorInfo::new("PIPELINE-EMPTY", "Cannot build an empty pipeline")
                    .with_fix_hint("Add at least one stage before building."),
            ));
        }
        let Some(cleanup) = self.cleanup else {
            return Err(PipelineValidationError::new("Pipeline has no cleanup stage")
                .with_error_info(
                    ErrorInfo::new("PIPELINE-MISSING_CLEANUP", "No cleanup stage set")
                        .with_fix_hint("Call `cleanup` with the workspace reset stage."),
                ));
        };

        Ok(Pipeline::new(
            self.name,
            self.stages,
            cleanup,
            self.release_timeout,
        ))
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of regular stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    fn claim_name(&mut self, spec: &StageSpec) -> Result<(), PipelineValidationError> {
        spec.validate()?;
        if !self.names.insert(spec.name.clone()) {
            return Err(PipelineValidationError::new(format!(
                "Stage '{}' is defined more than once",
                spec.name
            ))
            .with_stages(vec![spec.name.clone()])
            .with_error_info(
                ErrorInfo::new(
                    "PIPELINE-DUPLICATE_STAGE",
                    format!("Duplicate stage name '{}'", spec.name),
                )
                .with_fix_hint("Stage names identify stages in the run summary; make them unique."),
            ));
        }
        Ok(())
    }
}
