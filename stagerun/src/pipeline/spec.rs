//! Stage specifications.

use crate::errors::{ErrorInfo, PipelineValidationError};
use crate::scopes::ExecutionScope;
use crate::stages::Stage;
use std::sync::Arc;

/// Specification for a single stage in a pipeline.
#[derive(Clone)]
pub struct StageSpec {
    /// The unique name of the stage.
    pub name: String,
    /// The stage implementation.
    pub stage: Arc<dyn Stage>,
    /// Scopes entered around the stage, outermost first.
    pub scopes: Vec<Arc<dyn ExecutionScope>>,
}

impl StageSpec {
    /// Creates a new stage specification with no scopes.
    #[must_use]
    pub fn new(name: impl Into<String>, stage: Arc<dyn Stage>) -> Self {
        Self {
            name: name.into(),
            stage,
            scopes: Vec::new(),
        }
    }

    /// Creates a specification named after the stage itself.
    #[must_use]
    pub fn from_stage(stage: Arc<dyn Stage>) -> Self {
        Self::new(stage.name().to_string(), stage)
    }

    /// Sets the scopes, outermost first.
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<Arc<dyn ExecutionScope>>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Appends an inner scope.
    #[must_use]
    pub fn with_scope(mut self, scope: Arc<dyn ExecutionScope>) -> Self {
        self.scopes.push(scope);
        self
    }

    /// Descriptions of the declared scopes, outermost first.
    #[must_use]
    pub fn scope_descriptions(&self) -> Vec<String> {
        self.scopes.iter().map(|s| s.describe()).collect()
    }

    /// Validates the stage specification.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty or whitespace-only.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        if self.name.trim().is_empty() {
            return Err(PipelineValidationError::new("Stage name cannot be empty")
                .with_stages(vec![self.name.clone()])
                .with_error_info(
                    ErrorInfo::new("PIPELINE-EMPTY_NAME", "Stage has an empty name")
                        .with_fix_hint("Give every stage a non-blank name."),
                ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for StageSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageSpec")
            .field("name", &self.name)
            .field("stage", &self.stage)
            .field("scopes", &self.scope_descriptions())
            .finish()
    }
}
