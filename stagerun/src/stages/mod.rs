//! Stage trait and the built-in CI stages.
//!
//! Built-in stages do their work through the [`StageContext`], so every
//! command they run is wrapped by the scopes the runner entered for them.

mod build;
mod checkout;
mod lint;
mod log_analysis;
mod test;
mod workspace;

pub use build::{BuildStage, DownstreamBuildStage};
pub use checkout::CheckoutStage;
pub use lint::{LintStage, LINT_SUMMARY_FILE};
pub use log_analysis::LogAnalysisStage;
pub use test::TestStage;
pub use workspace::ResetWorkspaceStage;

use crate::context::StageContext;
use crate::core::StageOutput;
use crate::errors::Result;
use async_trait::async_trait;
use std::fmt::Debug;

/// Display names of the standard stages.
pub mod names {
    /// Workspace reset at the start of a run.
    pub const RESET: &str = "Reset workspace";
    /// Source checkout.
    pub const CHECKOUT: &str = "Checkout";
    /// Style check.
    pub const LINT: &str = "Lint";
    /// Build.
    pub const BUILD: &str = "Build";
    /// Compiler warning scan.
    pub const LOG_ANALYSIS: &str = "Log analysis";
    /// Downstream project build.
    pub const DOWNSTREAM: &str = "Downstream build";
    /// Tests.
    pub const TEST: &str = "Test";
    /// Workspace reset at the end of a run.
    pub const CLEANUP: &str = "Cleanup";
}

/// A unit of work in a pipeline.
///
/// `execute` never returns an error: failures are reported through the
/// [`StageOutput`] status so the runner can record them alongside artifacts
/// the stage managed to produce.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Executes the stage.
    async fn execute(&self, ctx: &StageContext) -> StageOutput;
}

/// Maps a fallible stage body onto a [`StageOutput`].
pub(crate) fn into_output(result: Result<StageOutput>) -> StageOutput {
    result.unwrap_or_else(|err| StageOutput::from_error(&err))
}

/// A simple function-based stage.
pub struct FnStage<F>
where
    F: Fn(&StageContext) -> StageOutput + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&StageContext) -> StageOutput + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&StageContext) -> StageOutput + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(&StageContext) -> StageOutput + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        (self.func)(ctx)
    }
}

/// A stage that does nothing and succeeds.
#[derive(Debug, Clone)]
pub struct NoOpStage {
    name: String,
}

impl NoOpStage {
    /// Creates a new no-op stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Stage for NoOpStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext) -> StageOutput {
        StageOutput::ok_empty()
    }
}
