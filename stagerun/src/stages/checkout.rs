//! Source checkout.

use super::{into_output, Stage};
use crate::config::SourceConfig;
use crate::context::StageContext;
use crate::core::StageOutput;
use crate::errors::{Result, StagerunError};
use crate::process::ShellCommand;
use async_trait::async_trait;
use tracing::info;

/// Clones the configured repository into the freshly reset workspace.
#[derive(Debug, Clone)]
pub struct CheckoutStage {
    name: String,
    source: SourceConfig,
}

impl CheckoutStage {
    /// Creates a checkout stage.
    #[must_use]
    pub fn new(name: impl Into<String>, source: SourceConfig) -> Self {
        Self {
            name: name.into(),
            source,
        }
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageOutput> {
        let Some(repository) = self.source.repository.as_deref().filter(|r| !r.trim().is_empty())
        else {
            return Err(StagerunError::Config(
                "source.repository must be set: the workspace is empty after reset".to_string(),
            ));
        };

        ctx.run_checked(ShellCommand::new("git").args(["clone", repository, "."]))
            .await?;

        let mut output = StageOutput::ok_value("repository", serde_json::json!(repository));
        if let Some(revision) = &self.source.revision {
            ctx.run_checked(ShellCommand::new("git").args(["checkout", revision.as_str()]))
                .await?;
            output = output.add_data("revision", serde_json::json!(revision));
        }

        info!(%repository, revision = ?self.source.revision, "Source checked out");
        Ok(output)
    }
}

#[async_trait]
impl Stage for CheckoutStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        into_output(self.run(ctx).await)
    }
}
