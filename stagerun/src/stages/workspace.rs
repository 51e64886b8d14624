//! Workspace reset.

use super::{into_output, Stage};
use crate::context::{ExecutionContext, StageContext};
use crate::core::StageOutput;
use crate::errors::{Result, StagerunError};
use async_trait::async_trait;
use std::path::Path;
use tracing::info;

/// Deletes everything inside the workspace directory.
///
/// The directory itself is kept (or created). Used both as the first stage
/// and as the cleanup stage.
#[derive(Debug, Clone)]
pub struct ResetWorkspaceStage {
    name: String,
}

impl ResetWorkspaceStage {
    /// Creates a reset stage with the given display name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageOutput> {
        let workspace = ctx.workspace();
        if workspace.parent().is_none() || workspace.as_os_str().is_empty() {
            return Err(StagerunError::Config(format!(
                "refusing to reset workspace '{}'",
                workspace.display()
            )));
        }

        let removed = reset_dir(workspace).await?;
        info!(workspace = %workspace.display(), removed, "Workspace reset");
        Ok(StageOutput::ok_value("removed_entries", serde_json::json!(removed)))
    }
}

async fn reset_dir(dir: &Path) -> Result<usize> {
    tokio::fs::create_dir_all(dir).await?;
    let mut removed = 0;
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        // symlink_metadata: never follow a link out of the workspace
        let meta = tokio::fs::symlink_metadata(&path).await?;
        if meta.is_dir() {
            tokio::fs::remove_dir_all(&path).await?;
        } else {
            tokio::fs::remove_file(&path).await?;
        }
        removed += 1;
    }
    Ok(removed)
}

#[async_trait]
impl Stage for ResetWorkspaceStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        into_output(self.run(ctx).await)
    }
}
