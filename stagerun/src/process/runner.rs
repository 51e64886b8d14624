//! Command runner trait.

use super::{CommandOutput, ShellCommand};
use crate::cancellation::CancellationToken;
use crate::errors::Result;
use async_trait::async_trait;

/// Executes shell commands.
///
/// A non-zero exit is not an error at this level: the runner returns the
/// [`CommandOutput`] and the caller decides. Errors are reserved for commands
/// that could not be started, timed out, or were cancelled.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `command` to completion, killing it if `cancel` fires first.
    async fn run(&self, command: &ShellCommand, cancel: &CancellationToken) -> Result<CommandOutput>;
}
