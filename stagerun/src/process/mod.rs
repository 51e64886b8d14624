//! External command execution.
//!
//! Stages never spawn processes directly: they build a [`ShellCommand`] and
//! hand it to a [`CommandRunner`], which lets scopes rewrite the command line
//! and lets tests substitute a scripted runner.

mod command;
mod local;
mod output;
mod runner;

pub use command::ShellCommand;
pub use local::LocalCommandRunner;
pub use output::{CommandOutput, TailBuffer, OUTPUT_TAIL_LIMIT};
pub use runner::CommandRunner;

#[cfg(test)]
pub use runner::MockCommandRunner;
