//! Command-line arguments for the `stagerun` binary.
//!
//! Facts the automation server exports as environment variables are
//! accepted as flags with an env fallback.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per line.
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "stagerun", version, about = "Run the CI pipeline in a workspace")]
pub struct Args {
    /// JSON file overriding the inline pipeline configuration.
    #[arg(long, env = "STAGERUN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Workspace directory. Reset at the start and end of the run.
    #[arg(long, env = "WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Where artifacts are archived. Defaults to `<workspace>@artifacts`.
    #[arg(long, env = "STAGERUN_ARTIFACTS_DIR")]
    pub artifacts_dir: Option<PathBuf>,

    /// Repository cloned into the reset workspace. Required unless set in `--config`.
    #[arg(long, env = "GIT_URL")]
    pub repository: Option<String>,

    /// Revision to check out after cloning.
    #[arg(long, env = "GIT_COMMIT")]
    pub revision: Option<String>,

    /// Job name reported by the automation server.
    #[arg(long, env = "JOB_NAME")]
    pub job_name: Option<String>,

    /// Build number reported by the automation server.
    #[arg(long, env = "BUILD_NUMBER")]
    pub build_number: Option<String>,

    /// Write the JSON run summary to this file.
    #[arg(long)]
    pub summary: Option<PathBuf>,

    /// Accept the current lint warnings as the new baseline after a successful run.
    #[arg(long)]
    pub update_baseline: bool,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, env = "STAGERUN_LOG_FORMAT")]
    pub log_format: LogFormat,
}
