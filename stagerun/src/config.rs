//! Inline pipeline configuration.
//!
//! Every value has a default in code; a JSON file can override any subset of
//! fields. Scope values (machine label, isolation profile, scheduler
//! partition) live here and are handed to each stage explicitly.

use crate::analysis::WarningParser;
use crate::errors::{Result, StagerunError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which kind of scope a stage runs inside.
///
/// The concrete label, profile and partition come from [`NodeConfig`],
/// [`IsolationConfig`] and [`SchedulerConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    /// Run on a machine carrying the configured label.
    Node,
    /// Run inside the configured isolation profile.
    Isolation,
    /// Run while holding a scheduler allocation.
    Allocation,
}

fn default_name() -> String {
    "ci".to_string()
}

fn default_workspace() -> PathBuf {
    PathBuf::from(".")
}

fn default_job_name() -> String {
    "local".to_string()
}

fn default_true() -> bool {
    true
}

fn default_cleanup_timeout() -> u64 {
    60
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name, used in logs and the run summary.
    #[serde(default = "default_name")]
    pub name: String,
    /// The workspace directory, reset at the start and end of every run.
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,
    /// Where artifacts are archived. Defaults to `<workspace>@artifacts`.
    #[serde(default)]
    pub artifacts_dir: Option<PathBuf>,
    /// Job name reported by the automation server.
    #[serde(default = "default_job_name")]
    pub job_name: String,
    /// Build number reported by the automation server.
    #[serde(default)]
    pub build_number: Option<String>,
    /// Invoke shell scripts with `-x`.
    #[serde(default = "default_true")]
    pub shell_debug: bool,
    /// Per-callback timeout for scope releases, in seconds.
    #[serde(default = "default_cleanup_timeout")]
    pub cleanup_timeout_secs: u64,
    /// Source checkout settings.
    #[serde(default)]
    pub source: SourceConfig,
    /// Machine label settings.
    #[serde(default)]
    pub node: NodeConfig,
    /// Isolation runtime settings.
    #[serde(default)]
    pub isolation: IsolationConfig,
    /// Resource scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Lint stage settings.
    #[serde(default)]
    pub lint: LintConfig,
    /// Build stage settings.
    #[serde(default)]
    pub build: BuildConfig,
    /// Log analysis stage settings.
    #[serde(default)]
    pub log_analysis: LogAnalysisConfig,
    /// Downstream build stage settings.
    #[serde(default)]
    pub downstream: DownstreamConfig,
    /// Test stage settings.
    #[serde(default)]
    pub test: TestConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            workspace: default_workspace(),
            artifacts_dir: None,
            job_name: default_job_name(),
            build_number: None,
            shell_debug: true,
            cleanup_timeout_secs: default_cleanup_timeout(),
            source: SourceConfig::default(),
            node: NodeConfig::default(),
            isolation: IsolationConfig::default(),
            scheduler: SchedulerConfig::default(),
            lint: LintConfig::default(),
            build: BuildConfig::default(),
            log_analysis: LogAnalysisConfig::default(),
            downstream: DownstreamConfig::default(),
            test: TestConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration holding the inline defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a configuration from a JSON file. Missing fields keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            StagerunError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    /// Parses a configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid JSON for this schema.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| StagerunError::Config(e.to_string()))
    }

    /// Sets the workspace directory.
    #[must_use]
    pub fn with_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = workspace.into();
        self
    }

    /// Sets the artifacts directory.
    #[must_use]
    pub fn with_artifacts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifacts_dir = Some(dir.into());
        self
    }

    /// Sets the job name.
    #[must_use]
    pub fn with_job_name(mut self, job_name: impl Into<String>) -> Self {
        self.job_name = job_name.into();
        self
    }

    /// Sets the build number.
    #[must_use]
    pub fn with_build_number(mut self, build_number: impl Into<String>) -> Self {
        self.build_number = Some(build_number.into());
        self
    }

    /// Sets the repository to check out.
    #[must_use]
    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.source.repository = Some(repository.into());
        self
    }

    /// Sets the revision to check out.
    #[must_use]
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.source.revision = Some(revision.into());
        self
    }

    /// Returns the artifacts directory, falling back to `<workspace>@artifacts`.
    #[must_use]
    pub fn resolved_artifacts_dir(&self) -> PathBuf {
        if let Some(dir) = &self.artifacts_dir {
            return dir.clone();
        }
        let mut name = self
            .workspace
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_else(|| "workspace".into());
        name.push("@artifacts");
        self.workspace.with_file_name(name)
    }

    /// Returns the lint baseline path, falling back to the artifacts directory.
    #[must_use]
    pub fn resolved_baseline_path(&self) -> PathBuf {
        self.lint
            .baseline_file
            .clone()
            .unwrap_or_else(|| self.resolved_artifacts_dir().join("lint-baseline.json"))
    }

    /// Timeout applied to each scope release during cleanup.
    #[must_use]
    pub fn cleanup_timeout(&self) -> Duration {
        Duration::from_secs(self.cleanup_timeout_secs)
    }

    /// Checks the configuration for values that would make every run fail.
    ///
    /// # Errors
    ///
    /// Returns [`StagerunError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        require_non_empty("node.label", &self.node.label)?;
        require_non_empty("isolation.profile", &self.isolation.profile)?;
        require_non_empty("scheduler.partition", &self.scheduler.partition)?;
        require_non_empty("job_name", &self.job_name)?;
        require_non_empty(
            "source.repository",
            self.source.repository.as_deref().unwrap_or_default(),
        )?;

        require_template("isolation.runtime_template", &self.isolation.runtime_template)?;
        require_template("scheduler.allocate_template", &self.scheduler.allocate_template)?;
        require_template("scheduler.run_template", &self.scheduler.run_template)?;
        require_template("scheduler.release_template", &self.scheduler.release_template)?;
        require_template("lint.command", &self.lint.command)?;

        WarningParser::from_name(&self.lint.parser)
            .map_err(|e| StagerunError::Config(format!("lint.parser: {e}")))?;
        WarningParser::from_name(&self.log_analysis.parser)
            .map_err(|e| StagerunError::Config(format!("log_analysis.parser: {e}")))?;

        if let Some(pattern) = &self.log_analysis.exclude_pattern {
            Regex::new(pattern).map_err(|e| {
                StagerunError::Config(format!("log_analysis.exclude_pattern: {e}"))
            })?;
        }

        let allocation = Regex::new(&self.scheduler.allocation_pattern).map_err(|e| {
            StagerunError::Config(format!("scheduler.allocation_pattern: {e}"))
        })?;
        if allocation.captures_len() < 2 {
            return Err(StagerunError::Config(
                "scheduler.allocation_pattern must contain a capture group".to_string(),
            ));
        }

        for pattern in [&self.test.report_pattern, &self.test.image_pattern] {
            glob::Pattern::new(pattern)
                .map_err(|e| StagerunError::Config(format!("invalid glob '{pattern}': {e}")))?;
        }

        Ok(())
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(StagerunError::Config(format!("{field} must not be empty")));
    }
    Ok(())
}

fn require_template(field: &str, template: &[String]) -> Result<()> {
    if template.first().map_or(true, |program| program.trim().is_empty()) {
        return Err(StagerunError::Config(format!("{field} must name a program")));
    }
    Ok(())
}

/// Where the source tree comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Repository URL. Required: the workspace is emptied before checkout.
    #[serde(default)]
    pub repository: Option<String>,
    /// Revision to check out after cloning.
    #[serde(default)]
    pub revision: Option<String>,
    /// Scopes the checkout stage runs in.
    #[serde(default = "node_only")]
    pub scopes: Vec<ScopeKind>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            repository: None,
            revision: None,
            scopes: node_only(),
        }
    }
}

fn node_only() -> Vec<ScopeKind> {
    vec![ScopeKind::Node]
}

// The allocation wraps the container so the scheduler launches it on the allocated node.
fn full_scopes() -> Vec<ScopeKind> {
    vec![ScopeKind::Node, ScopeKind::Allocation, ScopeKind::Isolation]
}

fn default_label() -> String {
    "linux".to_string()
}

/// Machine label settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Label the executing host must carry.
    #[serde(default = "default_label")]
    pub label: String,
    /// Labels this host carries. When unset they come from
    /// `STAGERUN_NODE_LABELS` or the host name.
    #[serde(default)]
    pub host_labels: Option<Vec<String>>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            label: default_label(),
            host_labels: None,
        }
    }
}

fn default_profile() -> String {
    "build".to_string()
}

fn default_image() -> String {
    "ci.sif".to_string()
}

fn default_runtime_template() -> Vec<String> {
    ["singularity", "exec", "--app", "{profile}", "{image}"]
        .map(String::from)
        .to_vec()
}

/// Isolation runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationConfig {
    /// Application profile inside the image.
    #[serde(default = "default_profile")]
    pub profile: String,
    /// Image path or reference.
    #[serde(default = "default_image")]
    pub image: String,
    /// Command prefix template; `{profile}` and `{image}` are substituted.
    #[serde(default = "default_runtime_template")]
    pub runtime_template: Vec<String>,
    /// Check that the runtime program is on `PATH` before using it.
    #[serde(default = "default_true")]
    pub verify_runtime: bool,
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            image: default_image(),
            runtime_template: default_runtime_template(),
            verify_runtime: true,
        }
    }
}

fn default_partition() -> String {
    "ci".to_string()
}

fn default_allocate_template() -> Vec<String> {
    [
        "salloc",
        "--no-shell",
        "--partition",
        "{partition}",
        "--job-name",
        "{job}",
    ]
    .map(String::from)
    .to_vec()
}

fn default_run_template() -> Vec<String> {
    ["srun", "--jobid", "{allocation}"].map(String::from).to_vec()
}

fn default_release_template() -> Vec<String> {
    ["scancel", "{allocation}"].map(String::from).to_vec()
}

fn default_allocation_pattern() -> String {
    r"Granted job allocation (\d+)".to_string()
}

/// Resource scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Partition to allocate from.
    #[serde(default = "default_partition")]
    pub partition: String,
    /// Allocation command; `{partition}` and `{job}` are substituted.
    #[serde(default = "default_allocate_template")]
    pub allocate_template: Vec<String>,
    /// Prefix for commands inside the allocation; `{allocation}` is substituted.
    #[serde(default = "default_run_template")]
    pub run_template: Vec<String>,
    /// Release command; `{allocation}` is substituted.
    #[serde(default = "default_release_template")]
    pub release_template: Vec<String>,
    /// Regex whose first capture group is the allocation id.
    #[serde(default = "default_allocation_pattern")]
    pub allocation_pattern: String,
    /// Timeout for the allocation command, in seconds.
    #[serde(default)]
    pub allocate_timeout_secs: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            partition: default_partition(),
            allocate_template: default_allocate_template(),
            run_template: default_run_template(),
            release_template: default_release_template(),
            allocation_pattern: default_allocation_pattern(),
            allocate_timeout_secs: None,
        }
    }
}

fn default_lint_command() -> Vec<String> {
    ["pycodestyle", "."].map(String::from).to_vec()
}

fn default_lint_log() -> String {
    "pep8.log".to_string()
}

fn default_lint_parser() -> String {
    "pep8".to_string()
}

/// Lint stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LintConfig {
    /// Style checker command line.
    #[serde(default = "default_lint_command")]
    pub command: Vec<String>,
    /// Workspace-relative log file the checker output is written to.
    #[serde(default = "default_lint_log")]
    pub log_file: String,
    /// Warning parser applied to the log.
    #[serde(default = "default_lint_parser")]
    pub parser: String,
    /// Maximum number of new warnings tolerated.
    #[serde(default)]
    pub threshold: usize,
    /// Baseline of known warnings. Defaults to `<artifacts>/lint-baseline.json`.
    #[serde(default)]
    pub baseline_file: Option<PathBuf>,
    /// Command timeout in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Scopes the lint stage runs in.
    #[serde(default = "node_only")]
    pub scopes: Vec<ScopeKind>,
}

impl Default for LintConfig {
    fn default() -> Self {
        Self {
            command: default_lint_command(),
            log_file: default_lint_log(),
            parser: default_lint_parser(),
            threshold: 0,
            baseline_file: None,
            timeout_secs: None,
            scopes: node_only(),
        }
    }
}

fn default_build_script() -> String {
    "ci/build.sh".to_string()
}

fn default_build_log() -> String {
    "build.log".to_string()
}

/// Build stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Workspace-relative build script.
    #[serde(default = "default_build_script")]
    pub script: String,
    /// Workspace-relative file the build output is written to.
    #[serde(default = "default_build_log")]
    pub log_file: String,
    /// Command timeout in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Scopes the build stage runs in.
    #[serde(default = "full_scopes")]
    pub scopes: Vec<ScopeKind>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            script: default_build_script(),
            log_file: default_build_log(),
            timeout_secs: None,
            scopes: full_scopes(),
        }
    }
}

fn default_compiler_parser() -> String {
    "gcc".to_string()
}

fn default_exclude_pattern() -> Option<String> {
    Some(r"^(third_party|extern)/".to_string())
}

/// Log analysis stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogAnalysisConfig {
    /// Warning parser applied to the build log.
    #[serde(default = "default_compiler_parser")]
    pub parser: String,
    /// Warnings whose file path matches this regex are ignored.
    #[serde(default = "default_exclude_pattern")]
    pub exclude_pattern: Option<String>,
    /// Maximum number of warnings tolerated.
    #[serde(default)]
    pub threshold: usize,
}

impl Default for LogAnalysisConfig {
    fn default() -> Self {
        Self {
            parser: default_compiler_parser(),
            exclude_pattern: default_exclude_pattern(),
            threshold: 0,
        }
    }
}

fn default_downstream_checkout() -> String {
    "ci/checkout_downstream.sh".to_string()
}

fn default_downstream_build() -> String {
    "ci/build_downstream.sh".to_string()
}

/// Downstream build stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownstreamConfig {
    /// Workspace-relative script that checks out the downstream project.
    #[serde(default = "default_downstream_checkout")]
    pub checkout_script: String,
    /// Workspace-relative script that builds the downstream project.
    #[serde(default = "default_downstream_build")]
    pub build_script: String,
    /// Command timeout in seconds, applied to each script.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Scopes the downstream stage runs in.
    #[serde(default = "full_scopes")]
    pub scopes: Vec<ScopeKind>,
}

impl Default for DownstreamConfig {
    fn default() -> Self {
        Self {
            checkout_script: default_downstream_checkout(),
            build_script: default_downstream_build(),
            timeout_secs: None,
            scopes: full_scopes(),
        }
    }
}

fn default_test_script() -> String {
    "ci/test.sh".to_string()
}

fn default_report_pattern() -> String {
    "test-results/*.xml".to_string()
}

fn default_image_pattern() -> String {
    "test-images/**/*.png".to_string()
}

/// Test stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConfig {
    /// Workspace-relative test script.
    #[serde(default = "default_test_script")]
    pub script: String,
    /// Workspace-relative glob locating the JUnit XML report(s).
    #[serde(default = "default_report_pattern")]
    pub report_pattern: String,
    /// Workspace-relative glob of image artifacts to archive.
    #[serde(default = "default_image_pattern")]
    pub image_pattern: String,
    /// Command timeout in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Scopes the test stage runs in.
    #[serde(default = "full_scopes")]
    pub scopes: Vec<ScopeKind>,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            script: default_test_script(),
            report_pattern: default_report_pattern(),
            image_pattern: default_image_pattern(),
            timeout_secs: None,
            scopes: full_scopes(),
        }
    }
}
