//! Command model.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A command line plus the environment it runs in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellCommand {
    /// Program to execute.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<String>,
    /// Extra environment variables layered over the inherited environment.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Working directory. Defaults to the workspace when run through a stage.
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    /// Kill the command if it runs longer than this.
    #[serde(default)]
    pub timeout: Option<Duration>,
    /// File receiving the combined stdout/stderr.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl ShellCommand {
    /// Creates a command for `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// Builds a command from an argv vector. Returns `None` for an empty vector.
    #[must_use]
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone()).args(args.iter().cloned()))
    }

    /// `sh [-x] <path>`.
    #[must_use]
    pub fn script(path: impl AsRef<Path>, debug: bool) -> Self {
        let mut cmd = Self::new("sh");
        if debug {
            cmd = cmd.arg("-x");
        }
        cmd.arg(path.as_ref().to_string_lossy())
    }

    /// Appends an argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the timeout from an optional number of seconds.
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.timeout = secs.map(Duration::from_secs);
        self
    }

    /// Writes the combined output to `path`.
    #[must_use]
    pub fn log_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    /// Prepends a wrapper command line (e.g. `srun --jobid 42`).
    #[must_use]
    pub fn with_prefix(mut self, prefix: &[String]) -> Self {
        let Some((program, rest)) = prefix.split_first() else {
            return self;
        };
        let mut args = rest.to_vec();
        args.push(std::mem::replace(&mut self.program, program.clone()));
        args.append(&mut self.args);
        self.args = args;
        self
    }

    /// The full argv, program first.
    #[must_use]
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Renders the command line for logs and error messages.
    #[must_use]
    pub fn display(&self) -> String {
        self.argv()
            .iter()
            .map(|part| quote(part))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn quote(part: &str) -> String {
    if !part.is_empty()
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@+,{}%".contains(c))
    {
        part.to_string()
    } else {
        format!("'{}'", part.replace('\'', r"'\''"))
    }
}
