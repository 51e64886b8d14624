//! Captured command output.

use serde::{Deserialize, Serialize};

/// How much of each stream is kept in memory (the tail).
pub const OUTPUT_TAIL_LIMIT: usize = 256 * 1024;

const TRUNCATION_MARKER: &str = "...[truncated - showing last 256 KiB of output]...\n";

/// The result of a command that ran to completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    /// Tail of standard output.
    pub stdout: String,
    /// Tail of standard error.
    pub stderr: String,
    /// Wall-clock duration.
    pub duration_ms: f64,
    /// Whether either stream was truncated.
    pub truncated: bool,
}

impl CommandOutput {
    /// Creates an output with the given exit code and no captured text.
    #[must_use]
    pub fn exited(code: i32) -> Self {
        Self {
            exit_code: Some(code),
            ..Default::default()
        }
    }

    /// Sets the captured stdout.
    #[must_use]
    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    /// Sets the captured stderr.
    #[must_use]
    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = stderr.into();
        self
    }

    /// True if the command exited with status 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Exit code, with -1 standing in for death by signal.
    #[must_use]
    pub fn code(&self) -> i32 {
        self.exit_code.unwrap_or(-1)
    }

    /// stdout followed by stderr.
    #[must_use]
    pub fn combined(&self) -> String {
        let mut text = String::with_capacity(self.stdout.len() + self.stderr.len());
        text.push_str(&self.stdout);
        text.push_str(&self.stderr);
        text
    }
}

/// Keeps the last `limit` bytes of a text stream.
///
/// Errors usually show up at the end of build output, so the tail is what
/// matters.
#[derive(Debug, Clone)]
pub struct TailBuffer {
    text: String,
    limit: usize,
    truncated: bool,
}

impl Default for TailBuffer {
    fn default() -> Self {
        Self::new(OUTPUT_TAIL_LIMIT)
    }
}

impl TailBuffer {
    /// Creates an empty buffer holding at most `limit` bytes.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            text: String::new(),
            limit,
            truncated: false,
        }
    }

    /// Appends text, dropping from the front once over the limit.
    pub fn push(&mut self, chunk: &str) {
        self.text.push_str(chunk);
        if self.text.len() > self.limit {
            let mut start = self.text.len() - self.limit;
            while !self.text.is_char_boundary(start) {
                start += 1;
            }
            self.text.drain(..start);
            self.truncated = true;
        }
    }

    /// Whether anything has been dropped.
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// The retained text, prefixed by a marker when truncated.
    #[must_use]
    pub fn into_string(self) -> String {
        if self.truncated {
            format!("{TRUNCATION_MARKER}{}", self.text)
        } else {
            self.text
        }
    }
}
