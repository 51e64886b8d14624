//! Artifacts produced by stages.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// What an artifact contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// A log file (style checker or build output).
    Log,
    /// A JUnit XML test report.
    TestReport,
    /// An image produced by the tests.
    Image,
    /// A warnings summary.
    Warnings,
    /// Anything else.
    Other,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Log => write!(f, "log"),
            Self::TestReport => write!(f, "test_report"),
            Self::Image => write!(f, "image"),
            Self::Warnings => write!(f, "warnings"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// An artifact produced by a stage.
///
/// Artifacts point at files copied into the run's artifacts directory, so
/// they survive the workspace reset at the end of the run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageArtifact {
    /// The kind of artifact.
    pub kind: ArtifactKind,

    /// The artifact name (workspace-relative path of the source file).
    pub name: String,

    /// Where the archived copy lives.
    pub path: PathBuf,

    /// Size of the archived file in bytes.
    #[serde(default)]
    pub size_bytes: u64,

    /// When the artifact was created (ISO 8601).
    pub created_at: String,
}

impl StageArtifact {
    /// Creates a new stage artifact.
    #[must_use]
    pub fn new(kind: ArtifactKind, name: impl Into<String>, path: impl AsRef<Path>) -> Self {
        Self {
            kind,
            name: name.into(),
            path: path.as_ref().to_path_buf(),
            size_bytes: 0,
            created_at: crate::utils::iso_timestamp(),
        }
    }

    /// Sets the size in bytes.
    #[must_use]
    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = size_bytes;
        self
    }
}
