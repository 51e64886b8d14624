//! Warning thresholds and the known-warning baseline.

use super::Warning;
use crate::errors::{Result, StagerunError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info};

/// Which warnings count against the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateMode {
    /// Only warnings missing from the baseline.
    New,
    /// Every warning.
    Total,
}

/// Result of evaluating a gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateOutcome {
    /// All warnings found.
    pub total: usize,
    /// Warnings not present in the baseline.
    pub new: usize,
    /// The number compared against the threshold.
    pub counted: usize,
    /// Maximum tolerated.
    pub threshold: usize,
    /// Whether the gate passed.
    pub passed: bool,
}

/// Fails a stage when too many warnings are found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityGate {
    /// Maximum number of counted warnings tolerated.
    pub threshold: usize,
    /// What is counted.
    pub mode: GateMode,
}

impl QualityGate {
    /// Gate on warnings not present in the baseline.
    #[must_use]
    pub fn new_warnings(threshold: usize) -> Self {
        Self {
            threshold,
            mode: GateMode::New,
        }
    }

    /// Gate on all warnings.
    #[must_use]
    pub fn total_warnings(threshold: usize) -> Self {
        Self {
            threshold,
            mode: GateMode::Total,
        }
    }

    /// Evaluates `warnings`. Without a baseline every warning is new.
    #[must_use]
    pub fn evaluate(&self, warnings: &[Warning], baseline: Option<&WarningBaseline>) -> GateOutcome {
        let total = warnings.len();
        let new = baseline.map_or(total, |b| b.new_warnings(warnings).len());
        let counted = match self.mode {
            GateMode::New => new,
            GateMode::Total => total,
        };
        GateOutcome {
            total,
            new,
            counted,
            threshold: self.threshold,
            passed: counted <= self.threshold,
        }
    }
}

/// Fingerprints of warnings accepted as known.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningBaseline {
    /// When the baseline was written (ISO 8601).
    #[serde(default)]
    pub created_at: String,
    /// Warning fingerprints.
    #[serde(default)]
    pub fingerprints: BTreeSet<String>,
}

impl WarningBaseline {
    /// Builds a baseline accepting `warnings`.
    #[must_use]
    pub fn from_warnings(warnings: &[Warning]) -> Self {
        Self {
            created_at: crate::utils::iso_timestamp(),
            fingerprints: warnings.iter().map(Warning::fingerprint).collect(),
        }
    }

    /// Builds a baseline from a warnings summary written by the lint stage.
    ///
    /// # Errors
    ///
    /// Fails if the summary cannot be read or parsed.
    pub fn from_summary(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let warnings: Vec<Warning> = serde_json::from_str(&raw)?;
        Ok(Self::from_warnings(&warnings))
    }

    /// Loads a baseline. A missing file is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Fails if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        match std::fs::read_to_string(path) {
            Ok(raw) => {
                let baseline: Self = serde_json::from_str(&raw)?;
                debug!(path = %path.display(), known = baseline.len(), "Loaded warning baseline");
                Ok(Some(baseline))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StagerunError::Io(e)),
        }
    }

    /// Writes the baseline as JSON, creating parent directories.
    ///
    /// # Errors
    ///
    /// Fails on I/O or serialization errors.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!(path = %path.display(), known = self.len(), "Saved warning baseline");
        Ok(())
    }

    /// Whether `warning` is known.
    #[must_use]
    pub fn contains(&self, warning: &Warning) -> bool {
        self.fingerprints.contains(&warning.fingerprint())
    }

    /// The warnings not in the baseline.
    #[must_use]
    pub fn new_warnings<'a>(&self, warnings: &'a [Warning]) -> Vec<&'a Warning> {
        warnings.iter().filter(|w| !self.contains(w)).collect()
    }

    /// Number of known fingerprints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }

    /// True if nothing is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }
}
