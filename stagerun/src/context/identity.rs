//! Run identity.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunIdentity {
    /// Unique ID generated for this run.
    pub run_id: Uuid,
    /// Job name reported by the automation server.
    pub job_name: String,
    /// Build number reported by the automation server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_number: Option<String>,
    /// When the run started (ISO 8601).
    pub started_at: String,
}

impl Default for RunIdentity {
    fn default() -> Self {
        Self::new("local")
    }
}

impl RunIdentity {
    /// Creates a run identity with a generated run ID.
    #[must_use]
    pub fn new(job_name: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            job_name: job_name.into(),
            build_number: None,
            started_at: crate::utils::iso_timestamp(),
        }
    }

    /// Creates a run identity with a specific run ID.
    #[must_use]
    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }

    /// Sets the build number.
    #[must_use]
    pub fn with_build_number(mut self, build_number: impl Into<String>) -> Self {
        self.build_number = Some(build_number.into());
        self
    }

    /// A short label for logs, e.g. `nightly#42`.
    #[must_use]
    pub fn label(&self) -> String {
        match &self.build_number {
            Some(number) => format!("{}#{number}", self.job_name),
            None => self.job_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_generates_unique_ids() {
        let a = RunIdentity::new("nightly");
        let b = RunIdentity::new("nightly");
        assert_ne!(a.run_id, b.run_id);
    }

    #[test]
    fn test_label() {
        assert_eq!(RunIdentity::new("nightly").label(), "nightly");
        assert_eq!(
            RunIdentity::new("nightly").with_build_number("42").label(),
            "nightly#42"
        );
    }

    #[test]
    fn test_serialization_skips_missing_build_number() {
        let json = serde_json::to_value(RunIdentity::new("job")).unwrap();
        assert!(json.get("build_number").is_none());
        assert_eq!(json["job_name"], "job");
    }
}
