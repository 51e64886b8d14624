//! Machine label scope.

use super::{ActiveScope, ExecutionScope, ScopeEnv};
use crate::errors::ScopeError;
use async_trait::async_trait;
use tracing::debug;

/// Environment variable listing the labels of the executing host.
pub const NODE_LABELS_ENV: &str = "STAGERUN_NODE_LABELS";

/// Labels carried by this host.
///
/// Read from `STAGERUN_NODE_LABELS` (comma separated). Without it the host
/// carries its host name and `any`.
#[must_use]
pub fn host_labels() -> Vec<String> {
    if let Ok(raw) = std::env::var(NODE_LABELS_ENV) {
        return parse_labels(&raw);
    }

    let hostname = std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty());

    let mut labels: Vec<String> = hostname.into_iter().collect();
    labels.push("any".to_string());
    labels
}

fn parse_labels(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .map(String::from)
        .collect()
}

/// Requires the executing host to carry a label.
///
/// The runner executes on the current host, so this scope only checks; it
/// adds no prefix.
#[derive(Debug, Clone)]
pub struct NodeScope {
    label: String,
    available: Vec<String>,
}

impl NodeScope {
    /// Creates a node scope requiring `label` among `available`.
    #[must_use]
    pub fn new(label: impl Into<String>, available: Vec<String>) -> Self {
        Self {
            label: label.into(),
            available,
        }
    }
}

#[async_trait]
impl ExecutionScope for NodeScope {
    fn describe(&self) -> String {
        format!("node({})", self.label)
    }

    async fn acquire(&self, _env: &ScopeEnv) -> Result<ActiveScope, ScopeError> {
        if !self.available.iter().any(|l| *l == self.label) {
            return Err(ScopeError::LabelUnavailable {
                label: self.label.clone(),
                available: self.available.clone(),
            });
        }
        debug!(label = %self.label, "Host label matched");
        Ok(ActiveScope::new(self.describe()).with_env("STAGERUN_NODE_LABEL", self.label.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::scope_env;

    #[test]
    fn test_parse_labels() {
        assert_eq!(parse_labels(" linux, gpu ,,"), vec!["linux", "gpu"]);
    }

    #[test]
    fn test_host_labels_include_any_without_env() {
        if std::env::var(NODE_LABELS_ENV).is_err() {
            assert!(host_labels().contains(&"any".to_string()));
        }
    }

    #[tokio::test]
    async fn test_acquire_matching_label() {
        let scope = NodeScope::new("linux", vec!["any".into(), "linux".into()]);
        let active = scope.acquire(&scope_env()).await.unwrap();
        assert_eq!(active.description, "node(linux)");
        assert!(active.prefix.is_empty());
    }

    #[tokio::test]
    async fn test_acquire_missing_label() {
        let scope = NodeScope::new("gpu", vec!["linux".into()]);
        let err = scope.acquire(&scope_env()).await.unwrap_err();
        assert!(matches!(err, ScopeError::LabelUnavailable { .. }));
    }
}
