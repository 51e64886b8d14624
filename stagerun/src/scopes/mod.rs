//! Scoped execution contexts.
//!
//! A scope is acquired before a stage's action runs and released when it
//! returns, whatever the outcome. While active it can prefix every command
//! (container runtime, scheduler step launcher) and add environment
//! variables. Scopes nest: they are acquired in declared order and released
//! in reverse.

mod allocation;
mod isolation;
mod node;
mod stack;
mod template;

pub use allocation::{AllocationScope, ALLOCATION_ID_ENV};
pub use isolation::IsolationScope;
pub use node::{host_labels, NodeScope, NODE_LABELS_ENV};
pub use stack::ScopeStack;
pub use template::render_template;

use crate::cancellation::CancellationToken;
use crate::config::{PipelineConfig, ScopeKind};
use crate::errors::ScopeError;
use crate::process::CommandRunner;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Declarative description of a scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScopeSpec {
    /// Run on a machine carrying `label`.
    Node {
        /// Required machine label.
        label: String,
    },
    /// Run inside the isolation profile `profile`.
    Isolation {
        /// Application profile name.
        profile: String,
    },
    /// Hold a scheduler allocation on `partition`.
    Allocation {
        /// Scheduler partition.
        partition: String,
    },
}

impl fmt::Display for ScopeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node { label } => write!(f, "node({label})"),
            Self::Isolation { profile } => write!(f, "isolation({profile})"),
            Self::Allocation { partition } => write!(f, "allocation({partition})"),
        }
    }
}

impl ScopeSpec {
    /// Resolves a scope kind against the configured label, profile and partition.
    #[must_use]
    pub fn from_kind(kind: ScopeKind, config: &PipelineConfig) -> Self {
        match kind {
            ScopeKind::Node => Self::Node {
                label: config.node.label.clone(),
            },
            ScopeKind::Isolation => Self::Isolation {
                profile: config.isolation.profile.clone(),
            },
            ScopeKind::Allocation => Self::Allocation {
                partition: config.scheduler.partition.clone(),
            },
        }
    }

    /// Builds the scope implementation for this spec.
    #[must_use]
    pub fn build(&self, config: &PipelineConfig) -> Arc<dyn ExecutionScope> {
        match self {
            Self::Node { label } => {
                let available = config.node.host_labels.clone().unwrap_or_else(host_labels);
                Arc::new(NodeScope::new(label.clone(), available))
            }
            Self::Isolation { profile } => Arc::new(IsolationScope::new(
                profile.clone(),
                config.isolation.image.clone(),
                config.isolation.runtime_template.clone(),
                config.isolation.verify_runtime,
            )),
            Self::Allocation { partition } => {
                Arc::new(AllocationScope::from_config(partition.clone(), &config.scheduler))
            }
        }
    }
}

/// What a scope needs from the run to acquire and release itself.
#[derive(Clone)]
pub struct ScopeEnv {
    /// Runner used for scheduler commands.
    pub runner: Arc<dyn CommandRunner>,
    /// The workspace directory.
    pub workspace: PathBuf,
    /// Job label used to name allocations.
    pub job_name: String,
    /// Base environment for scope commands.
    pub env: BTreeMap<String, String>,
    /// Run cancellation.
    pub cancel: Arc<CancellationToken>,
}

impl fmt::Debug for ScopeEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeEnv")
            .field("workspace", &self.workspace)
            .field("job_name", &self.job_name)
            .finish_non_exhaustive()
    }
}

/// A scope that has been acquired.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveScope {
    /// Human-readable description, e.g. `allocation(ci)#42`.
    pub description: String,
    /// Argv tokens prepended to commands run inside the scope.
    #[serde(default)]
    pub prefix: Vec<String>,
    /// Environment variables for commands run inside the scope.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Handle needed to release the scope (e.g. allocation id).
    #[serde(default)]
    pub handle: Option<String>,
}

impl ActiveScope {
    /// Creates an active scope with no prefix or environment.
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }

    /// Sets the command prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: Vec<String>) -> Self {
        self.prefix = prefix;
        self
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Replaces the environment.
    #[must_use]
    pub fn with_env_map(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Sets the release handle.
    #[must_use]
    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.handle = Some(handle.into());
        self
    }
}

/// A scoped execution context.
#[async_trait]
pub trait ExecutionScope: Send + Sync {
    /// Short description used in logs and events.
    fn describe(&self) -> String;

    /// Acquires the scope.
    async fn acquire(&self, env: &ScopeEnv) -> Result<ActiveScope, ScopeError>;

    /// Releases a previously acquired scope. Called exactly once per acquisition.
    async fn release(&self, _scope: ActiveScope, _env: &ScopeEnv) -> Result<(), ScopeError> {
        Ok(())
    }
}
