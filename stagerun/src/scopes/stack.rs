//! Nested scope acquisition with LIFO release.

use super::{ActiveScope, ExecutionScope, ScopeEnv};
use crate::cancellation::{CleanupRegistry, CleanupReport};
use crate::errors::ScopeError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// The scopes a stage has entered, outermost first.
///
/// Every acquired scope registers its release in a [`CleanupRegistry`], so
/// [`ScopeStack::exit`] releases them innermost first, exactly once, and
/// keeps going when one release fails.
#[derive(Debug, Default)]
pub struct ScopeStack {
    active: Vec<ActiveScope>,
    releases: CleanupRegistry,
}

impl ScopeStack {
    /// Acquires `scopes` in order.
    ///
    /// If the k-th acquisition fails, the k-1 scopes already held are
    /// released (in reverse order) before the error is returned together
    /// with that release report.
    pub async fn enter(
        scopes: &[Arc<dyn ExecutionScope>],
        env: &ScopeEnv,
        release_timeout: Duration,
    ) -> Result<Self, (ScopeError, CleanupReport)> {
        let mut stack = Self::default();

        for scope in scopes {
            match scope.acquire(env).await {
                Ok(active) => {
                    debug!(scope = %active.description, "Scope acquired");
                    let releaser = scope.clone();
                    let release_env = env.clone();
                    let held = active.clone();
                    stack
                        .releases
                        .register(active.description.clone(), move || async move {
                            releaser
                                .release(held, &release_env)
                                .await
                                .map_err(|e| e.to_string())
                        });
                    stack.active.push(active);
                }
                Err(err) => {
                    warn!(scope = %scope.describe(), error = %err, "Scope acquisition failed");
                    let report = stack.exit(release_timeout).await;
                    return Err((err, report));
                }
            }
        }

        Ok(stack)
    }

    /// The active scopes, outermost first.
    #[must_use]
    pub fn active(&self) -> &[ActiveScope] {
        &self.active
    }

    /// Descriptions of the active scopes, outermost first.
    #[must_use]
    pub fn descriptions(&self) -> Vec<String> {
        self.active.iter().map(|s| s.description.clone()).collect()
    }

    /// Releases every held scope, innermost first.
    pub async fn exit(self, release_timeout: Duration) -> CleanupReport {
        self.releases.run_all(release_timeout).await
    }
}
