//! Cleanup registry and run-with-cleanup helper.
//!
//! Scope releases are registered here as they are acquired and executed in
//! LIFO order so nested contexts unwind innermost first.

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

type CleanupCallback = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), String>> + Send>;

/// Outcome of running every registered cleanup callback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Names of callbacks that completed, in execution order.
    pub completed: Vec<String>,
    /// Names and reasons of callbacks that failed or timed out.
    pub failed: Vec<(String, String)>,
}

impl CleanupReport {
    /// Returns true if every callback completed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Registry for cleanup callbacks executed in LIFO order.
#[derive(Default)]
pub struct CleanupRegistry {
    callbacks: Mutex<Vec<(String, CleanupCallback)>>,
}

impl CleanupRegistry {
    /// Creates a new cleanup registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a cleanup callback.
    pub fn register<F, Fut>(&self, name: impl Into<String>, callback: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        let boxed: CleanupCallback = Box::new(move || callback().boxed());
        self.callbacks.lock().push((name.into(), boxed));
    }

    /// Returns the number of pending cleanup callbacks.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.callbacks.lock().len()
    }

    /// Runs all cleanup callbacks in LIFO order.
    ///
    /// Each callback gets its own timeout. Failures, panics and timeouts are
    /// collected but don't stop later callbacks from running. The registry is
    /// empty afterwards.
    pub async fn run_all(&self, per_callback_timeout: Duration) -> CleanupReport {
        let callbacks: Vec<_> = std::mem::take(&mut *self.callbacks.lock());
        let mut report = CleanupReport::default();

        for (name, callback) in callbacks.into_iter().rev() {
            let fut = std::panic::AssertUnwindSafe(callback()).catch_unwind();
            match timeout(per_callback_timeout, fut).await {
                Ok(Ok(Ok(()))) => report.completed.push(name),
                Ok(Ok(Err(reason))) => {
                    warn!(cleanup = %name, %reason, "Cleanup callback failed");
                    report.failed.push((name, reason));
                }
                Ok(Err(_)) => {
                    warn!(cleanup = %name, "Cleanup callback panicked");
                    report.failed.push((name, "panicked".to_string()));
                }
                Err(_) => {
                    warn!(cleanup = %name, "Cleanup callback timed out");
                    report.failed.push((name, "timed out".to_string()));
                }
            }
        }

        report
    }
}

impl std::fmt::Debug for CleanupRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupRegistry")
            .field("pending_count", &self.pending_count())
            .finish()
    }
}

/// Runs `operation` to completion, then always runs `cleanup`.
///
/// A panic inside `operation` is caught so that `cleanup` still runs; the
/// panic is then resumed. Returns both results.
pub async fn run_with_cleanup<T, C, Fut, F, CFut>(operation: Fut, cleanup: F) -> (T, C)
where
    Fut: Future<Output = T>,
    F: FnOnce() -> CFut,
    CFut: Future<Output = C>,
{
    let result = std::panic::AssertUnwindSafe(operation).catch_unwind().await;
    let cleaned = cleanup().await;
    match result {
        Ok(value) => (value, cleaned),
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_registry_lifo_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let registry = CleanupRegistry::new();

        for i in 1..=3 {
            let order = order.clone();
            registry.register(format!("scope-{i}"), move || async move {
                order.lock().push(i);
                Ok(())
            });
        }

        let report = registry.run_all(Duration::from_secs(1)).await;

        assert!(report.is_clean());
        assert_eq!(report.completed, vec!["scope-3", "scope-2", "scope-1"]);
        assert_eq!(*order.lock(), vec![3, 2, 1]);
        assert_eq!(registry.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_registry_continues_after_failure() {
        let registry = CleanupRegistry::new();
        let ran = Arc::new(AtomicBool::new(false));

        let ran_clone = ran.clone();
        registry.register("outer", move || async move {
            ran_clone.store(true, Ordering::SeqCst);
            Ok(())
        });
        registry.register("inner", || async { Err("scancel exited 1".to_string()) });

        let report = registry.run_all(Duration::from_secs(1)).await;

        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(report.completed, vec!["outer"]);
        assert_eq!(report.failed, vec![("inner".to_string(), "scancel exited 1".to_string())]);
    }

    #[tokio::test]
    async fn test_registry_timeout() {
        let registry = CleanupRegistry::new();
        registry.register("slow", || async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        });

        let report = registry.run_all(Duration::from_millis(10)).await;

        assert!(report.completed.is_empty());
        assert_eq!(report.failed[0].0, "slow");
    }

    #[tokio::test]
    async fn test_registry_catches_panics() {
        let registry = CleanupRegistry::new();
        registry.register("panics", || async { panic!("boom") });

        let report = registry.run_all(Duration::from_secs(1)).await;
        assert_eq!(report.failed, vec![("panics".to_string(), "panicked".to_string())]);
    }

    #[tokio::test]
    async fn test_run_with_cleanup_returns_both() {
        let (value, cleaned) = run_with_cleanup(async { 42 }, || async { "cleaned" }).await;
        assert_eq!(value, 42);
        assert_eq!(cleaned, "cleaned");
    }

    #[tokio::test]
    async fn test_run_with_cleanup_runs_after_panic() {
        let cleaned = Arc::new(AtomicBool::new(false));
        let flag = cleaned.clone();

        let handle = tokio::spawn(async move {
            run_with_cleanup(async { panic!("stage exploded") }, move || async move {
                flag.store(true, Ordering::SeqCst);
            })
            .await
        });

        let joined: std::result::Result<((), ()), _> = handle.await;
        assert!(joined.is_err());
        assert!(cleaned.load(Ordering::SeqCst));
    }
}
