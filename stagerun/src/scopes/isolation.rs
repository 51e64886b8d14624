//! Isolation profile scope (container runtime).

use super::{render_template, ActiveScope, ExecutionScope, ScopeEnv};
use crate::errors::ScopeError;
use async_trait::async_trait;
use std::path::Path;
use tracing::debug;

/// Runs commands inside a container application profile.
#[derive(Debug, Clone)]
pub struct IsolationScope {
    profile: String,
    image: String,
    template: Vec<String>,
    verify_runtime: bool,
}

impl IsolationScope {
    /// Creates an isolation scope.
    #[must_use]
    pub fn new(
        profile: impl Into<String>,
        image: impl Into<String>,
        template: Vec<String>,
        verify_runtime: bool,
    ) -> Self {
        Self {
            profile: profile.into(),
            image: image.into(),
            template,
            verify_runtime,
        }
    }
}

#[async_trait]
impl ExecutionScope for IsolationScope {
    fn describe(&self) -> String {
        format!("isolation({})", self.profile)
    }

    async fn acquire(&self, _env: &ScopeEnv) -> Result<ActiveScope, ScopeError> {
        let prefix = render_template(
            &self.template,
            &[("profile", self.profile.as_str()), ("image", self.image.as_str())],
        )?;

        if self.verify_runtime {
            if let Some(program) = prefix.first().filter(|p| !is_executable_on_path(p)) {
                return Err(ScopeError::RuntimeUnavailable {
                    program: program.clone(),
                });
            }
        }

        debug!(profile = %self.profile, image = %self.image, "Isolation profile ready");
        Ok(ActiveScope::new(self.describe())
            .with_prefix(prefix)
            .with_env("STAGERUN_ISOLATION_PROFILE", self.profile.clone()))
    }
}

fn is_executable_on_path(program: &str) -> bool {
    if program.contains('/') {
        return Path::new(program).is_file();
    }
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
        .unwrap_or(false)
}
