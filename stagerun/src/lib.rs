//! # Stagerun
//!
//! A sequential CI pipeline runner.
//!
//! Stagerun executes a fixed, ordered list of stages (reset workspace,
//! checkout, lint, build, log analysis, downstream build, test) with:
//!
//! - **Fail-fast execution**: the first failing stage skips everything after it
//! - **Guaranteed cleanup**: a workspace reset runs exactly once, even after an abort
//! - **Scoped execution contexts**: machine labels, isolation profiles and
//!   scheduler allocations wrap each stage's commands and are released in reverse
//! - **Quality gates**: style-checker and compiler-warning thresholds, JUnit verdicts
//! - **Event-driven observability**: lifecycle events plus `tracing` spans
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stagerun::prelude::*;
//!
//! let config = PipelineConfig::default()
//!     .with_workspace("/srv/ci/job")
//!     .with_repository("https://example.org/app.git");
//! let pipeline = standard_pipeline(&config)?;
//! let ctx = pipeline_context(&config, Arc::new(LocalCommandRunner::new()), cancel);
//!
//! let result = pipeline.run(Arc::new(ctx)).await;
//! std::process::exit(result.status.exit_code());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod analysis;
pub mod cancellation;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod process;
pub mod scopes;
pub mod stages;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::{CancellationToken, CleanupRegistry};
    pub use crate::config::{PipelineConfig, ScopeKind};
    pub use crate::context::{ExecutionContext, PipelineContext, RunIdentity, StageContext};
    pub use crate::core::{
        ArtifactKind, RunStatus, StageArtifact, StageEvent, StageOutput, StageStatus,
    };
    pub use crate::errors::{
        PipelineValidationError, ReportError, Result, ScopeError, StagerunError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::pipeline::{
        pipeline_context, standard_pipeline, Pipeline, PipelineBuilder, RunResult, StageSpec,
    };
    pub use crate::process::{CommandRunner, LocalCommandRunner, ShellCommand};
    pub use crate::scopes::{ExecutionScope, ScopeSpec};
    pub use crate::stages::Stage;
    pub use crate::utils::{iso_timestamp, Timestamp};
}
