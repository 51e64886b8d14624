//! Pipeline building and execution.
//!
//! This module provides:
//! - Stage specifications with their scopes
//! - A pipeline builder with validation
//! - The sequential, fail-fast runner with guaranteed cleanup
//! - Assembly of the standard CI pipeline from configuration

mod builder;
mod integration_tests;
mod runner;
mod spec;
mod standard;

pub use builder::{PipelineBuilder, DEFAULT_RELEASE_TIMEOUT};
pub use runner::{FailureRecord, Pipeline, RunResult, StageRecord};
pub use spec::StageSpec;
pub use standard::{pipeline_context, standard_pipeline};
