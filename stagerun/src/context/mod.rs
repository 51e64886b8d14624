//! Execution contexts.
//!
//! A [`PipelineContext`] is created once per run and shared by every stage.
//! Each stage receives a [`StageContext`] carrying the scopes it was entered
//! with; commands run through it are wrapped by those scopes.

mod execution;
mod identity;

pub use execution::{ExecutionContext, PipelineContext, StageContext};
pub use identity::RunIdentity;
