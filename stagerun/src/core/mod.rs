//! Core domain model types for stagerun.
//!
//! This module contains the fundamental types used throughout the runner:
//! - Stage and run status enums
//! - Stage output type with factory methods
//! - Stage artifacts and lifecycle events

mod artifact;
mod event;
mod output;
mod status;

pub use artifact::{ArtifactKind, StageArtifact};
pub use event::StageEvent;
pub use output::StageOutput;
pub use status::{RunStatus, StageStatus};
