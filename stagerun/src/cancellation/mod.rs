//! Structured cancellation and cleanup utilities.
//!
//! This module provides:
//! - CancellationToken for cooperative abort handling
//! - CleanupRegistry for LIFO release of scoped contexts
//! - run_with_cleanup for finally-style guarantees

mod cleanup;
mod token;

pub use cleanup::{run_with_cleanup, CleanupRegistry, CleanupReport};
pub use token::{CancelCallback, CancellationToken};
