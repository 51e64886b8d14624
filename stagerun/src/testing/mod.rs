//! Test doubles and helpers for stagerun pipelines.
//!
//! - Mock stages that record execution order
//! - A scripted command runner and a recording scope
//! - Context builders and output assertions

mod assertions;
mod contexts;
mod mocks;

pub use assertions::{
    assert_output_contains, assert_output_failed, assert_output_status,
    assert_output_succeeded, assert_output_value, assert_run_order,
};
pub use contexts::{
    local_stage_context, local_stage_context_with_sink, scope_env, scope_env_with, stage_context, stage_context_with,
    write_script,
};
pub use mocks::{
    ExecutionLog, FailingStage, PanickingStage, RecordingScope, RecordingStage, ScriptedCommandRunner,
    SlowStage,
};
