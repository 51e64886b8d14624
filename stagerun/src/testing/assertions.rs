//! Assertions for stage outputs and run results.

use crate::core::{StageOutput, StageStatus};
use crate::pipeline::RunResult;

/// Asserts that the output indicates success.
pub fn assert_output_succeeded(output: &StageOutput) {
    assert!(
        output.is_success(),
        "Expected success, got status: {:?} ({:?})",
        output.status,
        output.reason()
    );
}

/// Asserts that the output indicates failure.
pub fn assert_output_failed(output: &StageOutput) {
    assert!(
        output.is_failure(),
        "Expected failure, got status: {:?}",
        output.status
    );
}

/// Asserts that the output has the expected status.
pub fn assert_output_status(output: &StageOutput, expected: StageStatus) {
    assert_eq!(
        output.status, expected,
        "Expected status {:?}, got {:?} ({:?})",
        expected,
        output.status,
        output.reason()
    );
}

/// Asserts that the output contains a specific key.
pub fn assert_output_contains(output: &StageOutput, key: &str) {
    assert!(
        output.get(key).is_some(),
        "Expected output to contain key '{}'. Keys: {:?}",
        key,
        output.data.as_ref().map(|d| d.keys().collect::<Vec<_>>())
    );
}

/// Asserts that the output data contains a specific value.
pub fn assert_output_value(output: &StageOutput, key: &str, expected: &serde_json::Value) {
    let actual = output.get(key);
    assert_eq!(
        actual,
        Some(expected),
        "Expected value {expected:?} for key '{key}', got {actual:?}"
    );
}

/// Asserts the stages a run actually executed, cleanup included.
pub fn assert_run_order(result: &RunResult, expected: &[&str]) {
    let actual: Vec<&str> = result.execution_order.iter().map(String::as_str).collect();
    assert_eq!(actual, expected, "Unexpected execution order");
}
