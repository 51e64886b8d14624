//! Log and report analysis.
//!
//! Warning parsers turn tool output into [`Warning`]s, a [`QualityGate`]
//! decides whether they fail the stage, [`junit`] reads test reports and
//! [`archive`] copies files into the artifacts directory.

pub mod archive;
pub mod junit;
mod quality_gate;
mod warnings;

pub use archive::{archive_file, archive_matching};
pub use junit::{parse_junit, parse_reports, TestCaseResult, TestOutcome, TestReport};
pub use quality_gate::{GateMode, GateOutcome, QualityGate, WarningBaseline};
pub use warnings::{exclude_matching, Severity, Warning, WarningParser};
