//! JUnit XML test report reader.
//!
//! Only the structure needed for a verdict is read: `testsuite`,
//! `testcase` and the `failure` / `error` / `skipped` markers inside a case.
//! Comments and CDATA sections are stripped first so captured output cannot
//! be mistaken for markup.

use crate::errors::{ReportError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

#[allow(clippy::expect_used)]
static NOISE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<!--.*?-->|<!\[CDATA\[.*?\]\]>|<\?.*?\?>").expect("valid regex")
});

// Attribute values may contain an unescaped `>`, so quoted values are consumed whole.
#[allow(clippy::expect_used)]
static TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"<(?P<close>/?)(?P<name>testsuites|testsuite|testcase|failure|error|skipped)\b(?P<attrs>(?:[^>"'/]|"[^"]*"|'[^']*'|/[^>])*)(?P<empty>/?)>"#,
    )
    .expect("valid regex")
});

#[allow(clippy::expect_used)]
static ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?P<key>[A-Za-z_][\w:.-]*)\s*=\s*(?:"(?P<dq>[^"]*)"|'(?P<sq>[^']*)')"#)
        .expect("valid regex")
});

#[allow(clippy::expect_used)]
static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(?:#x(?P<hex>[0-9A-Fa-f]+)|#(?P<dec>[0-9]+)|(?P<named>lt|gt|quot|apos|amp));")
        .expect("valid regex")
});

/// Outcome of one test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestOutcome {
    /// Passed.
    Passed,
    /// An assertion failed.
    Failed,
    /// The test raised an unexpected error.
    Errored,
    /// Skipped.
    Skipped,
}

/// One test case that did not pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCaseResult {
    /// Enclosing suite name.
    #[serde(default)]
    pub suite: String,
    /// Class name attribute.
    #[serde(default)]
    pub classname: String,
    /// Test name.
    pub name: String,
    /// Outcome.
    pub outcome: TestOutcome,
    /// Failure or error message attribute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Totals of one or more JUnit reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestReport {
    /// Number of test cases.
    pub total: usize,
    /// Passed cases.
    pub passed: usize,
    /// Failed cases.
    pub failed: usize,
    /// Errored cases.
    pub errored: usize,
    /// Skipped cases.
    pub skipped: usize,
    /// Failed and errored cases.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<TestCaseResult>,
}

impl TestReport {
    /// True if no case failed or errored.
    #[must_use]
    pub fn is_green(&self) -> bool {
        self.failed == 0 && self.errored == 0
    }

    /// Adds another report's totals to this one.
    pub fn merge(&mut self, other: Self) {
        self.total += other.total;
        self.passed += other.passed;
        self.failed += other.failed;
        self.errored += other.errored;
        self.skipped += other.skipped;
        self.failures.extend(other.failures);
    }

    fn record(&mut self, case: TestCaseResult) {
        self.total += 1;
        match case.outcome {
            TestOutcome::Passed => self.passed += 1,
            TestOutcome::Skipped => self.skipped += 1,
            TestOutcome::Failed => {
                self.failed += 1;
                self.failures.push(case);
            }
            TestOutcome::Errored => {
                self.errored += 1;
                self.failures.push(case);
            }
        }
    }
}

fn attributes(raw: &str) -> Vec<(String, String)> {
    ATTR.captures_iter(raw)
        .filter_map(|caps| {
            let key = caps.name("key")?.as_str().to_string();
            let value = caps.name("dq").or_else(|| caps.name("sq"))?.as_str();
            Some((key, unescape(value)))
        })
        .collect()
}

fn attribute(attrs: &[(String, String)], key: &str) -> Option<String> {
    attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
}

// Single pass, so `&amp;lt;` stays `&lt;`.
fn unescape(value: &str) -> String {
    ENTITY
        .replace_all(value, |caps: &regex::Captures<'_>| {
            let decoded = if let Some(hex) = caps.name("hex") {
                u32::from_str_radix(hex.as_str(), 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = caps.name("dec") {
                dec.as_str().parse().ok().and_then(char::from_u32)
            } else {
                match caps.name("named").map(|m| m.as_str()) {
                    Some("lt") => Some('<'),
                    Some("gt") => Some('>'),
                    Some("quot") => Some('"'),
                    Some("apos") => Some('\''),
                    Some("amp") => Some('&'),
                    _ => None,
                }
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

/// Parses one JUnit XML document.
///
/// # Errors
///
/// Returns [`ReportError::Malformed`] when the document has no test suite or
/// its test cases are not closed. `path` is only used in the error.
pub fn parse_junit(xml: &str, path: &Path) -> std::result::Result<TestReport, ReportError> {
    let malformed = |reason: &str| ReportError::Malformed {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    let cleaned = NOISE.replace_all(xml, "");
    let mut report = TestReport::default();
    let mut suites: Vec<String> = Vec::new();
    let mut saw_suite = false;
    let mut open_case: Option<TestCaseResult> = None;

    for caps in TAG.captures_iter(&cleaned) {
        let name = caps.name("name").map_or("", |m| m.as_str());
        let closing = caps.name("close").is_some_and(|m| !m.as_str().is_empty());
        let empty = caps.name("empty").is_some_and(|m| !m.as_str().is_empty());
        let attrs = attributes(caps.name("attrs").map_or("", |m| m.as_str()));

        match (name, closing) {
            ("testsuites", _) => saw_suite = true,
            ("testsuite", false) => {
                saw_suite = true;
                if !empty {
                    suites.push(attribute(&attrs, "name").unwrap_or_default());
                }
            }
            ("testsuite", true) => {
                suites.pop();
            }
            ("testcase", false) => {
                if open_case.is_some() {
                    return Err(malformed("nested <testcase>"));
                }
                let case = TestCaseResult {
                    suite: suites.last().cloned().unwrap_or_default(),
                    classname: attribute(&attrs, "classname").unwrap_or_default(),
                    name: attribute(&attrs, "name").unwrap_or_default(),
                    outcome: TestOutcome::Passed,
                    message: None,
                };
                if empty {
                    report.record(case);
                } else {
                    open_case = Some(case);
                }
            }
            ("testcase", true) => {
                let case = open_case
                    .take()
                    .ok_or_else(|| malformed("</testcase> without opening tag"))?;
                report.record(case);
            }
            (marker, false) => {
                // failure/error/skipped outside a case are suite-level summaries
                if let Some(case) = open_case.as_mut() {
                    let outcome = match marker {
                        "failure" => TestOutcome::Failed,
                        "error" => TestOutcome::Errored,
                        _ => TestOutcome::Skipped,
                    };
                    // an error wins over a failure; both win over skipped
                    let rank = |o: TestOutcome| match o {
                        TestOutcome::Passed => 0,
                        TestOutcome::Skipped => 1,
                        TestOutcome::Failed => 2,
                        TestOutcome::Errored => 3,
                    };
                    if rank(outcome) > rank(case.outcome) {
                        case.outcome = outcome;
                        case.message = attribute(&attrs, "message").or(case.message.take());
                    }
                }
            }
            (_, true) => {}
        }
    }

    if open_case.is_some() {
        return Err(malformed("unclosed <testcase>"));
    }
    if !saw_suite {
        return Err(malformed("no <testsuite> element"));
    }
    Ok(report)
}

/// Parses every report matching a workspace-relative glob and merges them.
///
/// # Errors
///
/// Returns [`ReportError::NotFound`] when nothing matches, or the first
/// parse failure.
pub fn parse_reports(workspace: &Path, pattern: &str) -> Result<(TestReport, Vec<PathBuf>)> {
    let paths = super::archive::glob_files(workspace, pattern)?;
    if paths.is_empty() {
        return Err(ReportError::NotFound {
            pattern: pattern.to_string(),
        }
        .into());
    }

    let mut report = TestReport::default();
    for path in &paths {
        let xml = std::fs::read_to_string(path)?;
        let parsed = parse_junit(&xml, path)?;
        debug!(report = %path.display(), total = parsed.total, failed = parsed.failed, "Parsed test report");
        report.merge(parsed);
    }
    Ok((report, paths))
}
