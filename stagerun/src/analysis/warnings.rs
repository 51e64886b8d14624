//! Warning parsers for style checkers and compilers.

use crate::errors::ReportError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

// path:line:col: E501 line too long (82 > 79 characters)
#[allow(clippy::expect_used)]
static PEP8_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<file>[^:\s][^:]*):(?P<line>\d+):(?P<col>\d+):\s+(?P<code>[EWC]\d+)\s+(?P<msg>.+)$")
        .expect("valid regex")
});

#[allow(clippy::expect_used)]
static FLAKE8_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<file>[^:\s][^:]*):(?P<line>\d+):(?P<col>\d+):\s+(?P<code>[A-Z]{1,3}\d+)\s+(?P<msg>.+)$")
        .expect("valid regex")
});

// path:line[:col]: warning: message [-Wflag]
#[allow(clippy::expect_used)]
static GCC_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<file>[^:\s][^:]*):(?P<line>\d+):(?:(?P<col>\d+):)?\s*warning:\s*(?P<msg>.+?)(?:\s+\[(?P<code>-W[^\]]+)\])?$",
    )
    .expect("valid regex")
});

/// How serious a warning is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Reported as an error by the tool (e.g. pycodestyle `E` codes).
    Error,
    /// A plain warning.
    Warning,
    /// Conventions and complexity notes.
    Info,
}

/// One warning found in a log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Warning {
    /// File the warning points at, relative as reported by the tool.
    pub file: String,
    /// 1-based line number.
    pub line: u32,
    /// 1-based column, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    /// Tool-specific code (`E501`, `-Wunused-variable`) or `warning`.
    pub category: String,
    /// Severity.
    pub severity: Severity,
    /// The warning text.
    pub message: String,
}

impl Warning {
    /// Stable identity of the warning, insensitive to line moves.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.category.as_bytes());
        hasher.update([0]);
        hasher.update(self.file.as_bytes());
        hasher.update([0]);
        hasher.update(self.message.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.column {
            Some(col) => write!(f, "{}:{}:{}: {} {}", self.file, self.line, col, self.category, self.message),
            None => write!(f, "{}:{}: {} {}", self.file, self.line, self.category, self.message),
        }
    }
}

/// Supported warning formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningParser {
    /// pep8 / pycodestyle.
    Pep8,
    /// flake8 (pycodestyle plus pyflakes and plugins).
    Flake8,
    /// GNU C/C++ compiler.
    Gcc,
    /// Clang.
    Clang,
}

impl WarningParser {
    /// Looks a parser up by name.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::UnknownParser`] for unsupported names.
    pub fn from_name(name: &str) -> Result<Self, ReportError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "pep8" | "pycodestyle" => Ok(Self::Pep8),
            "flake8" => Ok(Self::Flake8),
            "gcc" | "gcc4" | "g++" | "gnu" => Ok(Self::Gcc),
            "clang" | "clang++" => Ok(Self::Clang),
            _ => Err(ReportError::UnknownParser {
                name: name.to_string(),
            }),
        }
    }

    /// Canonical name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pep8 => "pep8",
            Self::Flake8 => "flake8",
            Self::Gcc => "gcc",
            Self::Clang => "clang",
        }
    }

    fn pattern(&self) -> &'static Regex {
        match self {
            Self::Pep8 => &PEP8_PATTERN,
            Self::Flake8 => &FLAKE8_PATTERN,
            Self::Gcc | Self::Clang => &GCC_PATTERN,
        }
    }

    /// Extracts warnings from `text`. Exact duplicates (same location and
    /// message, e.g. from a header included twice) are reported once.
    #[must_use]
    pub fn parse(&self, text: &str) -> Vec<Warning> {
        let pattern = self.pattern();
        let mut seen = HashSet::new();
        let mut warnings = Vec::new();

        for raw in text.lines() {
            let line = raw.trim_end_matches('\r');
            let Some(caps) = pattern.captures(line) else {
                continue;
            };
            let (Some(file), Some(line_no), Some(msg)) =
                (caps.name("file"), caps.name("line"), caps.name("msg"))
            else {
                continue;
            };
            let Ok(line_no) = line_no.as_str().parse::<u32>() else {
                continue;
            };

            let category = caps
                .name("code")
                .map_or_else(|| "warning".to_string(), |m| m.as_str().to_string());
            let warning = Warning {
                file: normalize_path(file.as_str()),
                line: line_no,
                column: caps.name("col").and_then(|m| m.as_str().parse().ok()),
                severity: self.severity(&category),
                category,
                message: msg.as_str().trim().to_string(),
            };

            if seen.insert(warning.clone()) {
                warnings.push(warning);
            }
        }

        warnings
    }

    fn severity(&self, category: &str) -> Severity {
        match self {
            Self::Pep8 | Self::Flake8 => match category.chars().next() {
                Some('E' | 'F') => Severity::Error,
                Some('W') => Severity::Warning,
                _ => Severity::Info,
            },
            Self::Gcc | Self::Clang => Severity::Warning,
        }
    }
}

impl fmt::Display for WarningParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn normalize_path(path: &str) -> String {
    path.trim().trim_start_matches("./").to_string()
}

/// Drops warnings whose file path matches `exclude`.
#[must_use]
pub fn exclude_matching(warnings: Vec<Warning>, exclude: Option<&Regex>) -> Vec<Warning> {
    match exclude {
        Some(pattern) => warnings
            .into_iter()
            .filter(|w| !pattern.is_match(&w.file))
            .collect(),
        None => warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PEP8_LOG: &str = "\
./pkg/core.py:12:80: E501 line too long (92 > 79 characters)
pkg/util.py:3:1: W391 blank line at end of file
pkg/util.py:7:5: C901 'merge' is too complex (12)
not a warning line
";

    const GCC_LOG: &str = "\
+ make -j4
src/io.c: In function 'read_all':
src/io.c:42:9: warning: unused variable 'n' [-Wunused-variable]
third_party/zlib/inflate.c:100:3: warning: this statement may fall through [-Wimplicit-fallthrough=]
include/defs.h:7: warning: \"MAX\" redefined
src/io.c:42:9: warning: unused variable 'n' [-Wunused-variable]
src/main.c:10:1: error: expected ';' before '}' token
";

    #[test]
    fn test_from_name() {
        assert_eq!(WarningParser::from_name("pycodestyle").unwrap(), WarningParser::Pep8);
        assert_eq!(WarningParser::from_name("GCC").unwrap(), WarningParser::Gcc);
        assert!(matches!(
            WarningParser::from_name("javac"),
            Err(ReportError::UnknownParser { .. })
        ));
    }

    #[test]
    fn test_parse_pep8() {
        let warnings = WarningParser::Pep8.parse(PEP8_LOG);
        assert_eq!(warnings.len(), 3);
        assert_eq!(warnings[0].file, "pkg/core.py");
        assert_eq!(warnings[0].line, 12);
        assert_eq!(warnings[0].column, Some(80));
        assert_eq!(warnings[0].category, "E501");
        assert_eq!(warnings[0].severity, Severity::Error);
        assert_eq!(warnings[1].severity, Severity::Warning);
        assert_eq!(warnings[2].severity, Severity::Info);
    }

    #[test]
    fn test_parse_flake8_accepts_plugin_codes() {
        let log = "app.py:1:1: F401 'os' imported but unused\napp.py:9:1: B006 mutable default\n";
        let warnings = WarningParser::Flake8.parse(log);
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[1].category, "B006");
        assert!(WarningParser::Pep8.parse(log).is_empty());
    }

    #[test]
    fn test_parse_gcc_dedups_and_ignores_errors() {
        let warnings = WarningParser::Gcc.parse(GCC_LOG);
        assert_eq!(warnings.len(), 3);
        assert_eq!(warnings[0].category, "-Wunused-variable");
        assert_eq!(warnings[0].message, "unused variable 'n'");
        assert_eq!(warnings[2].column, None);
        assert_eq!(warnings[2].category, "warning");
    }

    #[test]
    fn test_exclude_matching() {
        let exclude = Regex::new(r"^third_party/").unwrap();
        let warnings = exclude_matching(WarningParser::Gcc.parse(GCC_LOG), Some(&exclude));
        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().all(|w| !w.file.starts_with("third_party")));
    }

    #[test]
    fn test_fingerprint_ignores_line_numbers() {
        let mut a = WarningParser::Pep8.parse(PEP8_LOG).remove(0);
        let fp = a.fingerprint();
        a.line += 10;
        assert_eq!(a.fingerprint(), fp);
        a.message.push('!');
        assert_ne!(a.fingerprint(), fp);
        assert_eq!(fp.len(), 64);
    }
}
