//! Copies workspace files into the artifacts directory.

use crate::core::{ArtifactKind, StageArtifact};
use crate::errors::{ReportError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Files under `root` matching the relative glob `pattern`, sorted.
///
/// # Errors
///
/// Returns [`ReportError::InvalidPattern`] for a bad glob.
pub fn glob_files(root: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let invalid = |reason: String| ReportError::InvalidPattern {
        pattern: pattern.to_string(),
        reason,
    };
    let full = format!(
        "{}/{}",
        glob::Pattern::escape(&root.to_string_lossy()),
        pattern.trim_start_matches("./")
    );

    let mut files: Vec<PathBuf> = glob::glob(&full)
        .map_err(|e| invalid(e.to_string()))?
        .filter_map(std::result::Result::ok)
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    Ok(files)
}

/// Copies one workspace-relative file into `dest_dir`, keeping its relative path.
///
/// # Errors
///
/// Fails if the file cannot be copied.
pub fn archive_file(
    workspace: &Path,
    relative: impl AsRef<Path>,
    dest_dir: &Path,
    kind: ArtifactKind,
) -> Result<StageArtifact> {
    let relative = relative.as_ref();
    let source = workspace.join(relative);
    let target = dest_dir.join(relative);
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let size = std::fs::copy(&source, &target)?;
    debug!(source = %source.display(), target = %target.display(), size, "Archived artifact");
    Ok(StageArtifact::new(kind, relative.to_string_lossy(), target).with_size(size))
}

/// Copies every file matching `pattern` into `dest_dir`.
///
/// An empty match is not an error; callers that require a file check the
/// returned list.
///
/// # Errors
///
/// Fails on a bad glob or a copy error.
pub fn archive_matching(
    workspace: &Path,
    pattern: &str,
    dest_dir: &Path,
    kind: ArtifactKind,
) -> Result<Vec<StageArtifact>> {
    let files = glob_files(workspace, pattern)?;
    let mut artifacts = Vec::with_capacity(files.len());
    for file in &files {
        let relative = file.strip_prefix(workspace).unwrap_or(file);
        artifacts.push(archive_file(workspace, relative, dest_dir, kind)?);
    }
    if !artifacts.is_empty() {
        info!(%pattern, count = artifacts.len(), dest = %dest_dir.display(), "Archived artifacts");
    }
    Ok(artifacts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_archive_matching_preserves_relative_paths() {
        let ws = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        touch(ws.path(), "test-images/a.png", "png-a");
        touch(ws.path(), "test-images/nested/b.png", "png-bb");
        touch(ws.path(), "test-images/notes.txt", "skip");

        let artifacts =
            archive_matching(ws.path(), "test-images/**/*.png", dest.path(), ArtifactKind::Image)
                .unwrap();

        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].name, "test-images/a.png");
        assert_eq!(artifacts[1].size_bytes, 6);
        assert!(dest.path().join("test-images/nested/b.png").is_file());
        assert!(!dest.path().join("test-images/notes.txt").exists());
    }

    #[test]
    fn test_empty_match_is_ok() {
        let ws = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let artifacts =
            archive_matching(ws.path(), "*.png", dest.path(), ArtifactKind::Image).unwrap();
        assert!(artifacts.is_empty());
    }

    #[test]
    fn test_invalid_glob() {
        let ws = TempDir::new().unwrap();
        let err = glob_files(ws.path(), "[unclosed").unwrap_err();
        assert_eq!(err.kind(), "report");
    }

    #[test]
    fn test_archive_missing_file_fails() {
        let ws = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let err = archive_file(ws.path(), "pep8.log", dest.path(), ArtifactKind::Log).unwrap_err();
        assert_eq!(err.kind(), "io");
    }
}
