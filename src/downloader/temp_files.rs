// Scratch directory for one pipeline run.
//
// Each invocation gets its own directory, so concurrent runs never share
// intermediate file names. Files are removed by pattern after they are
// consumed and the directory itself goes away when the manager is dropped.

use regex::Regex;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

use super::errors::{PipelineError, Result};

/// Outcome of a best-effort cleanup. Failures are reported, never raised.
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    pub failures: Vec<PipelineError>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct TempFileManager {
    dir: TempDir,
}

impl TempFileManager {
    /// Create a unique scratch directory under `root` (system temp when `None`).
    pub fn new(root: Option<&Path>, label: &str) -> Result<Self> {
        let prefix = format!("ytp-{}-", label);
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        debug!(path = %dir.path().display(), "scratch directory created");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of a file inside the scratch directory
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Files in the scratch directory whose names match any of `patterns`
    pub fn matching(&self, patterns: &[String]) -> Vec<PathBuf> {
        let regexes: Vec<Regex> = patterns.iter().filter_map(|p| glob_to_regex(p)).collect();
        let Ok(entries) = std::fs::read_dir(self.dir.path()) else {
            return Vec::new();
        };
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter(|entry| {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                regexes.iter().any(|re| re.is_match(&name))
            })
            .map(|entry| entry.path())
            .collect();
        paths.sort();
        paths
    }

    /// Best-effort deletion of files matching `patterns`
    pub fn cleanup(&self, patterns: &[String]) -> CleanupReport {
        let mut report = CleanupReport::default();
        for path in self.matching(patterns) {
            match std::fs::remove_file(&path) {
                Ok(()) => report.removed.push(path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to remove intermediate file");
                    report
                        .failures
                        .push(PipelineError::cleanup_failure(&path, e.to_string()));
                }
            }
        }
        debug!(
            removed = report.removed.len(),
            failed = report.failures.len(),
            "scratch cleanup finished"
        );
        report
    }

    /// Remove the directory now, logging instead of failing
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            warn!(path = %path.display(), error = %e, "failed to remove scratch directory");
        }
    }
}

/// Translate a file-name glob (`*`, `?`) into an anchored regex
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}
