// StreamAcquirer - fetches one elementary stream into the scratch directory
//
// A fetch only counts as done when a complete, non-empty file with the
// expected stem exists. On any failure the partial files of that stem are
// removed before the error is returned.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::errors::{PipelineError, Result};
use super::models::{DownloadTask, StreamKind, TaskStatus};
use super::progress::ProgressEmitter;
use super::traits::MediaBackend;

/// Extensions that mark an unfinished download
const PARTIAL_SUFFIXES: [&str; 3] = [".part", ".ytdl", ".temp"];

pub struct StreamAcquirer<'a> {
    backend: &'a dyn MediaBackend,
    retries: u32,
}

impl<'a> StreamAcquirer<'a> {
    pub fn new(backend: &'a dyn MediaBackend, retries: u32) -> Self {
        Self { backend, retries }
    }

    /// Fetch `kind` of `url` with `selector` into `scratch`.
    ///
    /// Returns the path of the finished intermediate file.
    pub async fn acquire(
        &self,
        url: &str,
        kind: StreamKind,
        selector: &str,
        scratch: &Path,
        progress: &ProgressEmitter,
    ) -> Result<PathBuf> {
        let template = scratch.join(format!("{}.%(ext)s", kind.stem()));
        let mut task = DownloadTask::new(url, kind, template, selector);

        if progress.is_cancelled() {
            task.transition(TaskStatus::Failed)?;
            return Err(PipelineError::Cancelled);
        }
        task.transition(TaskStatus::InProgress)?;

        let mut attempt = 0;
        let result = loop {
            match self.fetch_once(&task, scratch, progress).await {
                Err(e) if e.is_retryable() && attempt < self.retries && !progress.is_cancelled() => {
                    attempt += 1;
                    warn!(%kind, attempt, error = %e, "stream fetch failed, retrying");
                    remove_stem(scratch, kind.stem());
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_secs(u64::from(attempt))) => {}
                        _ = progress.cancel_token().cancelled() => break Err(PipelineError::Cancelled),
                    }
                }
                other => break other,
            }
        };

        match result {
            Ok(path) => {
                task.transition(TaskStatus::Done)?;
                info!(%kind, path = %path.display(), "stream acquired");
                Ok(path)
            }
            Err(e) => {
                task.transition(TaskStatus::Failed)?;
                let removed = remove_stem(scratch, kind.stem());
                debug!(%kind, removed, "partial stream files removed");
                Err(e)
            }
        }
    }

    async fn fetch_once(
        &self,
        task: &DownloadTask,
        scratch: &Path,
        progress: &ProgressEmitter,
    ) -> Result<PathBuf> {
        let reported = self.backend.fetch_stream(task, progress).await?;
        if progress.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let path = match reported.filter(|p| p.exists()) {
            Some(p) => p,
            None => find_completed(scratch, task.kind.stem()).ok_or_else(|| {
                PipelineError::NetworkFailure(format!(
                    "{} fetch finished without producing a file",
                    task.kind
                ))
            })?,
        };
        verify_complete(&path)?;
        Ok(path)
    }
}

fn is_partial(path: &Path) -> bool {
    let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    PARTIAL_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

fn has_stem(path: &Path, stem: &str) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map_or(false, |n| n.starts_with(&format!("{}.", stem)))
}

fn stem_files(scratch: &Path, stem: &str) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(scratch) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && has_stem(p, stem))
        .collect();
    files.sort();
    files
}

/// First finished `<stem>.*` file in `scratch`
fn find_completed(scratch: &Path, stem: &str) -> Option<PathBuf> {
    stem_files(scratch, stem).into_iter().find(|p| !is_partial(p))
}

fn verify_complete(path: &Path) -> Result<()> {
    if is_partial(path) {
        return Err(PipelineError::NetworkFailure(format!(
            "download left an unfinished file: {}",
            path.display()
        )));
    }
    let size = std::fs::metadata(path)
        .map_err(|e| PipelineError::NetworkFailure(format!("{}: {}", path.display(), e)))?
        .len();
    if size == 0 {
        return Err(PipelineError::NetworkFailure(format!(
            "downloaded file is empty: {}",
            path.display()
        )));
    }
    Ok(())
}

/// Remove every `<stem>.*` file, returning how many were deleted
fn remove_stem(scratch: &Path, stem: &str) -> usize {
    stem_files(scratch, stem)
        .into_iter()
        .filter(|p| match std::fs::remove_file(p) {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %p.display(), error = %e, "failed to remove partial file");
                false
            }
        })
        .count()
}
