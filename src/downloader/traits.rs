// Backend traits: the seams between the pipeline and external services

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use super::errors::Result;
use super::extractors::CatalogSnapshot;
use super::models::{CaptionTrack, DownloadTask};
use super::progress::ProgressEmitter;

/// Remote media source (yt-dlp in production, fakes in tests)
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Name of the backend (for logging)
    fn name(&self) -> &'static str;

    /// Query the catalog of encodings and caption tracks
    async fn catalog(&self, url: &str, cancel: &CancellationToken) -> Result<CatalogSnapshot>;

    /// Fetch one elementary stream to `task.destination`.
    ///
    /// Returns the final path when the tool reported it; the caller verifies
    /// the file either way. Cancellation is signalled through `progress`.
    async fn fetch_stream(
        &self,
        task: &DownloadTask,
        progress: &ProgressEmitter,
    ) -> Result<Option<PathBuf>>;

    /// Download exactly one caption track into `dest_dir`.
    /// `Ok(None)` when the source produced no file.
    async fn fetch_caption(
        &self,
        url: &str,
        track: &CaptionTrack,
        dest_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<Option<PathBuf>>;
}

/// Punctuation/casing restoration service. Output is not deterministic.
#[async_trait]
pub trait TextRestorer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn restore(&self, text: &str) -> Result<String>;
}
