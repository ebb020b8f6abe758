// CaptionExtractor - picks one caption track and downloads it

use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::errors::Result;
use super::models::{CaptionOrigin, CaptionTrack};
use super::traits::MediaBackend;

/// Choose the caption track to use.
///
/// Preferred languages are tried in order against manual tracks first, then
/// against automatic ones. A track matches when its tag starts with the
/// preferred tag, so `en` picks up `en-US`.
pub fn select(tracks: &[CaptionTrack], preferred_languages: &[String]) -> Option<CaptionTrack> {
    [CaptionOrigin::Manual, CaptionOrigin::Automatic]
        .into_iter()
        .find_map(|origin| {
            preferred_languages.iter().find_map(|lang| {
                tracks
                    .iter()
                    .find(|t| t.origin == origin && t.language_tag.starts_with(lang.as_str()))
            })
        })
        .cloned()
}

/// A downloaded caption file together with the track it came from
#[derive(Debug, Clone)]
pub struct CaptionFile {
    pub track: CaptionTrack,
    pub path: PathBuf,
}

pub struct CaptionExtractor<'a> {
    backend: &'a dyn MediaBackend,
}

impl<'a> CaptionExtractor<'a> {
    pub fn new(backend: &'a dyn MediaBackend) -> Self {
        Self { backend }
    }

    /// Download `track` into `scratch`. `Ok(None)` when the source wrote nothing.
    pub async fn download(
        &self,
        url: &str,
        track: &CaptionTrack,
        scratch: &Path,
        cancel: &CancellationToken,
    ) -> Result<Option<CaptionFile>> {
        let path = self.backend.fetch_caption(url, track, scratch, cancel).await?;
        match path {
            Some(path) => {
                info!(lang = %track.language_tag, origin = %track.origin, path = %path.display(), "caption downloaded");
                Ok(Some(CaptionFile {
                    track: track.clone(),
                    path,
                }))
            }
            None => {
                debug!(lang = %track.language_tag, "caption download produced no file");
                Ok(None)
            }
        }
    }

    /// Query the catalog, select a track and download it.
    ///
    /// `on_selected` runs between selection and download; an error from it
    /// aborts the download. No matching track is `Ok(None)`.
    pub async fn extract(
        &self,
        url: &str,
        preferred_languages: &[String],
        scratch: &Path,
        cancel: &CancellationToken,
        on_selected: impl FnOnce(&CaptionTrack) -> Result<()>,
    ) -> Result<Option<CaptionFile>> {
        let snapshot = self.backend.catalog(url, cancel).await?;
        match select(&snapshot.captions, preferred_languages) {
            Some(track) => {
                on_selected(&track)?;
                self.download(url, &track, scratch, cancel).await
            }
            None => {
                info!(url, preferred = ?preferred_languages, "no caption track available");
                Ok(None)
            }
        }
    }
}
