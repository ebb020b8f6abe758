// InfoExtractor trait and common types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::downloader::errors::PipelineError;
use crate::downloader::models::{CaptionTrack, NetworkConfig};

/// Configuration for a catalog query
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub network: NetworkConfig,
    /// Upper bound for the whole query in seconds
    pub timeout_seconds: u64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            timeout_seconds: 60,
        }
    }
}

impl ExtractorConfig {
    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.network.proxy = proxy;
        self
    }
}

/// Extended format information from yt-dlp
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtendedFormat {
    /// Format ID (e.g., "137", "140")
    pub format_id: String,
    /// File extension (mp4, webm, m4a)
    pub ext: String,
    /// Video height in pixels
    pub height: Option<u32>,
    /// Video codec (avc1, vp9, av01, none)
    pub vcodec: Option<String>,
    /// Audio codec (mp4a, opus, none)
    pub acodec: Option<String>,
    /// File size in bytes
    pub filesize: Option<u64>,
    /// Approximate file size (when exact is unknown)
    pub filesize_approx: Option<u64>,
}

impl ExtendedFormat {
    /// Get effective file size (exact or approximate)
    pub fn effective_size(&self) -> Option<u64> {
        self.filesize.or(self.filesize_approx)
    }

    /// Video track present, no audio track
    pub fn is_video_only(&self) -> bool {
        self.vcodec.as_deref().map_or(false, |v| v != "none" && !v.is_empty())
            && self.acodec.as_deref().map_or(true, |a| a == "none")
    }

    /// Audio track present, no video track
    pub fn is_audio_only(&self) -> bool {
        self.acodec.as_deref().map_or(false, |a| a != "none" && !a.is_empty())
            && self.vcodec.as_deref().map_or(true, |v| v == "none")
    }
}

/// Immutable per-request view of what the remote source offers.
/// Never cached: each request queries the source again.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub id: String,
    pub title: String,
    pub formats: Vec<ExtendedFormat>,
    pub captions: Vec<CaptionTrack>,
}

/// Trait for catalog extractors
#[async_trait]
pub trait InfoExtractor: Send + Sync {
    /// Name of the extractor (for logging)
    fn name(&self) -> &'static str;

    /// Query formats and caption tracks for `url`
    async fn extract(
        &self,
        url: &str,
        config: &ExtractorConfig,
        cancel: &CancellationToken,
    ) -> Result<CatalogSnapshot, PipelineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(vcodec: &str, acodec: &str) -> ExtendedFormat {
        ExtendedFormat {
            vcodec: Some(vcodec.to_string()),
            acodec: Some(acodec.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_stream_kind_detection() {
        assert!(format("avc1.4d401f", "none").is_video_only());
        assert!(!format("avc1.4d401f", "mp4a.40.2").is_video_only());
        assert!(format("none", "mp4a.40.2").is_audio_only());
        assert!(!format("none", "none").is_audio_only());
    }

    #[test]
    fn test_effective_size_prefers_exact() {
        let f = ExtendedFormat {
            filesize: Some(10),
            filesize_approx: Some(12),
            ..Default::default()
        };
        assert_eq!(f.effective_size(), Some(10));
        let approx = ExtendedFormat {
            filesize_approx: Some(12),
            ..Default::default()
        };
        assert_eq!(approx.effective_size(), Some(12));
    }
}
