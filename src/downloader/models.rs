// Common data models for the pipeline

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::errors::{PipelineError, Result};

/// Identifier of one caller invocation (download or transcript request)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(uuid::Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to correlate log lines
        write!(f, "{}", &self.0.simple().to_string()[..8])
    }
}

/// One encoded variant offered by the remote source, as exposed to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Encoding {
    /// Format ID (e.g., "137", "398")
    pub id: String,
    /// Video height in pixels
    pub height: u32,
    /// Exact or approximate size in bytes, when the source knows it
    pub approx_size_bytes: Option<u64>,
    /// Container extension (mp4, webm)
    pub ext: String,
}

impl Encoding {
    /// Label like "720p (48.3 MB)" for menus
    pub fn display_label(&self) -> String {
        match self.approx_size_bytes {
            Some(bytes) => format!("{}p ({:.1} MB)", self.height, bytes as f64 / 1_048_576.0),
            None => format!("{}p", self.height),
        }
    }
}

/// Normalized resolution key used for deduplication
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResolutionBucket(pub u32);

impl ResolutionBucket {
    /// Snap `height` to a ladder rung when it is within 10% of it,
    /// otherwise keep the exact height.
    pub fn from_height(height: u32, ladder: &[u32]) -> Self {
        let height64 = u64::from(height);
        let snapped = ladder.iter().copied().find(|&rung| {
            let rung = u64::from(rung);
            height64 >= rung * 9 / 10 && height64 <= rung * 11 / 10
        });
        Self(snapped.unwrap_or(height))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptionOrigin {
    /// Uploaded by the author
    Manual,
    /// Machine-generated
    Automatic,
}

impl fmt::Display for CaptionOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Automatic => write!(f, "automatic"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionTrack {
    pub language_tag: String,
    pub origin: CaptionOrigin,
}

impl CaptionTrack {
    pub fn manual(language_tag: impl Into<String>) -> Self {
        Self {
            language_tag: language_tag.into(),
            origin: CaptionOrigin::Manual,
        }
    }

    pub fn automatic(language_tag: impl Into<String>) -> Self {
        Self {
            language_tag: language_tag.into(),
            origin: CaptionOrigin::Automatic,
        }
    }
}

/// Which elementary stream a task fetches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Video,
    Audio,
}

impl StreamKind {
    /// File stem used for the intermediate in the scratch directory
    pub fn stem(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.stem())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    InProgress,
    Done,
    Failed,
}

/// One elementary-stream fetch
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub url: String,
    pub kind: StreamKind,
    /// yt-dlp output template, e.g. `<scratch>/video.%(ext)s`
    pub destination: PathBuf,
    /// yt-dlp format selector
    pub selector: String,
    status: TaskStatus,
}

impl DownloadTask {
    pub fn new(url: &str, kind: StreamKind, destination: PathBuf, selector: &str) -> Self {
        Self {
            url: url.to_string(),
            kind,
            destination,
            selector: selector.to_string(),
            status: TaskStatus::Pending,
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// Advance the lifecycle: Pending → InProgress → Done | Failed.
    /// Pending may also fail directly (e.g. cancelled before start).
    pub fn transition(&mut self, next: TaskStatus) -> Result<()> {
        let allowed = matches!(
            (self.status, next),
            (TaskStatus::Pending, TaskStatus::InProgress)
                | (TaskStatus::Pending, TaskStatus::Failed)
                | (TaskStatus::InProgress, TaskStatus::Done)
                | (TaskStatus::InProgress, TaskStatus::Failed)
        );
        if !allowed {
            return Err(PipelineError::ExecutionError(format!(
                "invalid {} task transition {:?} -> {:?}",
                self.kind, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }
}

/// Byte counters for one in-flight task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSample {
    pub bytes_downloaded: u64,
    pub bytes_total: Option<u64>,
}

impl ProgressSample {
    pub fn percent(&self) -> Option<f32> {
        match self.bytes_total {
            Some(total) if total > 0 => {
                Some((self.bytes_downloaded as f64 / total as f64 * 100.0).min(100.0) as f32)
            }
            _ => None,
        }
    }
}

/// ffmpeg strategy for combining the two streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MuxMode {
    /// Keep the video bitstream as-is, encode audio to AAC
    #[default]
    Copy,
    /// Re-encode video and audio
    Transcode,
}

impl std::str::FromStr for MuxMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "copy" => Ok(Self::Copy),
            "transcode" => Ok(Self::Transcode),
            _ => Err(format!("Unknown mux mode: {}", s)),
        }
    }
}

/// Final muxed file handed to the caller, who owns deletion from then on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaArtifact {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Normalized transcript: cleaned caption lines plus the restored text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    pub language_tag: String,
    pub origin: CaptionOrigin,
    /// Cleaned, deduplicated caption lines before restoration
    pub lines: Vec<String>,
    /// Punctuated/cased text returned by the restoration service
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptOutcome {
    Ready(Transcript),
    /// No usable caption track or caption content
    Empty,
}

impl TranscriptOutcome {
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Ready(t) => Some(&t.text),
            Self::Empty => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// Network configuration for tool invocations
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// SOCKS5/HTTP proxy URL (e.g., "socks5://127.0.0.1:1080")
    pub proxy: Option<String>,

    /// Socket timeout in seconds
    pub timeout: Option<u32>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            timeout: Some(30),
        }
    }
}
