// Settings for the pipeline, loaded from an optional TOML file.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::downloader::models::{MuxMode, NetworkConfig};
use crate::downloader::{PipelineError, Result};

/// Environment variable pointing at a settings file
pub const CONFIG_ENV: &str = "YTP_CONFIG";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub tools: ToolSettings,
    pub network: NetworkSettings,
    pub catalog: CatalogSettings,
    pub mux: MuxSettings,
    pub captions: CaptionSettings,
    pub restoration: RestorationSettings,
    pub output: OutputSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    /// Explicit yt-dlp path; discovered when unset
    pub ytdlp: Option<PathBuf>,
    /// Explicit ffmpeg path; discovered when unset
    pub ffmpeg: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub proxy: Option<String>,
    /// yt-dlp `--socket-timeout`
    pub socket_timeout_secs: u32,
    /// Upper bound for a catalog query
    pub catalog_timeout_secs: u64,
    /// Upper bound for a single stream or caption fetch
    pub fetch_timeout_secs: u64,
    /// Extra attempts on NetworkFailure. 0 = never retry.
    pub retries: u32,
    /// Reject URLs that are not YouTube links
    pub youtube_only: bool,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            proxy: None,
            socket_timeout_secs: 30,
            catalog_timeout_secs: 60,
            fetch_timeout_secs: 3600,
            retries: 0,
            youtube_only: true,
        }
    }
}

impl NetworkSettings {
    pub fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            proxy: self.proxy.clone(),
            timeout: Some(self.socket_timeout_secs),
        }
    }
}

/// What to do with encodings whose size the source does not report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownSizePolicy {
    /// Never list them
    Drop,
    /// Keep one only when its bucket has no sized entry
    #[default]
    RetainIfBucketEmpty,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    /// Container extension the muxer accepts for the video stream
    pub container: String,
    /// Minimum height in pixels
    pub min_height: u32,
    /// Standard resolutions heights are snapped to
    pub ladder: Vec<u32>,
    pub unknown_size: UnknownSizePolicy,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            container: "mp4".to_string(),
            min_height: 144,
            ladder: vec![144, 240, 360, 480, 720, 1080, 1440, 2160, 4320],
            unknown_size: UnknownSizePolicy::default(),
        }
    }
}

impl CatalogSettings {
    pub fn with_min_height(mut self, min_height: u32) -> Self {
        self.min_height = min_height;
        self
    }

    pub fn with_unknown_size(mut self, policy: UnknownSizePolicy) -> Self {
        self.unknown_size = policy;
        self
    }

    pub fn with_ladder(mut self, ladder: Vec<u32>) -> Self {
        self.ladder = ladder;
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MuxSettings {
    pub mode: MuxMode,
    /// Use NVENC for transcode mode
    pub use_gpu: bool,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub preset: String,
    /// yt-dlp selector for the audio stream
    pub audio_selector: String,
    pub timeout_secs: u64,
    /// Intermediate patterns removed from the scratch dir after a mux
    pub intermediate_patterns: Vec<String>,
}

impl Default for MuxSettings {
    fn default() -> Self {
        Self {
            mode: MuxMode::Copy,
            use_gpu: false,
            audio_codec: "aac".to_string(),
            audio_bitrate: "192k".to_string(),
            preset: "fast".to_string(),
            audio_selector: "bestaudio[ext=m4a]/bestaudio".to_string(),
            timeout_secs: 1800,
            intermediate_patterns: vec!["video.*".to_string(), "audio.*".to_string()],
        }
    }
}

impl MuxSettings {
    pub fn with_mode(mut self, mode: MuxMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_gpu(mut self, use_gpu: bool) -> Self {
        self.use_gpu = use_gpu;
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptionSettings {
    pub preferred_languages: Vec<String>,
    /// yt-dlp `--sub-format`
    pub format: String,
}

impl Default for CaptionSettings {
    fn default() -> Self {
        Self {
            preferred_languages: vec!["ru".to_string(), "en".to_string()],
            format: "vtt".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RestorationSettings {
    /// HTTP endpoint of the punctuation service; text is passed through when unset
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
}

impl Default for RestorationSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Where finished videos are moved
    pub dir: PathBuf,
    /// Where transcripts are stored per context
    pub transcripts_dir: PathBuf,
    /// Parent for per-request scratch directories (system temp when unset)
    pub scratch_root: Option<PathBuf>,
}

impl Default for OutputSettings {
    fn default() -> Self {
        let dir = dirs::download_dir().unwrap_or_else(|| PathBuf::from("."));
        let transcripts_dir = dir.join("transcripts");
        Self {
            dir,
            transcripts_dir,
            scratch_root: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, falling back to `$YTP_CONFIG`, then defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        match path {
            Some(path) => {
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    PipelineError::Config(format!("cannot read {}: {}", path.display(), e))
                })?;
                Self::from_toml(&content)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| PipelineError::Config(e.to_string()))
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output.dir = dir.into();
        self
    }

    pub fn with_scratch_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output.scratch_root = Some(dir.into());
        self
    }

    pub fn with_ffmpeg(mut self, path: impl Into<PathBuf>) -> Self {
        self.tools.ffmpeg = Some(path.into());
        self
    }
}
