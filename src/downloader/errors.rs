// Error types for the download and transcript pipelines

use std::path::PathBuf;

/// Result alias used across the pipeline.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// No encoding matches the container filter / resolution floor,
    /// or the requested format id is not offered by the source
    #[error("format unavailable: {0}")]
    FormatUnavailable(String),

    /// Transient network problem (timeout, connection reset, throttling).
    /// The caller may retry.
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// ffmpeg exited non-zero or produced no output
    #[error("mux failed: {message}")]
    MuxFailure { message: String, diagnostics: String },

    /// No caption track matched the preferred languages
    #[error("no caption track available for languages {0:?}")]
    CaptionUnavailable(Vec<String>),

    /// Intermediate file could not be removed (logged, never escalated)
    #[error("cleanup failed for {}: {message}", path.display())]
    CleanupFailure { path: PathBuf, message: String },

    /// The punctuation/casing restoration service rejected the request
    #[error("text restoration failed: {0}")]
    RestorationFailure(String),

    /// yt-dlp / ffmpeg not installed
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Failed to parse tool output
    #[error("parse error: {0}")]
    ParseError(String),

    /// The request was cancelled or abandoned by the caller
    #[error("request cancelled")]
    Cancelled,

    /// Tool ran but failed for a reason we could not classify
    #[error("execution error: {0}")]
    ExecutionError(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn mux_failure(message: impl Into<String>, diagnostics: impl Into<String>) -> Self {
        Self::MuxFailure {
            message: message.into(),
            diagnostics: diagnostics.into(),
        }
    }

    pub fn cleanup_failure(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::CleanupFailure {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether the caller can reasonably retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkFailure(_))
    }

    /// Short machine-friendly kind, used in logs and CLI exit reporting.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FormatUnavailable(_) => "format_unavailable",
            Self::NetworkFailure(_) => "network_failure",
            Self::MuxFailure { .. } => "mux_failure",
            Self::CaptionUnavailable(_) => "caption_unavailable",
            Self::CleanupFailure { .. } => "cleanup_failure",
            Self::RestorationFailure(_) => "restoration_failure",
            Self::ToolNotFound(_) => "tool_not_found",
            Self::InvalidUrl(_) => "invalid_url",
            Self::ParseError(_) => "parse_error",
            Self::Cancelled => "cancelled",
            Self::ExecutionError(_) => "execution_error",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        Self::ParseError(format!("Invalid JSON: {}", e))
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() || e.is_request() {
            Self::NetworkFailure(e.to_string())
        } else if e.is_decode() {
            Self::ParseError(e.to_string())
        } else {
            Self::RestorationFailure(e.to_string())
        }
    }
}
