// Failure diagnostics - identifies why a yt-dlp invocation failed
//
// Analyzes stderr to decide which pipeline failure it maps to:
// - transient network trouble (caller may retry)
// - the requested format is not offered
// - the video itself cannot be fetched

use serde::{Deserialize, Serialize};

use crate::downloader::errors::PipelineError;

/// Reasons a remote fetch may fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// Socket/read timeout or connection reset
    NetworkTimeout,

    /// HTTP 429 or similar throttling
    RateLimited,

    /// HTTP 403 Forbidden - general access denied
    Http403Forbidden,

    /// Bot check / sign-in interstitial
    BotDetection,

    /// The selector matched nothing in the catalog
    FormatNotAvailable,

    /// Age-restricted content requiring login
    AgeRestricted,

    /// Geographic restriction
    GeoBlocked,

    /// Private video requiring authorization
    PrivateVideo,

    /// Video deleted or unavailable
    VideoUnavailable,

    /// URL not handled by any extractor
    UnsupportedUrl,
}

impl FailureReason {
    /// Whether the same request could succeed on a later attempt
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NetworkTimeout | Self::RateLimited | Self::Http403Forbidden | Self::BotDetection
        )
    }

    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "Network timeout (possible IP throttling)",
            Self::RateLimited => "Rate limited by the source",
            Self::Http403Forbidden => "Access denied (HTTP 403)",
            Self::BotDetection => "Bot detection triggered",
            Self::FormatNotAvailable => "Requested format is not available",
            Self::AgeRestricted => "Age-restricted content",
            Self::GeoBlocked => "Geographic restriction",
            Self::PrivateVideo => "Private video",
            Self::VideoUnavailable => "Video unavailable",
            Self::UnsupportedUrl => "Unsupported URL",
        }
    }
}

/// Match stderr against known yt-dlp failure patterns.
/// Order matters: more specific patterns come first.
pub fn diagnose_error(stderr: &str) -> Option<FailureReason> {
    let lower = stderr.to_lowercase();

    if lower.contains("requested format is not available")
        || lower.contains("no video formats found")
    {
        return Some(FailureReason::FormatNotAvailable);
    }
    if lower.contains("unsupported url") {
        return Some(FailureReason::UnsupportedUrl);
    }
    if lower.contains("private video") {
        return Some(FailureReason::PrivateVideo);
    }
    if lower.contains("confirm your age") || lower.contains("age-restricted") {
        return Some(FailureReason::AgeRestricted);
    }
    if lower.contains("not available in your country") || lower.contains("geo restrict") {
        return Some(FailureReason::GeoBlocked);
    }
    if lower.contains("video unavailable") || lower.contains("has been removed") {
        return Some(FailureReason::VideoUnavailable);
    }
    if lower.contains("http error 429") || lower.contains("too many requests") {
        return Some(FailureReason::RateLimited);
    }
    if lower.contains("sign in to confirm") || lower.contains("not a bot") {
        return Some(FailureReason::BotDetection);
    }
    if lower.contains("http error 403") || lower.contains("forbidden") {
        return Some(FailureReason::Http403Forbidden);
    }
    if lower.contains("timed out")
        || lower.contains("timeout")
        || lower.contains("connection reset")
        || lower.contains("temporary failure in name resolution")
        || lower.contains("network is unreachable")
        || lower.contains("unable to download")
    {
        return Some(FailureReason::NetworkTimeout);
    }

    None
}

/// Turn yt-dlp stderr into a typed pipeline error
pub fn classify_stderr(stderr: &str) -> PipelineError {
    let message = stderr
        .lines()
        .map(str::trim)
        .find(|l| l.starts_with("ERROR:"))
        .or_else(|| stderr.lines().rev().map(str::trim).find(|l| !l.is_empty()))
        .unwrap_or("Unknown error")
        .to_string();

    match diagnose_error(stderr) {
        Some(FailureReason::FormatNotAvailable) => PipelineError::FormatUnavailable(message),
        Some(FailureReason::UnsupportedUrl) => PipelineError::InvalidUrl(message),
        Some(reason) if reason.is_transient() => {
            PipelineError::NetworkFailure(format!("{}: {}", reason.description(), message))
        }
        Some(reason) => PipelineError::ExecutionError(format!("{}: {}", reason.description(), message)),
        None => PipelineError::ExecutionError(message),
    }
}
