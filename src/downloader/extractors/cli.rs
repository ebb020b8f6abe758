// CLI InfoExtractor - uses the native `yt-dlp` binary
//
// Runs `yt-dlp --dump-json` once per request and turns the JSON into a
// CatalogSnapshot (formats + manual and automatic caption tracks).

use async_trait::async_trait;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::diagnostics::classify_stderr;
use super::traits::{CatalogSnapshot, ExtendedFormat, ExtractorConfig, InfoExtractor};
use crate::downloader::errors::PipelineError;
use crate::downloader::models::CaptionTrack;
use crate::downloader::utils::{get_proxy_args, get_timeout_args, run_output_with_timeout};

/// CLI-based info extractor using yt-dlp binary
pub struct CliInfoExtractor {
    ytdlp_path: PathBuf,
}

impl CliInfoExtractor {
    pub fn new(ytdlp_path: PathBuf) -> Self {
        Self { ytdlp_path }
    }

    /// Build command arguments
    fn build_args(&self, url: &str, config: &ExtractorConfig) -> Vec<String> {
        let mut args = vec![
            "--dump-json".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--skip-download".to_string(),
        ];
        args.extend(get_timeout_args(&config.network));
        args.extend(get_proxy_args(&config.network));
        args.push(url.to_string());
        args
    }

    /// Parse `--dump-json` output
    pub fn parse_json(stdout: &[u8]) -> Result<CatalogSnapshot, PipelineError> {
        let json_str = String::from_utf8_lossy(stdout);
        let json: serde_json::Value = serde_json::from_str(json_str.trim())?;

        let formats = Self::parse_formats(&json)?;

        let mut captions = Self::parse_caption_languages(&json["subtitles"])
            .into_iter()
            .map(CaptionTrack::manual)
            .collect::<Vec<_>>();
        captions.extend(
            Self::parse_caption_languages(&json["automatic_captions"])
                .into_iter()
                .map(CaptionTrack::automatic),
        );

        Ok(CatalogSnapshot {
            id: json["id"].as_str().unwrap_or("unknown").to_string(),
            title: json["title"].as_str().unwrap_or("Unknown").to_string(),
            formats,
            captions,
        })
    }

    fn parse_formats(json: &serde_json::Value) -> Result<Vec<ExtendedFormat>, PipelineError> {
        let formats_array = json["formats"]
            .as_array()
            .ok_or_else(|| PipelineError::ParseError("No formats array in JSON".to_string()))?;

        let formats = formats_array
            .iter()
            .map(|f| ExtendedFormat {
                format_id: f["format_id"].as_str().unwrap_or("").to_string(),
                ext: f["ext"].as_str().unwrap_or("").to_string(),
                height: f["height"].as_u64().map(|h| h as u32),
                vcodec: f["vcodec"].as_str().map(|s| s.to_string()),
                acodec: f["acodec"].as_str().map(|s| s.to_string()),
                filesize: f["filesize"].as_u64(),
                filesize_approx: f["filesize_approx"].as_u64(),
            })
            .filter(|f| !f.format_id.is_empty())
            .collect();

        Ok(formats)
    }

    /// Language tags of a `{lang: [entries]}` map, skipping empty entries and
    /// yt-dlp's `live_chat` pseudo-track
    fn parse_caption_languages(value: &serde_json::Value) -> Vec<String> {
        let Some(map) = value.as_object() else {
            return Vec::new();
        };
        map.iter()
            .filter(|(lang, entries)| {
                lang.as_str() != "live_chat"
                    && entries.as_array().map_or(false, |a| !a.is_empty())
            })
            .map(|(lang, _)| lang.clone())
            .collect()
    }
}

#[async_trait]
impl InfoExtractor for CliInfoExtractor {
    fn name(&self) -> &'static str {
        "cli-yt-dlp"
    }

    async fn extract(
        &self,
        url: &str,
        config: &ExtractorConfig,
        cancel: &CancellationToken,
    ) -> Result<CatalogSnapshot, PipelineError> {
        let args = self.build_args(url, config);
        debug!(tool = %self.ytdlp_path.display(), args = %args.join(" "), "querying catalog");

        let output = run_output_with_timeout(&self.ytdlp_path, &args, config.timeout_seconds, cancel)
            .await
            .map_err(|e| e.into_pipeline_error(&self.ytdlp_path, PipelineError::NetworkFailure))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(url, status = ?output.status.code(), "catalog query failed");
            return Err(classify_stderr(&stderr));
        }

        Self::parse_json(&output.stdout)
    }
}
