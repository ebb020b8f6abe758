// yt-dlp backend: catalog queries, elementary stream fetches, caption downloads

use async_trait::async_trait;
use regex::Regex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command as TokioCommand;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::errors::{PipelineError, Result};
use super::extractors::{classify_stderr, CatalogSnapshot, CliInfoExtractor, ExtractorConfig, InfoExtractor};
use super::models::{CaptionOrigin, CaptionTrack, DownloadTask, NetworkConfig, ProgressSample};
use super::progress::ProgressEmitter;
use super::traits::MediaBackend;
use super::utils::{get_proxy_args, get_timeout_args, run_output_with_timeout};

/// Machine-readable progress line requested via `--progress-template`
const PROGRESS_TEMPLATE: &str = "download:[progress] %(progress.downloaded_bytes)s %(progress.total_bytes)s %(progress.total_bytes_estimate)s";
/// Final path printed once the file has been moved into place
const OUTPUT_TEMPLATE: &str = "after_move:[output] %(filepath)s";
/// Non-progress stderr lines kept for failure classification
const STDERR_TAIL_LINES: usize = 200;

lazy_static::lazy_static! {
    static ref TEMPLATE_RE: Regex =
        Regex::new(r"^\[progress\]\s+(\S+)\s+(\S+)\s+(\S+)").unwrap();
    // Default progress line, e.g.
    // [download]  12.5% of ~ 310.04MiB at  374.36KiB/s ETA 11:59 (frag 56/454)
    static ref PERCENT_RE: Regex = Regex::new(
        r"\[download\]\s+(\d+\.?\d*)%\s+of\s+~?\s*(\d+\.?\d*)\s*([KMGT]?i?B)"
    ).unwrap();
    static ref OUTPUT_RE: Regex = Regex::new(r"^\[output\]\s+(.+)$").unwrap();
}

/// Parse a yt-dlp progress line into byte counters.
///
/// Understands our `--progress-template` output first and falls back to the
/// default human-readable `[download] x% of y` line.
pub fn parse_ytdlp_progress(line: &str) -> Option<ProgressSample> {
    let line = line.trim();

    if let Some(caps) = TEMPLATE_RE.captures(line) {
        let downloaded = parse_number(caps.get(1)?.as_str())?;
        let total = parse_number(caps.get(2)?.as_str())
            .or_else(|| caps.get(3).and_then(|m| parse_number(m.as_str())));
        return Some(ProgressSample {
            bytes_downloaded: downloaded,
            bytes_total: total,
        });
    }

    if let Some(caps) = PERCENT_RE.captures(line) {
        let percent: f64 = caps.get(1)?.as_str().parse().ok()?;
        let size: f64 = caps.get(2)?.as_str().parse().ok()?;
        let total = (size * unit_multiplier(caps.get(3)?.as_str())) as u64;
        let downloaded = (total as f64 * percent.min(100.0) / 100.0) as u64;
        return Some(ProgressSample {
            bytes_downloaded: downloaded,
            bytes_total: Some(total),
        });
    }

    None
}

fn parse_number(raw: &str) -> Option<u64> {
    match raw {
        "NA" | "None" | "" => None,
        other => other.parse::<f64>().ok().filter(|v| *v >= 0.0).map(|v| v as u64),
    }
}

fn unit_multiplier(unit: &str) -> f64 {
    match unit {
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        "TiB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        "KB" => 1e3,
        "MB" => 1e6,
        "GB" => 1e9,
        "TB" => 1e12,
        _ => 1.0,
    }
}

pub struct YtDlpBackend {
    ytdlp_path: PathBuf,
    network: NetworkConfig,
    catalog_timeout_secs: u64,
    fetch_timeout_secs: u64,
    caption_format: String,
    extractor: CliInfoExtractor,
}

impl YtDlpBackend {
    pub fn new(
        ytdlp_path: PathBuf,
        network: NetworkConfig,
        catalog_timeout_secs: u64,
        fetch_timeout_secs: u64,
        caption_format: impl Into<String>,
    ) -> Self {
        Self {
            extractor: CliInfoExtractor::new(ytdlp_path.clone()),
            ytdlp_path,
            network,
            catalog_timeout_secs,
            fetch_timeout_secs,
            caption_format: caption_format.into(),
        }
    }

    fn common_args(&self) -> Vec<String> {
        let mut args = vec![
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--no-update".to_string(),
        ];
        args.extend(get_timeout_args(&self.network));
        args.extend(get_proxy_args(&self.network));
        args
    }

    fn stream_args(&self, task: &DownloadTask) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            task.selector.clone(),
            "-o".to_string(),
            task.destination.to_string_lossy().to_string(),
            "--newline".to_string(),
            "--progress".to_string(),
            "--no-simulate".to_string(),
            "--no-mtime".to_string(),
            "--progress-template".to_string(),
            PROGRESS_TEMPLATE.to_string(),
            "--print".to_string(),
            OUTPUT_TEMPLATE.to_string(),
        ];
        args.extend(self.common_args());
        args.push(task.url.clone());
        args
    }

    fn caption_args(&self, url: &str, track: &CaptionTrack, dest_dir: &Path) -> Vec<String> {
        let write_flag = match track.origin {
            CaptionOrigin::Manual => "--write-subs",
            CaptionOrigin::Automatic => "--write-auto-subs",
        };
        let mut args = vec![
            "--skip-download".to_string(),
            write_flag.to_string(),
            "--sub-langs".to_string(),
            track.language_tag.clone(),
            "--sub-format".to_string(),
            format!("{}/best", self.caption_format),
            "-o".to_string(),
            dest_dir.join("subtitles.%(ext)s").to_string_lossy().to_string(),
        ];
        args.extend(self.common_args());
        args.push(url.to_string());
        args
    }
}

#[async_trait]
impl MediaBackend for YtDlpBackend {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn catalog(&self, url: &str, cancel: &CancellationToken) -> Result<CatalogSnapshot> {
        let config = ExtractorConfig {
            network: self.network.clone(),
            timeout_seconds: self.catalog_timeout_secs,
        };
        self.extractor.extract(url, &config, cancel).await
    }

    async fn fetch_stream(
        &self,
        task: &DownloadTask,
        progress: &ProgressEmitter,
    ) -> Result<Option<PathBuf>> {
        let args = self.stream_args(task);
        debug!(kind = %task.kind, selector = %task.selector, "starting yt-dlp stream fetch");

        let mut child = TokioCommand::new(&self.ytdlp_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    PipelineError::ToolNotFound(self.ytdlp_path.display().to_string())
                }
                _ => PipelineError::ExecutionError(format!("Failed to start yt-dlp: {}", e)),
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PipelineError::ExecutionError("Failed to capture stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| PipelineError::ExecutionError("Failed to capture stderr".to_string()))?;

        // --print makes yt-dlp quiet, which moves progress lines to stderr
        let stderr_emitter = progress.clone();
        let stderr_task = tokio::spawn(async move {
            let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(sample) = parse_ytdlp_progress(&line) {
                    stderr_emitter.emit(sample);
                    continue;
                }
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Vec::from(tail).join("\n")
        });

        let cancel = progress.cancel_token().clone();
        let deadline = tokio::time::sleep(Duration::from_secs(self.fetch_timeout_secs));
        tokio::pin!(deadline);

        let mut lines = BufReader::new(stdout).lines();
        let mut reported_path: Option<PathBuf> = None;

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            if let Some(sample) = parse_ytdlp_progress(&line) {
                                progress.emit(sample);
                            } else if let Some(caps) = OUTPUT_RE.captures(line.trim()) {
                                reported_path = Some(PathBuf::from(caps[1].trim()));
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!(error = %e, "failed to read yt-dlp output");
                            break;
                        }
                    }
                }
                _ = cancel.cancelled() => {
                    let _ = child.kill().await;
                    stderr_task.abort();
                    info!(kind = %task.kind, "stream fetch cancelled");
                    return Err(PipelineError::Cancelled);
                }
                _ = &mut deadline => {
                    let _ = child.kill().await;
                    stderr_task.abort();
                    return Err(PipelineError::NetworkFailure(format!(
                        "{} fetch timed out after {}s",
                        task.kind, self.fetch_timeout_secs
                    )));
                }
            }
        }

        let status = tokio::select! {
            status = child.wait() => status?,
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                stderr_task.abort();
                return Err(PipelineError::Cancelled);
            }
            _ = &mut deadline => {
                let _ = child.kill().await;
                stderr_task.abort();
                return Err(PipelineError::NetworkFailure(format!(
                    "{} fetch timed out after {}s",
                    task.kind, self.fetch_timeout_secs
                )));
            }
        };
        let stderr_text = stderr_task.await.unwrap_or_default();

        if !status.success() {
            warn!(kind = %task.kind, status = ?status.code(), "yt-dlp stream fetch failed");
            return Err(classify_stderr(&stderr_text));
        }

        Ok(reported_path)
    }

    async fn fetch_caption(
        &self,
        url: &str,
        track: &CaptionTrack,
        dest_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<Option<PathBuf>> {
        let args = self.caption_args(url, track, dest_dir);
        let output = run_output_with_timeout(&self.ytdlp_path, &args, self.fetch_timeout_secs, cancel)
            .await
            .map_err(|e| e.into_pipeline_error(&self.ytdlp_path, PipelineError::NetworkFailure))?;

        if !output.status.success() {
            return Err(classify_stderr(&String::from_utf8_lossy(&output.stderr)));
        }

        let mut found: Vec<PathBuf> = std::fs::read_dir(dest_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map_or(false, |n| n.starts_with("subtitles.") && !n.ends_with(".part"))
            })
            .collect();
        found.sort();
        Ok(found.into_iter().next())
    }
}
