// Helper functions shared by the yt-dlp and ffmpeg invocations

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::downloader::errors::PipelineError;
use crate::downloader::models::NetworkConfig;

/// How a bounded subprocess run ended without producing an exit status
#[derive(Debug)]
pub enum RunError {
    Spawn(std::io::Error),
    TimedOut(u64),
    Cancelled,
    Io(String),
}

impl RunError {
    /// Map to the pipeline taxonomy; `on_timeout` decides what a timeout means
    /// for this particular tool.
    pub fn into_pipeline_error(
        self,
        program: &Path,
        on_timeout: impl FnOnce(String) -> PipelineError,
    ) -> PipelineError {
        match self {
            RunError::Spawn(e) if e.kind() == std::io::ErrorKind::NotFound => {
                PipelineError::ToolNotFound(program.display().to_string())
            }
            RunError::Spawn(e) => PipelineError::ExecutionError(format!(
                "Failed to start {}: {}",
                program.display(),
                e
            )),
            RunError::TimedOut(secs) => on_timeout(format!(
                "{} timed out after {}s",
                program.display(),
                secs
            )),
            RunError::Cancelled => PipelineError::Cancelled,
            RunError::Io(msg) => PipelineError::ExecutionError(msg),
        }
    }
}

/// Run command with timeout and cancellation (shared utility).
///
/// The child is killed when the timeout elapses, when `cancel` fires, or when
/// the returned future is dropped.
pub async fn run_output_with_timeout(
    program: &Path,
    args: &[String],
    timeout_secs: u64,
    cancel: &CancellationToken,
) -> Result<std::process::Output, RunError> {
    let mut child = TokioCommand::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(RunError::Spawn)?;

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| RunError::Io(format!("Failed to capture stdout from {}", program.display())))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| RunError::Io(format!("Failed to capture stderr from {}", program.display())))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe
            .read_to_end(&mut buf)
            .await
            .map_err(|e| format!("Failed to read stdout: {}", e))?;
        Ok::<Vec<u8>, String>(buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe
            .read_to_end(&mut buf)
            .await
            .map_err(|e| format!("Failed to read stderr: {}", e))?;
        Ok::<Vec<u8>, String>(buf)
    });

    let waited = tokio::select! {
        res = timeout(Duration::from_secs(timeout_secs), child.wait()) => res,
        _ = cancel.cancelled() => {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            return Err(RunError::Cancelled);
        }
    };

    match waited {
        Ok(status_res) => {
            let status = status_res
                .map_err(|e| RunError::Io(format!("Failed to wait for {}: {}", program.display(), e)))?;
            let stdout = stdout_task
                .await
                .map_err(|e| RunError::Io(format!("stdout task failed: {}", e)))?
                .map_err(RunError::Io)?;
            let stderr = stderr_task
                .await
                .map_err(|e| RunError::Io(format!("stderr task failed: {}", e)))?
                .map_err(RunError::Io)?;
            Ok(std::process::Output { status, stdout, stderr })
        }
        Err(_) => {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            Err(RunError::TimedOut(timeout_secs))
        }
    }
}

/// Last `max_lines` non-empty lines of tool stderr, for error messages
pub fn stderr_tail(stderr: &[u8], max_lines: usize) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}

/// Whether the URL looks like a YouTube watch/short link
pub fn is_youtube_link(url: &str) -> bool {
    lazy_static::lazy_static! {
        static ref YOUTUBE_RE: regex::Regex =
            regex::Regex::new(r"^(https?://)?(www\.|m\.|music\.)?(youtube\.com|youtu\.be)/").unwrap();
    }
    YOUTUBE_RE.is_match(url.trim())
}

/// Reject obviously unusable URLs before spawning anything
pub fn validate_url(url: &str, youtube_only: bool) -> Result<(), PipelineError> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::InvalidUrl("empty URL".to_string()));
    }
    if youtube_only {
        if !is_youtube_link(trimmed) {
            return Err(PipelineError::InvalidUrl(trimmed.to_string()));
        }
    } else if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(PipelineError::InvalidUrl(trimmed.to_string()));
    }
    Ok(())
}

/// Build proxy arguments for yt-dlp
pub fn get_proxy_args(config: &NetworkConfig) -> Vec<String> {
    let mut args = Vec::new();

    if let Some(proxy) = &config.proxy {
        args.push("--proxy".to_string());
        args.push(proxy.clone());
    }

    args
}

/// Build timeout arguments for yt-dlp
pub fn get_timeout_args(config: &NetworkConfig) -> Vec<String> {
    let mut args = Vec::new();

    if let Some(timeout) = config.timeout {
        args.push("--socket-timeout".to_string());
        args.push(timeout.to_string());
    }

    args
}
