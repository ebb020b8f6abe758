// Muxer - combines the video and audio intermediates with ffmpeg

use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::errors::{PipelineError, Result};
use super::models::MuxMode;
use super::temp_files::TempFileManager;
use super::utils::{run_output_with_timeout, stderr_tail};
use crate::config::MuxSettings;

/// Lines of ffmpeg stderr kept in a MuxFailure
const DIAGNOSTIC_LINES: usize = 20;

pub struct Muxer {
    ffmpeg_path: PathBuf,
    settings: MuxSettings,
}

impl Muxer {
    pub fn new(ffmpeg_path: PathBuf, settings: MuxSettings) -> Self {
        Self {
            ffmpeg_path,
            settings,
        }
    }

    fn video_codec(&self, mode: MuxMode) -> &'static str {
        match mode {
            MuxMode::Copy => "copy",
            MuxMode::Transcode if self.settings.use_gpu => "h264_nvenc",
            MuxMode::Transcode => "libx264",
        }
    }

    pub fn build_args(&self, video: &Path, audio: &Path, output: &Path, mode: MuxMode) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-y".into(),
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-i".into(),
            video.to_string_lossy().to_string(),
            "-i".into(),
            audio.to_string_lossy().to_string(),
            "-map".into(),
            "0:v:0".into(),
            "-map".into(),
            "1:a:0".into(),
            "-c:v".into(),
            self.video_codec(mode).into(),
        ];
        if mode == MuxMode::Transcode {
            args.push("-preset".into());
            args.push(self.settings.preset.clone());
        }
        args.extend([
            "-c:a".to_string(),
            self.settings.audio_codec.clone(),
            "-b:a".to_string(),
            self.settings.audio_bitrate.clone(),
            "-movflags".to_string(),
            "+faststart".to_string(),
            output.to_string_lossy().to_string(),
        ]);
        args
    }

    /// Mux `video` and `audio` into `output`.
    ///
    /// On success the intermediates matching the configured patterns are
    /// removed from `scratch`. On failure `output` is removed as well.
    pub async fn combine(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        mode: MuxMode,
        scratch: &TempFileManager,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let args = self.build_args(video, audio, output, mode);
        debug!(?mode, codec = self.video_codec(mode), output = %output.display(), "running ffmpeg");

        let result = self.run(&args, output, cancel).await;
        if let Err(e) = &result {
            warn!(error = %e, "mux failed");
            if output.exists() {
                if let Err(e) = std::fs::remove_file(output) {
                    warn!(path = %output.display(), error = %e, "failed to remove partial output");
                }
            }
            return result;
        }

        let report = scratch.cleanup(&self.settings.intermediate_patterns);
        info!(
            output = %output.display(),
            removed = report.removed.len(),
            cleanup_failures = report.failures.len(),
            "mux complete"
        );
        Ok(())
    }

    async fn run(&self, args: &[String], output: &Path, cancel: &CancellationToken) -> Result<()> {
        let out = run_output_with_timeout(&self.ffmpeg_path, args, self.settings.timeout_secs, cancel)
            .await
            .map_err(|e| e.into_pipeline_error(&self.ffmpeg_path, |msg| PipelineError::mux_failure(msg, "")))?;

        if !out.status.success() {
            let status = out
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            return Err(PipelineError::mux_failure(
                format!("ffmpeg exited with status {}", status),
                stderr_tail(&out.stderr, DIAGNOSTIC_LINES),
            ));
        }

        let size = std::fs::metadata(output).map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            return Err(PipelineError::mux_failure(
                format!("ffmpeg produced no output at {}", output.display()),
                stderr_tail(&out.stderr, DIAGNOSTIC_LINES),
            ));
        }
        Ok(())
    }
}

/// Move a finished file into `dest_dir`, falling back to copy + remove across
/// filesystems. An existing file with the same name is replaced.
pub fn publish(src: &Path, dest_dir: &Path, file_name: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dest_dir)?;
    let dest = dest_dir.join(file_name);
    if std::fs::rename(src, &dest).is_err() {
        // Copy to a hidden sibling first so `dest` never holds a partial file
        let staging = dest_dir.join(format!(".{}.partial", file_name));
        if let Err(e) = std::fs::copy(src, &staging) {
            let _ = std::fs::remove_file(&staging);
            return Err(e.into());
        }
        std::fs::rename(&staging, &dest)?;
        let _ = std::fs::remove_file(src);
    }
    Ok(dest)
}
