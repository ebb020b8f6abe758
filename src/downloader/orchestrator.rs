// PipelineOrchestrator - sequences the download and transcript flows
//
// Every call gets its own RequestContext (id, scratch directory, cancellation
// token, state log). The context is torn down when the call returns or its
// future is dropped, which removes the scratch directory and the progress
// registration. Nothing is shared between calls except the backend handles.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::acquirer::StreamAcquirer;
use super::backend::YtDlpBackend;
use super::captions::CaptionExtractor;
use super::errors::{PipelineError, Result};
use super::format_catalog::FormatCatalog;
use super::models::{
    Encoding, MediaArtifact, MuxMode, RequestId, StreamKind, TranscriptOutcome,
};
use super::muxer::{publish, Muxer};
use super::progress::ProgressHub;
use super::restoration::restorer_from_settings;
use super::temp_files::TempFileManager;
use super::tools::{ToolManager, ToolType};
use super::traits::{MediaBackend, TextRestorer};
use super::transcript::{TranscriptNormalizer, TranscriptStore};
use super::utils::validate_url;
use crate::config::Settings;

/// Video selector used when the caller did not pick an encoding
pub const DEFAULT_VIDEO_SELECTOR: &str = "bestvideo[ext=mp4]";
/// Name of the muxed file inside the scratch directory
const MUX_OUTPUT: &str = "output.mp4";

#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub id: RequestId,
    pub url: String,
    /// Encoding id from `list_formats`; best mp4 video when `None`
    pub format_id: Option<String>,
    /// Overrides `mux.mode` from settings
    pub mode: Option<MuxMode>,
    /// Overrides `mux.use_gpu` from settings
    pub use_gpu: Option<bool>,
    /// Name of the published file; `download_video-<id>.mp4` when `None`
    pub file_name: Option<String>,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: RequestId::new(),
            url: url.into(),
            format_id: None,
            mode: None,
            use_gpu: None,
            file_name: None,
        }
    }

    pub fn with_format(mut self, format_id: impl Into<String>) -> Self {
        self.format_id = Some(format_id.into());
        self
    }

    pub fn with_mode(mut self, mode: MuxMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_gpu(mut self, use_gpu: bool) -> Self {
        self.use_gpu = Some(use_gpu);
        self
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    fn video_selector(&self) -> &str {
        self.format_id.as_deref().unwrap_or(DEFAULT_VIDEO_SELECTOR)
    }

    fn output_name(&self) -> String {
        self.file_name
            .clone()
            .unwrap_or_else(|| format!("download_video-{}.mp4", self.id))
    }
}

#[derive(Debug, Clone)]
pub struct TranscriptRequest {
    pub id: RequestId,
    pub url: String,
    /// Overrides `captions.preferred_languages` from settings
    pub preferred_languages: Option<Vec<String>>,
    /// Key under which the transcript is stored; not persisted when `None`
    pub context: Option<String>,
}

impl TranscriptRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: RequestId::new(),
            url: url.into(),
            preferred_languages: None,
            context: None,
        }
    }

    pub fn with_languages(mut self, languages: Vec<String>) -> Self {
        self.preferred_languages = Some(languages);
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    Idle,
    Fetching,
    Muxing,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptState {
    Idle,
    SelectingTrack,
    Downloading,
    Cleaning,
    Restoring,
    Done,
    Failed,
}

/// Per-invocation state. Dropping it removes the scratch directory and the
/// progress registration.
pub struct RequestContext<S: Copy + fmt::Debug> {
    id: RequestId,
    scratch: TempFileManager,
    cancel: CancellationToken,
    states: Mutex<Vec<S>>,
    hub: ProgressHub,
}

impl<S: Copy + fmt::Debug> RequestContext<S> {
    fn open(
        id: RequestId,
        label: &str,
        settings: &Settings,
        parent: &CancellationToken,
        hub: &ProgressHub,
        initial: S,
    ) -> Result<Self> {
        let scratch = TempFileManager::new(settings.output.scratch_root.as_deref(), label)?;
        let cancel = parent.child_token();
        hub.track(id, &cancel);
        Ok(Self {
            id,
            scratch,
            cancel,
            states: Mutex::new(vec![initial]),
            hub: hub.clone(),
        })
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn state(&self) -> S {
        let states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        // states always holds the initial state
        states[states.len() - 1]
    }

    fn enter(&self, next: S) {
        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        debug!(request_id = %self.id, from = ?states[states.len() - 1], to = ?next, "state change");
        states.push(next);
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl<S: Copy + fmt::Debug> Drop for RequestContext<S> {
    fn drop(&mut self) {
        self.hub.remove(self.id);
        let states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        debug!(request_id = %self.id, states = ?*states, "request context closed");
    }
}

pub struct PipelineOrchestrator {
    settings: Settings,
    backend: Arc<dyn MediaBackend>,
    restorer: Arc<dyn TextRestorer>,
    ffmpeg_path: PathBuf,
    hub: ProgressHub,
    shutdown: CancellationToken,
}

impl PipelineOrchestrator {
    pub fn new(
        settings: Settings,
        backend: Arc<dyn MediaBackend>,
        restorer: Arc<dyn TextRestorer>,
    ) -> Self {
        let ffmpeg_path = ToolManager::new(settings.tools.clone()).resolve_or_name(ToolType::Ffmpeg);
        Self {
            settings,
            backend,
            restorer,
            ffmpeg_path,
            hub: ProgressHub::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Production wiring: yt-dlp backend plus the configured restorer
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let tools = ToolManager::new(settings.tools.clone());
        let network = settings.network.network_config();
        let backend = YtDlpBackend::new(
            tools.resolve_or_name(ToolType::YtDlp),
            network.clone(),
            settings.network.catalog_timeout_secs,
            settings.network.fetch_timeout_secs,
            settings.captions.format.clone(),
        );
        let restorer = restorer_from_settings(&settings.restoration, network.proxy.as_deref())?;
        Ok(Self::new(settings, Arc::new(backend), Arc::from(restorer)))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Progress and cancellation registry for in-flight requests
    pub fn progress(&self) -> ProgressHub {
        self.hub.clone()
    }

    /// Cancel every in-flight request
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Deduplicated video encodings for `url`, lowest resolution first
    pub async fn list_formats(&self, url: &str) -> Result<Vec<Encoding>> {
        validate_url(url, self.settings.network.youtube_only)?;
        let cancel = self.shutdown.child_token();
        let catalog = FormatCatalog::new(self.backend.as_ref(), &self.settings.catalog);
        self.retrying("catalog", &cancel, || catalog.list(url, &cancel))
            .await
    }

    /// Fetch video and audio in parallel, mux them and publish the result
    /// into `output.dir`. On failure nothing is left in the output directory.
    pub async fn acquire_and_mux(&self, request: &DownloadRequest) -> Result<MediaArtifact> {
        validate_url(&request.url, self.settings.network.youtube_only)?;
        let ctx = RequestContext::open(
            request.id,
            "dl",
            &self.settings,
            &self.shutdown,
            &self.hub,
            DownloadState::Idle,
        )?;
        info!(request_id = %ctx.id(), url = %request.url, selector = request.video_selector(), "download started");

        match self.run_download(&ctx, request).await {
            Ok(artifact) => {
                ctx.enter(DownloadState::Done);
                info!(request_id = %ctx.id(), path = %artifact.path.display(), size = artifact.size_bytes, "download finished");
                Ok(artifact)
            }
            Err(e) => {
                ctx.enter(DownloadState::Failed);
                error!(request_id = %ctx.id(), kind = e.kind(), error = %e, "download failed");
                Err(e)
            }
        }
    }

    async fn run_download(
        &self,
        ctx: &RequestContext<DownloadState>,
        request: &DownloadRequest,
    ) -> Result<MediaArtifact> {
        ctx.enter(DownloadState::Fetching);
        let (video, audio) = self.fetch_streams(ctx, request).await?;
        ctx.check_cancelled()?;

        ctx.enter(DownloadState::Muxing);
        let mut mux_settings = self.settings.mux.clone();
        if let Some(use_gpu) = request.use_gpu {
            mux_settings.use_gpu = use_gpu;
        }
        let mode = request.mode.unwrap_or(mux_settings.mode);
        let muxer = Muxer::new(self.ffmpeg_path.clone(), mux_settings);
        let muxed = ctx.scratch.file(MUX_OUTPUT);
        muxer
            .combine(&video, &audio, &muxed, mode, &ctx.scratch, &ctx.cancel)
            .await?;
        ctx.check_cancelled()?;

        let path = publish(&muxed, &self.settings.output.dir, &request.output_name())?;
        let size_bytes = std::fs::metadata(&path)?.len();
        Ok(MediaArtifact { path, size_bytes })
    }

    /// Both elementary streams, fetched concurrently. The first failure
    /// cancels the sibling fetch.
    async fn fetch_streams(
        &self,
        ctx: &RequestContext<DownloadState>,
        request: &DownloadRequest,
    ) -> Result<(PathBuf, PathBuf)> {
        let fetch_cancel = ctx.cancel.child_token();
        let acquirer = StreamAcquirer::new(self.backend.as_ref(), self.settings.network.retries);
        let scratch = ctx.scratch.path();

        let fetch = |kind: StreamKind, selector: &str| {
            let emitter = self.hub.register(ctx.id, kind, &fetch_cancel);
            let acquirer = &acquirer;
            let fetch_cancel = &fetch_cancel;
            let url = request.url.as_str();
            let selector = selector.to_string();
            async move {
                let result = acquirer.acquire(url, kind, &selector, scratch, &emitter).await;
                if let Err(e) = &result {
                    if !matches!(e, PipelineError::Cancelled) {
                        warn!(%kind, error = %e, "stream fetch failed, cancelling sibling");
                    }
                    fetch_cancel.cancel();
                }
                result
            }
        };

        let video = fetch(StreamKind::Video, request.video_selector());
        let audio = fetch(StreamKind::Audio, &self.settings.mux.audio_selector);
        let joined = tokio::join!(video, audio);

        // Report the root cause rather than the sibling's cancellation
        match joined {
            (Ok(video), Ok(audio)) => Ok((video, audio)),
            (Err(e), Ok(_)) | (Ok(_), Err(e)) => Err(e),
            (Err(PipelineError::Cancelled), Err(e)) | (Err(e), Err(_)) => Err(e),
        }
    }

    /// Select, download and normalize one caption track.
    ///
    /// No usable track or empty captions is `Ok(Empty)`, not an error.
    pub async fn extract_transcript(&self, request: &TranscriptRequest) -> Result<TranscriptOutcome> {
        validate_url(&request.url, self.settings.network.youtube_only)?;
        let ctx = RequestContext::open(
            request.id,
            "tr",
            &self.settings,
            &self.shutdown,
            &self.hub,
            TranscriptState::Idle,
        )?;
        info!(request_id = %ctx.id(), url = %request.url, "transcript started");

        match self.run_transcript(&ctx, request).await {
            Ok(outcome) => {
                match &outcome {
                    TranscriptOutcome::Ready(t) => {
                        ctx.enter(TranscriptState::Done);
                        info!(request_id = %ctx.id(), lang = %t.language_tag, chars = t.text.len(), "transcript ready");
                    }
                    TranscriptOutcome::Empty => {
                        ctx.enter(TranscriptState::Failed);
                        info!(request_id = %ctx.id(), "no transcript available");
                    }
                }
                Ok(outcome)
            }
            Err(e) => {
                ctx.enter(TranscriptState::Failed);
                error!(request_id = %ctx.id(), kind = e.kind(), error = %e, "transcript failed");
                Err(e)
            }
        }
    }

    async fn run_transcript(
        &self,
        ctx: &RequestContext<TranscriptState>,
        request: &TranscriptRequest,
    ) -> Result<TranscriptOutcome> {
        let preferred = request
            .preferred_languages
            .as_ref()
            .unwrap_or(&self.settings.captions.preferred_languages);

        ctx.enter(TranscriptState::SelectingTrack);
        let cancel = ctx.cancel.clone();
        let scratch = ctx.scratch.path().to_path_buf();
        let extractor = CaptionExtractor::new(self.backend.as_ref());
        let caption = self
            .retrying("caption", &cancel, || {
                extractor.extract(&request.url, preferred, &scratch, &cancel, move |track| {
                    debug!(request_id = %ctx.id(), lang = %track.language_tag, origin = %track.origin, "caption track selected");
                    ctx.enter(TranscriptState::Downloading);
                    ctx.check_cancelled()
                })
            })
            .await?;
        let Some(caption) = caption else {
            let reason = PipelineError::CaptionUnavailable(preferred.clone());
            info!(request_id = %ctx.id(), reason = %reason, "no caption content");
            return Ok(TranscriptOutcome::Empty);
        };

        ctx.enter(TranscriptState::Cleaning);
        let normalizer = TranscriptNormalizer::new(self.restorer.as_ref());
        let outcome = self
            .retrying("restoration", &cancel, || {
                normalizer.normalize(&caption, move |_| {
                    ctx.enter(TranscriptState::Restoring);
                    ctx.check_cancelled()
                })
            })
            .await?;
        ctx.check_cancelled()?;

        let TranscriptOutcome::Ready(transcript) = outcome else {
            return Ok(TranscriptOutcome::Empty);
        };
        if let Some(context) = &request.context {
            TranscriptStore::new(&self.settings.output.transcripts_dir).save(context, &transcript)?;
        }
        Ok(TranscriptOutcome::Ready(transcript))
    }

    /// Run both flows for the same URL concurrently, as one combined request
    pub async fn run_all(
        &self,
        download: &DownloadRequest,
        transcript: &TranscriptRequest,
    ) -> (Result<MediaArtifact>, Result<TranscriptOutcome>) {
        tokio::join!(self.acquire_and_mux(download), self.extract_transcript(transcript))
    }

    /// Re-run `op` on NetworkFailure up to `network.retries` extra times
    async fn retrying<T, F, Fut>(&self, what: &str, cancel: &CancellationToken, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            match op().await {
                Err(e) if e.is_retryable() && attempt < self.settings.network.retries => {
                    attempt += 1;
                    warn!(what, attempt, error = %e, "retrying after network failure");
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_secs(u64::from(attempt))) => {}
                        _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                    }
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::extractors::{CatalogSnapshot, ExtendedFormat};
    use crate::downloader::models::{CaptionTrack, DownloadTask, ProgressSample};
    use crate::downloader::progress::ProgressEmitter;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";
    const VTT: &str = "WEBVTT\nKind: captions\n\n00:00:00.000 --> 00:00:01.000\nhello world\n\n00:00:01.000 --> 00:00:02.000\nhello world\nfoo\n";

    #[derive(Default)]
    struct FakeBackend {
        captions: Vec<CaptionTrack>,
        caption_body: Option<&'static str>,
        fail_audio: bool,
        hang_video: bool,
    }

    #[async_trait]
    impl MediaBackend for FakeBackend {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn catalog(&self, _url: &str, _cancel: &CancellationToken) -> Result<CatalogSnapshot> {
            let video = |id: &str, height: u32, size: u64| ExtendedFormat {
                format_id: id.to_string(),
                ext: "mp4".to_string(),
                height: Some(height),
                vcodec: Some("avc1".to_string()),
                acodec: Some("none".to_string()),
                filesize: Some(size),
                filesize_approx: None,
            };
            Ok(CatalogSnapshot {
                id: "dQw4w9WgXcQ".to_string(),
                title: "Test".to_string(),
                formats: vec![video("137", 1080, 900), video("136", 720, 400), video("398", 720, 300)],
                captions: self.captions.clone(),
            })
        }

        async fn fetch_stream(
            &self,
            task: &DownloadTask,
            progress: &ProgressEmitter,
        ) -> Result<Option<PathBuf>> {
            let dir = task.destination.parent().unwrap().to_path_buf();
            match task.kind {
                StreamKind::Video if self.hang_video => {
                    progress.cancel_token().cancelled().await;
                    Err(PipelineError::Cancelled)
                }
                StreamKind::Audio if self.fail_audio => {
                    std::fs::write(dir.join("audio.m4a.part"), b"half")?;
                    Err(PipelineError::NetworkFailure("connection reset".into()))
                }
                kind => {
                    let ext = if kind == StreamKind::Video { "mp4" } else { "m4a" };
                    let path = dir.join(format!("{}.{}", kind.stem(), ext));
                    std::fs::write(&path, b"stream-bytes")?;
                    progress.emit(ProgressSample { bytes_downloaded: 12, bytes_total: Some(12) });
                    Ok(Some(path))
                }
            }
        }

        async fn fetch_caption(
            &self,
            _url: &str,
            track: &CaptionTrack,
            dest_dir: &Path,
            _cancel: &CancellationToken,
        ) -> Result<Option<PathBuf>> {
            match self.caption_body {
                Some(body) => {
                    let path = dest_dir.join(format!("subtitles.{}.vtt", track.language_tag));
                    std::fs::write(&path, body)?;
                    Ok(Some(path))
                }
                None => Ok(None),
            }
        }
    }

    struct CountingRestorer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TextRestorer for CountingRestorer {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn restore(&self, text: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("{}.", text))
        }
    }

    struct Harness {
        orchestrator: PipelineOrchestrator,
        restorer: Arc<CountingRestorer>,
        root: tempfile::TempDir,
    }

    impl Harness {
        fn new(backend: FakeBackend) -> Self {
            Self::with_ffmpeg(backend, PathBuf::from("no-such-ffmpeg-binary"))
        }

        fn with_ffmpeg(backend: FakeBackend, ffmpeg: PathBuf) -> Self {
            let root = tempfile::tempdir().unwrap();
            let mut settings = Settings::default()
                .with_output_dir(root.path().join("out"))
                .with_scratch_root(root.path().join("scratch"))
                .with_ffmpeg(ffmpeg);
            settings.output.transcripts_dir = root.path().join("transcripts");
            let restorer = Arc::new(CountingRestorer { calls: AtomicUsize::new(0) });
            let orchestrator = PipelineOrchestrator::new(settings, Arc::new(backend), restorer.clone());
            Self { orchestrator, restorer, root }
        }

        fn entries(&self, dir: &str) -> Vec<PathBuf> {
            match std::fs::read_dir(self.root.path().join(dir)) {
                Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
                Err(_) => Vec::new(),
            }
        }
    }

    #[tokio::test]
    async fn test_list_formats_dedups_by_bucket() {
        let harness = Harness::new(FakeBackend::default());
        let formats = harness.orchestrator.list_formats(URL).await.unwrap();
        let ids: Vec<&str> = formats.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["398", "137"]);
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected_before_any_work() {
        let harness = Harness::new(FakeBackend::default());
        let err = harness
            .orchestrator
            .acquire_and_mux(&DownloadRequest::new("https://vimeo.com/1"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidUrl(_)));
        assert!(harness.entries("scratch").is_empty());
    }

    #[tokio::test]
    async fn test_failed_audio_leaves_no_artifact() {
        let harness = Harness::new(FakeBackend {
            fail_audio: true,
            ..Default::default()
        });
        let request = DownloadRequest::new(URL).with_format("136");
        let err = harness.orchestrator.acquire_and_mux(&request).await.unwrap_err();

        assert!(matches!(err, PipelineError::NetworkFailure(_)));
        assert!(harness.entries("out").is_empty());
        assert!(harness.entries("scratch").is_empty());
        assert!(!harness.orchestrator.progress().contains(request.id));
    }

    #[tokio::test]
    async fn test_mux_failure_leaves_no_artifact() {
        let harness = Harness::new(FakeBackend::default());
        let err = harness
            .orchestrator
            .acquire_and_mux(&DownloadRequest::new(URL))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ToolNotFound(_)));
        assert!(harness.entries("out").is_empty());
        assert!(harness.entries("scratch").is_empty());
    }

    #[tokio::test]
    async fn test_cancel_through_progress_hub() {
        let harness = Harness::new(FakeBackend {
            hang_video: true,
            ..Default::default()
        });
        let request = DownloadRequest::new(URL);
        let hub = harness.orchestrator.progress();

        let canceller = async {
            while !hub.cancel(request.id) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        let (result, _) = tokio::join!(harness.orchestrator.acquire_and_mux(&request), canceller);

        assert!(matches!(result, Err(PipelineError::Cancelled)));
        assert!(harness.entries("scratch").is_empty());
    }

    #[tokio::test]
    async fn test_transcript_prefers_manual_track_and_persists() {
        let harness = Harness::new(FakeBackend {
            captions: vec![
                CaptionTrack::manual("en"),
                CaptionTrack::automatic("ru"),
                CaptionTrack::automatic("en"),
            ],
            caption_body: Some(VTT),
            ..Default::default()
        });
        let request = TranscriptRequest::new(URL).with_context("chat-1");
        let outcome = harness.orchestrator.extract_transcript(&request).await.unwrap();

        match outcome {
            TranscriptOutcome::Ready(t) => {
                assert_eq!(t.language_tag, "en");
                assert_eq!(t.lines, vec!["hello world", "foo"]);
                assert_eq!(t.text, "hello world foo.");
            }
            TranscriptOutcome::Empty => panic!("expected a transcript"),
        }
        let stored = TranscriptStore::new(harness.root.path().join("transcripts"))
            .load("chat-1")
            .unwrap();
        assert_eq!(stored.as_deref(), Some("hello world foo."));
        assert!(harness.entries("scratch").is_empty());
    }

    #[tokio::test]
    async fn test_no_caption_track_is_empty_without_restoring() {
        let harness = Harness::new(FakeBackend {
            captions: vec![CaptionTrack::manual("de")],
            caption_body: Some(VTT),
            ..Default::default()
        });
        let outcome = harness
            .orchestrator
            .extract_transcript(&TranscriptRequest::new(URL))
            .await
            .unwrap();
        assert!(outcome.is_empty());
        assert_eq!(harness.restorer.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_request_context_state_log() {
        let root = tempfile::tempdir().unwrap();
        let settings = Settings::default().with_scratch_root(root.path().to_path_buf());
        let hub = ProgressHub::new();
        let id = RequestId::new();
        let ctx = RequestContext::open(id, "transcript", &settings, &CancellationToken::new(), &hub, TranscriptState::Idle)
            .unwrap();

        assert!(hub.contains(id));
        ctx.enter(TranscriptState::SelectingTrack);
        ctx.enter(TranscriptState::Downloading);
        assert_eq!(ctx.state(), TranscriptState::Downloading);
        assert!(ctx.check_cancelled().is_ok());
        hub.cancel(id);
        assert!(matches!(ctx.check_cancelled(), Err(PipelineError::Cancelled)));

        drop(ctx);
        assert!(!hub.contains(id));
    }

    #[tokio::test]
    async fn test_empty_caption_file_is_empty_without_restoring() {
        let harness = Harness::new(FakeBackend {
            captions: vec![CaptionTrack::automatic("ru")],
            caption_body: Some("WEBVTT\n\n"),
            ..Default::default()
        });
        let outcome = harness
            .orchestrator
            .extract_transcript(&TranscriptRequest::new(URL))
            .await
            .unwrap();
        assert!(outcome.is_empty());
        assert_eq!(harness.restorer.calls.load(Ordering::SeqCst), 0);
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn fake_ffmpeg(dir: &Path) -> PathBuf {
            let path = dir.join("ffmpeg");
            std::fs::write(&path, "#!/bin/sh\nfor last; do :; done\nprintf muxed > \"$last\"\n").unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[tokio::test]
        async fn test_successful_download_publishes_artifact() {
            let bin = tempfile::tempdir().unwrap();
            let harness = Harness::with_ffmpeg(FakeBackend::default(), fake_ffmpeg(bin.path()));
            let request = DownloadRequest::new(URL)
                .with_format("398")
                .with_file_name("clip.mp4");

            let artifact = harness.orchestrator.acquire_and_mux(&request).await.unwrap();
            assert_eq!(artifact.path, harness.root.path().join("out").join("clip.mp4"));
            assert_eq!(artifact.size_bytes, 5);
            assert!(harness.entries("scratch").is_empty());
        }

        #[tokio::test]
        async fn test_run_all_returns_both_outcomes() {
            let bin = tempfile::tempdir().unwrap();
            let harness = Harness::with_ffmpeg(
                FakeBackend {
                    captions: vec![CaptionTrack::automatic("en")],
                    caption_body: Some(VTT),
                    ..Default::default()
                },
                fake_ffmpeg(bin.path()),
            );

            let (artifact, transcript) = harness
                .orchestrator
                .run_all(&DownloadRequest::new(URL), &TranscriptRequest::new(URL))
                .await;
            assert!(artifact.unwrap().path.exists());
            assert_eq!(transcript.unwrap().text(), Some("hello world foo."));
        }
    }
}
