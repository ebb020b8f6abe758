// Download, mux and transcribe remote videos.
//
// `PipelineOrchestrator` lists the encodings a video offers, fetches the
// chosen video stream and an audio stream in parallel and muxes them with
// ffmpeg, or picks a caption track and turns it into a punctuated
// transcript. yt-dlp does the remote work; both flows can run together.

pub mod config;
pub mod downloader;

pub use config::Settings;
pub use downloader::{
    DownloadRequest, Encoding, MediaArtifact, MuxMode, PipelineError, PipelineOrchestrator,
    ProgressHub, RequestId, Result, Transcript, TranscriptOutcome, TranscriptRequest,
};
