// Downloader module - media acquisition, muxing and transcript extraction
//
// The orchestrator is the entry point; everything below it is usable on its
// own with a MediaBackend / TextRestorer of the caller's choosing.

pub mod acquirer;
pub mod backend;
pub mod captions;
pub mod errors;
pub mod extractors;
pub mod format_catalog;
pub mod models;
pub mod muxer;
pub mod orchestrator;
pub mod progress;
pub mod restoration;
pub mod temp_files;
pub mod tools;
pub mod traits;
pub mod transcript;
pub mod utils;

pub use backend::YtDlpBackend;
pub use errors::{PipelineError, Result};
pub use models::{
    CaptionOrigin, CaptionTrack, Encoding, MediaArtifact, MuxMode, NetworkConfig, ProgressSample,
    RequestId, StreamKind, Transcript, TranscriptOutcome,
};
pub use orchestrator::{
    DownloadRequest, DownloadState, PipelineOrchestrator, TranscriptRequest, TranscriptState,
};
pub use progress::{ProgressEmitter, ProgressHub};
pub use restoration::{HttpRestorer, IdentityRestorer};
pub use tools::{ToolInfo, ToolManager, ToolType};
pub use traits::{MediaBackend, TextRestorer};
pub use transcript::TranscriptStore;
