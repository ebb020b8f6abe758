// InfoExtractor module - remote catalog queries
//
// The CLI extractor runs `yt-dlp --dump-json` and produces a CatalogSnapshot;
// diagnostics maps yt-dlp stderr onto the pipeline error taxonomy.

mod cli;
mod diagnostics;
mod traits;

pub use cli::CliInfoExtractor;
pub use diagnostics::{classify_stderr, diagnose_error, FailureReason};
pub use traits::{CatalogSnapshot, ExtendedFormat, ExtractorConfig, InfoExtractor};
