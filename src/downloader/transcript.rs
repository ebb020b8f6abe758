// Caption normalization and transcript persistence.
//
// WebVTT is reduced to its spoken lines: headers, cue timings, cue ids and
// inline markup go away, and rolling captions that repeat the previous line
// are collapsed. The joined text is handed to a `TextRestorer`.

use regex::Regex;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::captions::CaptionFile;
use super::errors::{PipelineError, Result};
use super::models::{Transcript, TranscriptOutcome};
use super::traits::TextRestorer;

lazy_static::lazy_static! {
    static ref TAG_RE: Regex = Regex::new(r"<[^>]+>").unwrap();
    static ref SPACE_RE: Regex = Regex::new(r"\s+").unwrap();
}

const HEADER_FIELDS: [&str; 2] = ["kind:", "language:"];
/// WebVTT block keywords, matched case-sensitively
const BLOCK_KEYWORDS: [&str; 4] = ["WEBVTT", "NOTE", "STYLE", "REGION"];

fn is_metadata(line: &str) -> bool {
    let lower = line.to_lowercase();
    if HEADER_FIELDS.iter().any(|f| lower.starts_with(f)) {
        return true;
    }
    let first_word = line.split_whitespace().next().unwrap_or_default();
    BLOCK_KEYWORDS.contains(&first_word)
}

fn decode_entities(line: &str) -> String {
    line.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Spoken lines of a WebVTT document, adjacent duplicates collapsed
pub fn clean_lines(vtt: &str) -> Vec<String> {
    let mut kept: Vec<String> = Vec::new();
    let mut lines = vtt.lines().map(str::trim).filter(|l| !l.is_empty()).peekable();

    while let Some(line) = lines.next() {
        if line.contains("-->") || is_metadata(line) {
            continue;
        }
        // A bare number is a cue id only when a timing line follows it
        if line.chars().all(|c| c.is_ascii_digit())
            && lines.peek().map_or(false, |next| next.contains("-->"))
        {
            continue;
        }

        let stripped = TAG_RE.replace_all(line, "");
        let decoded = decode_entities(&stripped);
        let text = SPACE_RE.replace_all(decoded.trim(), " ").to_string();
        if text.is_empty() {
            continue;
        }

        if kept.last() != Some(&text) {
            kept.push(text);
        }
    }

    kept
}

pub struct TranscriptNormalizer<'a> {
    restorer: &'a dyn TextRestorer,
}

impl<'a> TranscriptNormalizer<'a> {
    pub fn new(restorer: &'a dyn TextRestorer) -> Self {
        Self { restorer }
    }

    /// Clean a downloaded caption file and restore punctuation.
    ///
    /// `on_cleaned` sees the spoken lines before the restorer runs; an error
    /// from it stops there. A missing file or one with no spoken lines is
    /// `Empty` and neither the hook nor the restorer is called.
    pub async fn normalize(
        &self,
        caption: &CaptionFile,
        on_cleaned: impl FnOnce(&[String]) -> Result<()>,
    ) -> Result<TranscriptOutcome> {
        match read_caption_lines(&caption.path)? {
            Some(lines) => {
                on_cleaned(&lines)?;
                Ok(TranscriptOutcome::Ready(self.restore(caption, lines).await?))
            }
            None => Ok(TranscriptOutcome::Empty),
        }
    }

    /// Join cleaned `lines` and run them through the restorer
    pub async fn restore(&self, caption: &CaptionFile, lines: Vec<String>) -> Result<Transcript> {
        let joined = lines.join(" ");
        debug!(lines = lines.len(), chars = joined.len(), restorer = self.restorer.name(), "restoring text");
        let text = self.restorer.restore(&joined).await?;

        Ok(Transcript {
            language_tag: caption.track.language_tag.clone(),
            origin: caption.track.origin,
            lines,
            text,
        })
    }
}

/// Cleaned lines of a caption file; `None` when the file is missing or has
/// no spoken lines
pub fn read_caption_lines(path: &Path) -> Result<Option<Vec<String>>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "caption file missing");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    let lines = clean_lines(&content);
    if lines.is_empty() {
        debug!(path = %path.display(), "caption file has no spoken lines");
        return Ok(None);
    }
    Ok(Some(lines))
}

/// One transcript file per context key, replaced on every save
pub struct TranscriptStore {
    dir: PathBuf,
}

impl TranscriptStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, context: &str) -> PathBuf {
        self.dir.join(format!("{}.txt", sanitize_context(context)))
    }

    /// Write `transcript.text` for `context` via a temp file and rename
    pub fn save(&self, context: &str, transcript: &Transcript) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(context);

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(transcript.text.as_bytes())?;
        tmp.write_all(b"\n")?;
        tmp.persist(&path)
            .map_err(|e| PipelineError::Io(e.error))?;

        info!(context, path = %path.display(), "transcript saved");
        Ok(path)
    }

    pub fn load(&self, context: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(context)) {
            Ok(text) => Ok(Some(text.trim_end().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn sanitize_context(context: &str) -> String {
    let cleaned: String = context
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "default".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::models::CaptionTrack;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingRestorer {
        calls: AtomicUsize,
    }

    impl CountingRestorer {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
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

    const SAMPLE_VTT: &str = "WEBVTT\nKind: captions\nLanguage: en\n\n1\n00:00:00.000 --> 00:00:02.000 align:start position:0%\nhello<00:00:00.500><c> world</c>\n\n2\n00:00:02.000 --> 00:00:04.000\nhello world\n\n00:00:04.000 --> 00:00:06.000\nTom &amp; Jerry\n\nNOTE this is a comment\n";

    fn caption_file(dir: &Path, content: &str) -> CaptionFile {
        let path = dir.join("subtitles.en.vtt");
        std::fs::write(&path, content).unwrap();
        CaptionFile {
            track: CaptionTrack::automatic("en"),
            path,
        }
    }

    #[test]
    fn test_adjacent_duplicates_collapse() {
        let vtt = "hello world\nhello world\nfoo\nhello world\n";
        assert_eq!(clean_lines(vtt), vec!["hello world", "foo", "hello world"]);
    }

    #[test]
    fn test_clean_strips_headers_timings_and_markup() {
        assert_eq!(clean_lines(SAMPLE_VTT), vec!["hello world", "Tom & Jerry"]);
    }

    #[test]
    fn test_numeric_cue_text_is_kept() {
        let vtt = "WEBVTT\n\n00:00:01.000 --> 00:00:02.000\nthe year was\n\n00:00:02.000 --> 00:00:03.000\n1990\n\n7\n00:00:03.000 --> 00:00:04.000\n42\n";
        assert_eq!(clean_lines(vtt), vec!["the year was", "1990", "42"]);
    }

    #[test]
    fn test_keyword_prefixed_speech_is_kept() {
        assert_eq!(clean_lines("Note that\nStyleguide"), vec!["Note that", "Styleguide"]);
    }

    #[test]
    fn test_header_only_file_is_empty() {
        assert!(clean_lines("WEBVTT\nKind: captions\n\n").is_empty());
        assert!(clean_lines("").is_empty());
    }

    #[tokio::test]
    async fn test_normalize_restores_joined_text() {
        let dir = tempfile::tempdir().unwrap();
        let restorer = CountingRestorer::new();
        let outcome = TranscriptNormalizer::new(&restorer)
            .normalize(&caption_file(dir.path(), SAMPLE_VTT), |lines| {
                assert_eq!(lines, ["hello world", "Tom & Jerry"]);
                Ok(())
            })
            .await
            .unwrap();

        match outcome {
            TranscriptOutcome::Ready(t) => {
                assert_eq!(t.text, "hello world Tom & Jerry.");
                assert_eq!(t.lines.len(), 2);
                assert_eq!(t.language_tag, "en");
            }
            TranscriptOutcome::Empty => panic!("expected a transcript"),
        }
        assert_eq!(restorer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_content_skips_restorer() {
        let dir = tempfile::tempdir().unwrap();
        let restorer = CountingRestorer::new();
        let normalizer = TranscriptNormalizer::new(&restorer);

        let empty = caption_file(dir.path(), "WEBVTT\n\n00:00:00.000 --> 00:00:01.000\n\n");
        assert!(normalizer.normalize(&empty, |_| panic!("no lines to see")).await.unwrap().is_empty());

        let missing = CaptionFile {
            track: CaptionTrack::manual("ru"),
            path: dir.path().join("absent.vtt"),
        };
        assert!(normalizer.normalize(&missing, |_| panic!("no lines to see")).await.unwrap().is_empty());

        assert_eq!(restorer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_hook_error_stops_before_restorer() {
        let dir = tempfile::tempdir().unwrap();
        let restorer = CountingRestorer::new();
        let err = TranscriptNormalizer::new(&restorer)
            .normalize(&caption_file(dir.path(), SAMPLE_VTT), |_| Err(PipelineError::Cancelled))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
        assert_eq!(restorer.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_store_overwrites_per_context() {
        let dir = tempfile::tempdir().unwrap();
        let store = TranscriptStore::new(dir.path().join("transcripts"));
        let mut transcript = Transcript {
            language_tag: "en".into(),
            origin: crate::downloader::models::CaptionOrigin::Manual,
            lines: vec!["a".into()],
            text: "First.".into(),
        };

        let path = store.save("chat/42", &transcript).unwrap();
        assert_eq!(path.file_name().unwrap(), "chat_42.txt");
        transcript.text = "Second.".into();
        store.save("chat/42", &transcript).unwrap();

        assert_eq!(store.load("chat/42").unwrap().as_deref(), Some("Second."));
        assert_eq!(store.load("other").unwrap(), None);
    }
}
