// FormatCatalog - lists the video encodings a caller can choose from
//
// Keeps video-only entries in the configured container above the height
// floor, buckets them by normalized resolution and keeps the smallest entry
// per bucket. Output is sorted by resolution, lowest first.

use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::errors::{PipelineError, Result};
use super::extractors::ExtendedFormat;
use super::models::{Encoding, ResolutionBucket};
use super::traits::MediaBackend;
use crate::config::{CatalogSettings, UnknownSizePolicy};

/// Deduplicate `formats` into at most one encoding per resolution bucket.
///
/// Within a bucket the smallest sized entry wins and ties keep the first one
/// seen. Unknown-size entries are handled by `settings.unknown_size`.
pub fn select_encodings(formats: &[ExtendedFormat], settings: &CatalogSettings) -> Vec<Encoding> {
    // bucket -> (best sized entry, first unknown-size entry)
    let mut buckets: BTreeMap<ResolutionBucket, (Option<Encoding>, Option<Encoding>)> =
        BTreeMap::new();

    let candidates = formats.iter().filter(|f| {
        f.is_video_only()
            && f.ext.eq_ignore_ascii_case(&settings.container)
            && f.height.map_or(false, |h| h >= settings.min_height)
    });

    for f in candidates {
        let Some(height) = f.height else { continue };
        let bucket = ResolutionBucket::from_height(height, &settings.ladder);
        let encoding = Encoding {
            id: f.format_id.clone(),
            height: bucket.0,
            approx_size_bytes: f.effective_size(),
            ext: f.ext.clone(),
        };

        let slot = buckets.entry(bucket).or_default();
        match encoding.approx_size_bytes {
            Some(size) => {
                let replace = slot
                    .0
                    .as_ref()
                    .and_then(|best| best.approx_size_bytes)
                    .map_or(true, |best_size| size < best_size);
                if replace {
                    slot.0 = Some(encoding);
                }
            }
            None => {
                if slot.1.is_none() {
                    slot.1 = Some(encoding);
                }
            }
        }
    }

    buckets
        .into_values()
        .filter_map(|(sized, unknown)| match settings.unknown_size {
            UnknownSizePolicy::Drop => sized,
            UnknownSizePolicy::RetainIfBucketEmpty => sized.or(unknown),
        })
        .collect()
}

/// Catalog queries against a backend. Nothing is cached between calls.
pub struct FormatCatalog<'a> {
    backend: &'a dyn MediaBackend,
    settings: &'a CatalogSettings,
}

impl<'a> FormatCatalog<'a> {
    pub fn new(backend: &'a dyn MediaBackend, settings: &'a CatalogSettings) -> Self {
        Self { backend, settings }
    }

    pub async fn list(&self, url: &str, cancel: &CancellationToken) -> Result<Vec<Encoding>> {
        let snapshot = self.backend.catalog(url, cancel).await?;
        debug!(
            url,
            backend = self.backend.name(),
            raw_formats = snapshot.formats.len(),
            "catalog snapshot received"
        );

        let encodings = select_encodings(&snapshot.formats, self.settings);
        if encodings.is_empty() {
            return Err(PipelineError::FormatUnavailable(format!(
                "no {} video stream at or above {}p",
                self.settings.container, self.settings.min_height
            )));
        }

        info!(
            url,
            count = encodings.len(),
            heights = ?encodings.iter().map(|e| e.height).collect::<Vec<_>>(),
            "formats listed"
        );
        Ok(encodings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_video_format(id: &str, height: u32, size: Option<u64>) -> ExtendedFormat {
        ExtendedFormat {
            format_id: id.to_string(),
            ext: "mp4".to_string(),
            height: Some(height),
            vcodec: Some("avc1.4d401f".to_string()),
            acodec: Some("none".to_string()),
            filesize: size,
            filesize_approx: None,
        }
    }

    fn ids(encodings: &[Encoding]) -> Vec<&str> {
        encodings.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn test_smallest_per_bucket_sorted_ascending() {
        let formats = vec![
            make_video_format("1080a", 1080, Some(90_000_000)),
            make_video_format("360a", 360, Some(9_000_000)),
            make_video_format("1080b", 1080, Some(70_000_000)),
            make_video_format("720a", 720, Some(40_000_000)),
            make_video_format("360b", 360, Some(12_000_000)),
        ];

        let encodings = select_encodings(&formats, &CatalogSettings::default());
        assert_eq!(ids(&encodings), vec!["360a", "720a", "1080b"]);
        let heights: Vec<u32> = encodings.iter().map(|e| e.height).collect();
        assert_eq!(heights, vec![360, 720, 1080]);
    }

    #[test]
    fn test_ties_keep_first_seen() {
        let formats = vec![
            make_video_format("first", 720, Some(1000)),
            make_video_format("second", 720, Some(1000)),
        ];
        let encodings = select_encodings(&formats, &CatalogSettings::default());
        assert_eq!(ids(&encodings), vec!["first"]);
    }

    #[test]
    fn test_near_ladder_heights_share_bucket() {
        let formats = vec![
            make_video_format("1080", 1080, Some(500)),
            make_video_format("1036", 1036, Some(400)),
        ];
        let encodings = select_encodings(&formats, &CatalogSettings::default());
        assert_eq!(ids(&encodings), vec!["1036"]);
        assert_eq!(encodings[0].height, 1080);
    }

    #[test]
    fn test_filters_container_floor_and_muxed() {
        let mut webm = make_video_format("webm", 480, Some(10));
        webm.ext = "webm".to_string();
        let mut muxed = make_video_format("muxed", 360, Some(10));
        muxed.acodec = Some("mp4a.40.2".to_string());
        let audio = ExtendedFormat {
            format_id: "140".into(),
            ext: "m4a".into(),
            vcodec: Some("none".into()),
            acodec: Some("mp4a.40.2".into()),
            filesize: Some(1),
            ..Default::default()
        };
        let formats = vec![
            webm,
            muxed,
            audio,
            make_video_format("tiny", 144, Some(5)),
            make_video_format("ok", 480, Some(50)),
        ];

        let settings = CatalogSettings::default().with_min_height(240);
        let encodings = select_encodings(&formats, &settings);
        assert_eq!(ids(&encodings), vec!["ok"]);
    }

    #[test]
    fn test_unknown_size_policy() {
        let formats = vec![
            make_video_format("720-unknown", 720, None),
            make_video_format("720-sized", 720, Some(100)),
            make_video_format("480-unknown-a", 480, None),
            make_video_format("480-unknown-b", 480, None),
        ];

        let retain = CatalogSettings::default();
        assert_eq!(
            ids(&select_encodings(&formats, &retain)),
            vec!["480-unknown-a", "720-sized"]
        );

        let drop = CatalogSettings::default().with_unknown_size(UnknownSizePolicy::Drop);
        assert_eq!(ids(&select_encodings(&formats, &drop)), vec!["720-sized"]);
    }

    #[test]
    fn test_custom_ladder() {
        let formats = vec![
            make_video_format("a", 700, Some(10)),
            make_video_format("b", 760, Some(20)),
        ];
        let coarse = CatalogSettings::default().with_ladder(vec![720]);
        assert_eq!(ids(&select_encodings(&formats, &coarse)), vec!["a"]);

        let none = CatalogSettings::default().with_ladder(Vec::new());
        assert_eq!(ids(&select_encodings(&formats, &none)), vec!["a", "b"]);
    }

    #[test]
    fn test_deterministic_output() {
        let formats: Vec<ExtendedFormat> = (0..20)
            .map(|i| make_video_format(&format!("f{i}"), [360, 480, 720][i % 3], Some((i as u64 * 7919) % 101)))
            .collect();
        let settings = CatalogSettings::default();
        let first = select_encodings(&formats, &settings);
        for _ in 0..5 {
            assert_eq!(select_encodings(&formats, &settings), first);
        }
        let mut buckets: Vec<u32> = first.iter().map(|e| e.height).collect();
        buckets.dedup();
        assert_eq!(buckets.len(), first.len());
    }
}
