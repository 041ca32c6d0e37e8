//! Audio metadata extraction
//!
//! Uses lofty for tag reading. Extraction is strictly best-effort: any
//! failure yields `None` and callers fall back to placeholder labels.

use std::path::{Path, PathBuf};

use lofty::file::{AudioFile, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::{ItemKey, Tag};
use tracing::debug;

/// Placeholder shown when a track has no readable title
pub const UNKNOWN_TITLE: &str = "未知标题";
/// Placeholder shown when a track has no readable artist
pub const UNKNOWN_ARTIST: &str = "未知艺术家";

/// Metadata for a local audio file
#[derive(Debug, Clone, PartialEq)]
pub struct TrackMetadata {
    pub source_path: PathBuf,
    pub file_name: String,
    /// File stem, used as the local identifier for cache bookkeeping
    pub track_id: String,
    pub file_size_bytes: u64,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration_seconds: Option<f64>,
}

impl TrackMetadata {
    /// File-level fields only, no tag data
    pub fn bare(path: &Path) -> Self {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let track_id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_size_bytes = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);

        Self {
            source_path: path.to_path_buf(),
            file_name,
            track_id,
            file_size_bytes,
            title: None,
            artist: None,
            album: None,
            duration_seconds: None,
        }
    }

    /// Human readable `"{title} - {artist}"` label with placeholders
    pub fn label(&self) -> String {
        format!(
            "{} - {}",
            self.title.as_deref().unwrap_or(UNKNOWN_TITLE),
            self.artist.as_deref().unwrap_or(UNKNOWN_ARTIST)
        )
    }
}

/// Whether embedded tags can be read in this process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TagSupport {
    #[default]
    Available,
    Unavailable,
}

/// Best-effort tag reader
///
/// The capability is fixed at construction; an extractor built with
/// [`TagSupport::Unavailable`] never touches the file.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataExtractor {
    support: TagSupport,
}

// Field lookup order. Each `ItemKey` resolves to the format's native key:
// title  -> TIT2 (ID3v2), TITLE (Vorbis/APE), ©nam (MP4)
// artist -> TPE1, ARTIST, ©ART
// album  -> TALB, ALBUM, ©alb
const TITLE_KEY: ItemKey = ItemKey::TrackTitle;
const ARTIST_KEY: ItemKey = ItemKey::TrackArtist;
const ALBUM_KEY: ItemKey = ItemKey::AlbumTitle;

impl MetadataExtractor {
    pub fn new(support: TagSupport) -> Self {
        Self { support }
    }

    pub fn support(&self) -> TagSupport {
        self.support
    }

    /// Extract metadata from an audio file
    ///
    /// Returns `None` when tag reading is unavailable, the file cannot be
    /// probed, or it carries no tags at all.
    pub fn extract(&self, path: &Path) -> Option<TrackMetadata> {
        if self.support == TagSupport::Unavailable {
            return None;
        }

        let tagged_file = match Probe::open(path).and_then(|p| p.read()) {
            Ok(f) => f,
            Err(e) => {
                debug!("Failed to read tags from {:?}: {}", path, e);
                return None;
            }
        };

        let mut metadata = TrackMetadata::bare(path);

        let duration = tagged_file.properties().duration();
        if !duration.is_zero() {
            metadata.duration_seconds = Some(duration.as_secs_f64());
        }

        // Primary tag first, then whatever else the container carries
        let mut tags: Vec<&Tag> = Vec::new();
        if let Some(primary) = tagged_file.primary_tag() {
            tags.push(primary);
        }
        for tag in tagged_file.tags() {
            if !tags.iter().any(|t| t.tag_type() == tag.tag_type()) {
                tags.push(tag);
            }
        }

        if tags.is_empty() {
            debug!("No tags found in {:?}", path);
            return None;
        }

        metadata.title = first_value(&tags, &TITLE_KEY);
        metadata.artist = first_value(&tags, &ARTIST_KEY);
        metadata.album = first_value(&tags, &ALBUM_KEY);

        Some(metadata)
    }
}

/// First non-empty value for a key across tags, in order
///
/// Multi-valued items contribute only their first element.
fn first_value(tags: &[&Tag], key: &ItemKey) -> Option<String> {
    tags.iter()
        .filter_map(|tag| tag.get_strings(key).next())
        .filter_map(first_element)
        .next()
}

/// First element of a possibly NUL-separated multi-value string
fn first_element(value: &str) -> Option<String> {
    value
        .split('\0')
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}
