//! Local music library scanning
//!
//! Scans a single directory (non-recursively) for audio files, extracts
//! metadata in parallel and keeps the last index in memory so repeated
//! lookups within the freshness window avoid walking the disk again.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use rayon::prelude::*;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::metadata::{MetadataExtractor, TrackMetadata};

/// Supported audio file extensions
pub const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "wav", "m4a", "ogg", "opus", "aac", "wma", "aiff",
];

/// Check if a file extension is a supported audio format
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| AUDIO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Snapshot of a scanned directory
#[derive(Debug, Clone)]
pub struct LocalLibraryIndex {
    pub directory: PathBuf,
    pub entries: Vec<TrackMetadata>,
    pub scanned_at: SystemTime,
}

impl LocalLibraryIndex {
    /// Whether the index is no older than `max_age` at `now`
    pub fn is_fresh(&self, now: SystemTime, max_age: Duration) -> bool {
        match now.duration_since(self.scanned_at) {
            Ok(age) => age <= max_age,
            // Clock went backwards; treat as fresh rather than thrash
            Err(_) => true,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Lazily rescanning library
#[derive(Debug, Default)]
pub struct LibraryScanner {
    extractor: MetadataExtractor,
    cached: Option<LocalLibraryIndex>,
}

/// Audio files directly under `root`, sorted by file name
pub fn discover_audio_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .filter(|p| is_audio_file(p))
        .collect();

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    files
}

impl LibraryScanner {
    pub fn new(extractor: MetadataExtractor) -> Self {
        Self {
            extractor,
            cached: None,
        }
    }

    /// Walk `directory` and build a fresh index
    ///
    /// The previous index is replaced wholesale.
    pub fn scan(&mut self, directory: &Path) -> &LocalLibraryIndex {
        let index = self.build_index(directory);
        self.cached.insert(index)
    }

    /// Return the cached index when fresh enough, otherwise rescan
    pub fn get_or_scan(&mut self, directory: &Path, max_age: Duration) -> &LocalLibraryIndex {
        let now = SystemTime::now();
        let reusable = self
            .cached
            .take()
            .filter(|idx| idx.directory == directory && idx.is_fresh(now, max_age));

        let index = match reusable {
            Some(index) => {
                debug!("Reusing library index for {:?}", directory);
                index
            }
            None => self.build_index(directory),
        };
        self.cached.insert(index)
    }

    fn build_index(&self, directory: &Path) -> LocalLibraryIndex {
        let start = Instant::now();

        if !directory.is_dir() {
            warn!("Library directory {:?} does not exist", directory);
        }

        let files = discover_audio_files(directory);
        let extractor = self.extractor;
        let entries: Vec<TrackMetadata> = files
            .par_iter()
            .map(|path| {
                extractor
                    .extract(path)
                    .unwrap_or_else(|| TrackMetadata::bare(path))
            })
            .collect();

        info!(
            "Scanned {:?}: {} tracks in {:?}",
            directory,
            entries.len(),
            start.elapsed()
        );

        LocalLibraryIndex {
            directory: directory.to_path_buf(),
            entries,
            scanned_at: SystemTime::now(),
        }
    }

    /// The last index built, if any
    pub fn cached(&self) -> Option<&LocalLibraryIndex> {
        self.cached.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::TagSupport;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.mp3"), b"not audio").unwrap();
        std::fs::write(dir.path().join("a.FLAC"), b"not audio").unwrap();
        std::fs::write(dir.path().join("cover.jpg"), b"image").unwrap();
        let nested = dir.path().join("nested");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("deep.mp3"), b"not audio").unwrap();
        dir
    }

    #[test]
    fn test_is_audio_file() {
        assert!(is_audio_file(Path::new("x.mp3")));
        assert!(is_audio_file(Path::new("x.OGG")));
        assert!(!is_audio_file(Path::new("x.txt")));
        assert!(!is_audio_file(Path::new("mp3")));
    }

    #[test]
    fn test_scan_is_flat_and_sorted() {
        let dir = fixture();
        let mut scanner = LibraryScanner::new(MetadataExtractor::new(TagSupport::Available));
        let index = scanner.scan(dir.path());

        let names: Vec<_> = index.entries.iter().map(|e| e.file_name.as_str()).collect();
        assert_eq!(names, ["a.FLAC", "b.mp3"]);
        assert_eq!(index.entries[1].track_id, "b");
        assert_eq!(index.entries[1].title, None);
    }

    #[test]
    fn test_get_or_scan_reuses_fresh_index() {
        let dir = fixture();
        let mut scanner = LibraryScanner::default();
        let first = scanner.scan(dir.path()).scanned_at;

        std::fs::write(dir.path().join("c.mp3"), b"new").unwrap();

        let index = scanner.get_or_scan(dir.path(), Duration::from_secs(3600));
        assert_eq!(index.scanned_at, first);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_get_or_scan_rescans_other_directory() {
        let dir = fixture();
        let other = tempfile::tempdir().unwrap();
        let mut scanner = LibraryScanner::default();
        scanner.scan(dir.path());

        let index = scanner.get_or_scan(other.path(), Duration::from_secs(3600));
        assert_eq!(index.directory, other.path());
        assert!(index.is_empty());
    }

    #[test]
    fn test_is_fresh_window() {
        let scanned_at = SystemTime::now();
        let index = LocalLibraryIndex {
            directory: PathBuf::from("/music"),
            entries: Vec::new(),
            scanned_at,
        };
        let max_age = Duration::from_secs(60);
        assert!(index.is_fresh(scanned_at + Duration::from_secs(60), max_age));
        assert!(!index.is_fresh(scanned_at + Duration::from_secs(61), max_age));
    }
}
