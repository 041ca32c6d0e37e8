//! Cache management module
//!
//! Owns the on-disk layout for cached audio:
//! - `<root>/music/` holds persisted downloads
//! - `<root>/music/temp/` holds in-flight downloads and is purged at startup
//!
//! Downloads are staged in the temp area and promoted into the persistent
//! area once complete, so a partially written file is never served from cache.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};
use xxhash_rust::xxh3::xxh3_64;

use crate::utils::{extract_extension_from_url, unix_now_secs};

const MUSIC_DIR: &str = "music";
const TEMP_DIR: &str = "temp";

/// Errors raised while creating the cache layout
#[derive(Debug, Error)]
pub enum CacheInitError {
    #[error("failed to create cache directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cache path {0:?} exists but is not a directory")]
    NotADirectory(PathBuf),
}

/// Errors raised by cache operations after initialization
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Resolved cache directories
///
/// Both directories exist once a layout has been returned by [`ensure_layout`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayout {
    /// Persistent cache area (`<base>/music`)
    pub root: PathBuf,
    /// Disposable staging area (`<base>/music/temp`)
    pub temp_subdir: PathBuf,
}

/// Information about a cached file
#[derive(Debug)]
struct CacheEntry {
    path: PathBuf,
    size: u64,
}

/// Result of a purge operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClearResult {
    pub files_deleted: usize,
    pub bytes_freed: u64,
    pub errors: usize,
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Bytes held in the persistent area
    pub persisted_bytes: u64,
    /// Files held in the persistent area
    pub persisted_files: usize,
    /// Bytes held in the temp area
    pub temp_bytes: u64,
    /// Files held in the temp area
    pub temp_files: usize,
}

impl CacheStats {
    /// Get total size in megabytes
    pub fn total_mb(&self) -> u64 {
        (self.persisted_bytes + self.temp_bytes) / (1024 * 1024)
    }
}

/// Create `<base>/music` and `<base>/music/temp` if absent
pub fn ensure_layout(base_cache_dir: &Path) -> Result<CacheLayout, CacheInitError> {
    let root = base_cache_dir.join(MUSIC_DIR);
    let temp_subdir = root.join(TEMP_DIR);

    for dir in [&root, &temp_subdir] {
        if dir.exists() && !dir.is_dir() {
            return Err(CacheInitError::NotADirectory(dir.clone()));
        }
        fs::create_dir_all(dir).map_err(|source| CacheInitError::CreateDir {
            path: dir.clone(),
            source,
        })?;
    }

    debug!("Cache layout ready at {:?}", root);
    Ok(CacheLayout { root, temp_subdir })
}

/// Delete every regular file directly under the temp area
///
/// Individual deletion failures are logged and counted but never stop the
/// purge. The temp directory itself and any subdirectories are left alone.
pub fn purge_temp(layout: &CacheLayout) -> ClearResult {
    let mut result = ClearResult::default();

    for entry in collect_entries(&layout.temp_subdir) {
        match fs::remove_file(&entry.path) {
            Ok(_) => {
                debug!("Deleted temp cache file: {:?}", entry.path);
                result.files_deleted += 1;
                result.bytes_freed += entry.size;
            }
            Err(e) => {
                warn!("Failed to delete temp cache file {:?}: {}", entry.path, e);
                result.errors += 1;
            }
        }
    }

    info!(
        "Temp cache purge: {} files deleted, {} bytes freed, {} errors",
        result.files_deleted, result.bytes_freed, result.errors
    );

    result
}

/// Collect all regular files directly under a directory
fn collect_entries(dir: &Path) -> Vec<CacheEntry> {
    let mut entries = Vec::new();

    if !dir.exists() {
        return entries;
    }

    let read_dir = match fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) => {
            warn!("Failed to read cache directory {:?}: {}", dir, e);
            return entries;
        }
    };

    for entry in read_dir.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(_) => continue,
        };

        entries.push(CacheEntry {
            path,
            size: metadata.len(),
        });
    }

    entries
}

/// Stable cache file name for a remote URL
///
/// `<xxh3 of url>.<ext>`, where the extension is taken from the URL path and
/// defaults to `mp3`.
pub fn cache_file_name_for_url(url: &str) -> String {
    let ext = extract_extension_from_url(url).unwrap_or_else(|| "mp3".to_string());
    format!("{:016x}.{}", xxh3_64(url.as_bytes()), ext)
}

impl CacheLayout {
    /// Path a cached file would live at in the persistent area
    pub fn cached_path(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    /// Return the cached file if it has already been persisted
    pub fn lookup(&self, file_name: &str) -> Option<PathBuf> {
        let path = self.cached_path(file_name);
        path.is_file().then_some(path)
    }

    /// Path to stage a download in before promotion
    pub fn staging_path(&self, file_name: &str) -> PathBuf {
        self.temp_subdir
            .join(format!("temp_{}_{}", unix_now_secs(), file_name))
    }

    /// Move a completed staged download into the persistent area
    ///
    /// Falls back to copy + remove when a plain rename is not possible.
    pub fn promote(&self, staged: &Path, file_name: &str) -> Result<PathBuf, CacheError> {
        let target = self.cached_path(file_name);

        if fs::rename(staged, &target).is_err() {
            fs::copy(staged, &target).map_err(|source| CacheError::Io {
                path: target.clone(),
                source,
            })?;
            if let Err(e) = fs::remove_file(staged) {
                warn!("Failed to remove staged file {:?}: {}", staged, e);
            }
        }

        info!("Cached audio at {:?}", target);
        Ok(target)
    }

    /// Remove a staged file after a failed download
    pub fn discard(&self, staged: &Path) {
        if staged.exists() {
            match fs::remove_file(staged) {
                Ok(_) => debug!("Removed staged download {:?}", staged),
                Err(e) => warn!("Failed to remove staged download {:?}: {}", staged, e),
            }
        }
    }

    /// Calculate cache statistics
    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();

        for entry in collect_entries(&self.root) {
            stats.persisted_bytes += entry.size;
            stats.persisted_files += 1;
        }

        for entry in collect_entries(&self.temp_subdir) {
            stats.temp_bytes += entry.size;
            stats.temp_files += 1;
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_count(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .flatten()
            .filter(|e| e.path().is_file())
            .count()
    }

    #[test]
    fn test_ensure_layout_creates_directories() {
        let base = tempfile::tempdir().unwrap();
        let layout = ensure_layout(base.path()).unwrap();

        assert_eq!(layout.root, base.path().join("music"));
        assert_eq!(layout.temp_subdir, base.path().join("music").join("temp"));
        assert!(layout.root.is_dir());
        assert!(layout.temp_subdir.is_dir());

        // Idempotent
        assert_eq!(ensure_layout(base.path()).unwrap(), layout);
    }

    #[test]
    fn test_ensure_layout_rejects_file_in_the_way() {
        let base = tempfile::tempdir().unwrap();
        fs::write(base.path().join("music"), b"not a dir").unwrap();

        let err = ensure_layout(base.path()).unwrap_err();
        assert!(matches!(err, CacheInitError::NotADirectory(_)));
    }

    #[test]
    fn test_purge_temp_removes_files_and_keeps_directory() {
        let base = tempfile::tempdir().unwrap();
        let layout = ensure_layout(base.path()).unwrap();
        fs::write(layout.temp_subdir.join("a.mp3"), b"aaaa").unwrap();
        fs::write(layout.temp_subdir.join("b.mp3"), b"bb").unwrap();

        let result = purge_temp(&layout);

        assert_eq!(result.files_deleted, 2);
        assert_eq!(result.bytes_freed, 6);
        assert_eq!(result.errors, 0);
        assert_eq!(file_count(&layout.temp_subdir), 0);
        assert!(layout.temp_subdir.is_dir());
    }

    #[test]
    fn test_purge_temp_is_not_recursive_and_spares_persistent_area() {
        let base = tempfile::tempdir().unwrap();
        let layout = ensure_layout(base.path()).unwrap();
        let nested = layout.temp_subdir.join("nested");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("keep.mp3"), b"x").unwrap();
        fs::write(layout.root.join("song.mp3"), b"x").unwrap();

        let result = purge_temp(&layout);

        assert_eq!(result.files_deleted, 0);
        assert!(nested.join("keep.mp3").exists());
        assert!(layout.root.join("song.mp3").exists());
    }

    #[test]
    fn test_stage_and_promote() {
        let base = tempfile::tempdir().unwrap();
        let layout = ensure_layout(base.path()).unwrap();

        assert!(layout.lookup("42.mp3").is_none());

        let staged = layout.staging_path("42.mp3");
        assert!(staged.starts_with(&layout.temp_subdir));
        fs::write(&staged, b"audio").unwrap();

        let cached = layout.promote(&staged, "42.mp3").unwrap();
        assert_eq!(cached, layout.root.join("42.mp3"));
        assert!(!staged.exists());
        assert_eq!(layout.lookup("42.mp3"), Some(cached));

        let stats = layout.stats();
        assert_eq!(stats.persisted_files, 1);
        assert_eq!(stats.persisted_bytes, 5);
        assert_eq!(stats.temp_files, 0);
    }

    #[test]
    fn test_cache_file_name_for_url() {
        let a = cache_file_name_for_url("http://host/a.flac?sig=1");
        let b = cache_file_name_for_url("http://host/a.flac?sig=2");
        assert!(a.ends_with(".flac"));
        assert_ne!(a, b);
        assert_eq!(a, cache_file_name_for_url("http://host/a.flac?sig=1"));
        assert!(cache_file_name_for_url("http://host/play?id=1").ends_with(".mp3"));
    }
}
