//! Utility functions

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Valid audio extensions for URL parsing
const VALID_AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "m4a", "aac", "ogg", "wav"];

// ============================================================================
// Time Utilities
// ============================================================================

/// Format seconds as `MM:SS`
///
/// Non-positive (and non-finite) inputs render as `00:00`. Minutes are not
/// wrapped into hours, so a 75 minute track shows as `75:00`.
pub fn format_time(seconds: f64) -> String {
    if !seconds.is_finite() || seconds <= 0.0 {
        return "00:00".to_string();
    }

    let total = seconds as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}

/// Current wall clock as unix seconds
pub fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// ============================================================================
// Source & Path Utilities
// ============================================================================

/// Whether a source identifier names a remote resource rather than a path
///
/// Anything carrying an `http://` or `https://` scheme prefix is remote.
pub fn is_remote_source(source: &str) -> bool {
    let lower = source.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Extract audio file extension from URL path
///
/// Query strings and fragments are ignored; only known audio extensions
/// are returned.
pub fn extract_extension_from_url(url: &str) -> Option<String> {
    let url_parsed = reqwest::Url::parse(url).ok()?;
    let filename = url_parsed.path().rsplit('/').next()?;

    let (_, ext) = filename.rsplit_once('.')?;
    let ext = ext.to_lowercase();

    if VALID_AUDIO_EXTENSIONS.contains(&ext.as_str()) {
        Some(ext)
    } else {
        None
    }
}

/// Get the base cache directory for chime
///
/// `CHIME_CACHE_DIR` overrides the platform cache directory.
pub fn default_cache_root() -> PathBuf {
    if let Some(dir) = std::env::var_os("CHIME_CACHE_DIR") {
        return PathBuf::from(dir);
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("chime")
}

/// Get the configuration directory for chime
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("chime")
}
