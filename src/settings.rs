//! Engine settings persistence
//!
//! Handles loading and saving engine configuration as JSON. Every section
//! falls back to defaults when absent, so older or hand-written files keep
//! working.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::metadata::TagSupport;
use crate::utils::{config_dir, default_cache_root};

const SETTINGS_FILE: &str = "settings.json";

/// Engine settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Cache settings
    pub cache: CacheSettings,
    /// Remote catalog endpoints and request policy
    pub catalog: CatalogSettings,
    /// Tag reading
    pub metadata: MetadataSettings,
    /// Local library scanning
    pub library: LibrarySettings,
}

/// Cache-related settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Override for the cache root (platform cache dir when unset)
    pub root: Option<PathBuf>,
}

/// Remote catalog settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    pub search_url: String,
    pub play_url: String,
    pub lyric_url: String,
    pub user_agent: String,
    /// Timeout for search, play-url and lyrics requests
    pub request_timeout_secs: u64,
    /// Timeout for audio downloads
    pub download_timeout_secs: u64,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            search_url: "http://search.kuwo.cn/r.s".to_string(),
            play_url: "http://api.xiaodaokg.com/kuwo.php".to_string(),
            lyric_url: "http://m.kuwo.cn/newh5/singles/songinfoandlrc".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36"
                .to_string(),
            request_timeout_secs: 10,
            download_timeout_secs: 30,
        }
    }
}

/// Metadata settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataSettings {
    /// Read embedded tags from local files
    pub read_tags: bool,
}

impl Default for MetadataSettings {
    fn default() -> Self {
        Self { read_tags: true }
    }
}

impl MetadataSettings {
    pub fn tag_support(&self) -> TagSupport {
        if self.read_tags {
            TagSupport::Available
        } else {
            TagSupport::Unavailable
        }
    }
}

/// Local library settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibrarySettings {
    /// Directory scanned for local tracks
    pub music_dir: Option<PathBuf>,
    /// Maximum age of a cached index before it is rescanned
    pub max_index_age_secs: u64,
}

impl Default for LibrarySettings {
    fn default() -> Self {
        Self {
            music_dir: dirs::audio_dir(),
            max_index_age_secs: 300,
        }
    }
}

impl Settings {
    /// Get the default settings file path
    pub fn default_path() -> PathBuf {
        config_dir().join(SETTINGS_FILE)
    }

    /// Load settings from the default path
    pub fn load() -> Self {
        Self::load_from(&Self::default_path())
    }

    /// Load settings from a file, falling back to defaults
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(settings) => {
                    info!("Loaded settings from {:?}", path);
                    settings
                }
                Err(e) => {
                    warn!("Failed to parse settings {:?}: {}, using defaults", path, e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Save settings to the default path
    pub fn save(&self) -> std::io::Result<()> {
        self.save_to(&Self::default_path())
    }

    /// Save settings to a file
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved settings to {:?}", path);
        Ok(())
    }

    /// Effective cache root
    pub fn cache_root(&self) -> PathBuf {
        self.cache.root.clone().unwrap_or_else(default_cache_root)
    }
}
