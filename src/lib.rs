//! Chime - a networked music playback engine
//!
//! Plays local files and tracks from a remote catalog through a single
//! playback session, caching downloads on disk and attaching timed lyrics.

pub mod cache;
pub mod catalog;
pub mod library;
pub mod lyrics;
pub mod metadata;
pub mod notifier;
pub mod playback;
pub mod settings;
pub mod utils;
