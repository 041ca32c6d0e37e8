//! Media backend contract
//!
//! A backend accepts commands synchronously and reports everything else
//! (position, duration, transport state, end of media, errors) as
//! `BackendEvent`s tagged with the source they belong to.

use thiserror::Error;

/// Command rejected by a backend
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("audio backend unavailable: {0}")]
    Unavailable(String),
    #[error("cannot load {source_id}: {message}")]
    Load { source_id: String, message: String },
    #[error("unsupported source: {0}")]
    Unsupported(String),
    #[error("no media loaded")]
    NothingLoaded,
    #[error("{0}")]
    Command(String),
}

/// Playback engine driven by the session
pub trait MediaBackend: Send {
    /// Load a source (URL or local path) without starting it
    fn load(&mut self, source: &str) -> Result<(), BackendError>;

    fn play(&mut self) -> Result<(), BackendError>;

    fn pause(&mut self) -> Result<(), BackendError>;

    fn stop(&mut self) -> Result<(), BackendError>;

    fn set_position(&mut self, position_ms: u64) -> Result<(), BackendError>;

    /// Whether `load` accepts `http(s)://` URLs directly
    fn supports_remote(&self) -> bool;
}
