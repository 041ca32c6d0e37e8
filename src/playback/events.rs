//! Session communication types
//!
//! - `SessionCommand` - control requests sent from a `SessionHandle` to the session task
//! - `BackendEvent` - notifications emitted by a media backend
//!
//! ## Architecture
//! ```text
//! UI (SessionHandle) --[SessionCommand + oneshot reply]--> Session task
//! Media backend      --[BackendEvent]------------------->  Session task
//! UI                 <--[SharedSessionState]------------   Session task (non-blocking reads)
//! ```

use std::path::PathBuf;

use tokio::sync::{mpsc, oneshot};

use super::state::{ControlResult, PlaybackSnapshot};

// ============ Commands (UI -> Session) ============

/// Reply channel carried by every command
pub type Reply<T> = oneshot::Sender<T>;

/// Control requests processed one at a time by the session task
pub enum SessionCommand {
    PlayUrl {
        url: String,
        reply: Reply<ControlResult>,
    },
    PlayLocalFile {
        path: PathBuf,
        reply: Reply<ControlResult>,
    },
    SearchAndPlay {
        query: String,
        reply: Reply<ControlResult>,
    },
    PauseResume {
        reply: Reply<ControlResult>,
    },
    Stop {
        reply: Reply<ControlResult>,
    },
    Seek {
        seconds: f64,
        reply: Reply<ControlResult>,
    },
    Lyrics {
        reply: Reply<ControlResult>,
    },
    /// Snapshot taken after everything queued before it was applied
    Status {
        reply: Reply<PlaybackSnapshot>,
    },
}

impl std::fmt::Debug for SessionCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PlayUrl { url, .. } => f.debug_struct("PlayUrl").field("url", url).finish(),
            Self::PlayLocalFile { path, .. } => {
                f.debug_struct("PlayLocalFile").field("path", path).finish()
            }
            Self::SearchAndPlay { query, .. } => f
                .debug_struct("SearchAndPlay")
                .field("query", query)
                .finish(),
            Self::PauseResume { .. } => write!(f, "PauseResume"),
            Self::Stop { .. } => write!(f, "Stop"),
            Self::Seek { seconds, .. } => f.debug_struct("Seek").field("seconds", seconds).finish(),
            Self::Lyrics { .. } => write!(f, "Lyrics"),
            Self::Status { .. } => write!(f, "Status"),
        }
    }
}

// ============ Events (Backend -> Session) ============

/// Transport state reported by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendState {
    Playing,
    Paused,
    Stopped,
}

/// Media status reported by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaStatus {
    Loading,
    Loaded,
    Buffering,
    EndOfMedia,
    Invalid,
}

/// What happened inside the backend
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEventKind {
    PositionChanged { position_ms: u64 },
    DurationChanged { duration_ms: u64 },
    StateChanged(BackendState),
    MediaStatusChanged(MediaStatus),
    Error { message: String },
}

/// Event tagged with the source it belongs to
///
/// The session drops events whose source is not the one currently loaded,
/// so late notifications from a replaced track never leak into new state.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendEvent {
    pub source: String,
    pub kind: BackendEventKind,
}

impl BackendEvent {
    pub fn new(source: impl Into<String>, kind: BackendEventKind) -> Self {
        Self {
            source: source.into(),
            kind,
        }
    }

    pub fn position(source: impl Into<String>, position_ms: u64) -> Self {
        Self::new(source, BackendEventKind::PositionChanged { position_ms })
    }

    pub fn duration(source: impl Into<String>, duration_ms: u64) -> Self {
        Self::new(source, BackendEventKind::DurationChanged { duration_ms })
    }

    pub fn state(source: impl Into<String>, state: BackendState) -> Self {
        Self::new(source, BackendEventKind::StateChanged(state))
    }

    pub fn status(source: impl Into<String>, status: MediaStatus) -> Self {
        Self::new(source, BackendEventKind::MediaStatusChanged(status))
    }

    pub fn error(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            source,
            BackendEventKind::Error {
                message: message.into(),
            },
        )
    }
}

// ============ Channel Types ============

/// Sender for session commands (held by SessionHandle)
pub type SessionCommandSender = mpsc::UnboundedSender<SessionCommand>;

/// Receiver for session commands (held by the session task)
pub type SessionCommandReceiver = mpsc::UnboundedReceiver<SessionCommand>;

/// Sender for backend events (held by the backend)
pub type BackendEventSender = mpsc::UnboundedSender<BackendEvent>;

/// Receiver for backend events (held by the session task)
pub type BackendEventReceiver = mpsc::UnboundedReceiver<BackendEvent>;

/// Create a new session command channel
pub fn session_command_channel() -> (SessionCommandSender, SessionCommandReceiver) {
    mpsc::unbounded_channel()
}

/// Create a new backend event channel
pub fn backend_event_channel() -> (BackendEventSender, BackendEventReceiver) {
    mpsc::unbounded_channel()
}
