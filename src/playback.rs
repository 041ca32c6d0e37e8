//! Playback session module
//!
//! - `PlaybackSession`: the playback state machine, run as a single task
//! - `SessionHandle`: cloneable control surface returning `ControlResult`s
//! - `MediaBackend`: contract for the engine that actually renders audio
//! - `RodioBackend`: rodio implementation for local files
//! - `events`: command and backend event channels

mod backend;
pub mod events;
mod handle;
mod player;
mod session;
mod state;

pub use backend::{BackendError, MediaBackend};
pub use events::{
    BackendEvent, BackendEventKind, BackendEventReceiver, BackendEventSender, BackendState,
    MediaStatus, backend_event_channel,
};
pub use handle::SessionHandle;
pub use player::RodioBackend;
pub use session::{PlaybackError, PlaybackSession, spawn_session};
pub use state::{
    ControlResult, ControlStatus, PlaybackPhase, PlaybackSnapshot, PlaybackState,
    SharedSessionState,
};
