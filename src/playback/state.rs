//! Playback state, snapshots and control results
//!
//! `PlaybackState` is owned and mutated by the session task only. After every
//! change the task publishes a `PlaybackSnapshot` into `SharedSessionState`,
//! which the UI reads without going through the command queue.

use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;
use serde::Serialize;

use crate::lyrics::{self, LyricLine};
use crate::utils::format_time;

/// Session phase
///
/// `Idle` only exists before the first successful play command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackPhase {
    #[default]
    Idle,
    Playing,
    Paused,
    Stopped,
}

impl PlaybackPhase {
    /// Whether a track is attached to the backend (playing or paused)
    pub fn is_active(self) -> bool {
        matches!(self, Self::Playing | Self::Paused)
    }
}

/// Mutable session state
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    pub phase: PlaybackPhase,
    /// Display label, unset for bare URL playback
    pub current_track_label: Option<String>,
    /// URL or local path of the current track
    pub current_source: Option<String>,
    pub total_duration_seconds: f64,
    pub current_position_seconds: f64,
    /// Wall clock of the last successful play command
    pub session_started_at: Option<SystemTime>,
    pub lyrics: Vec<LyricLine>,
    /// Index into `lyrics`, `-1` when there is none
    pub current_lyric_index: i32,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            phase: PlaybackPhase::Idle,
            current_track_label: None,
            current_source: None,
            total_duration_seconds: 0.0,
            current_position_seconds: 0.0,
            session_started_at: None,
            lyrics: Vec::new(),
            current_lyric_index: -1,
        }
    }
}

impl PlaybackState {
    /// Fresh state for a newly started track
    pub fn started(
        source: String,
        label: Option<String>,
        lyrics: Vec<LyricLine>,
        duration_seconds: Option<f64>,
    ) -> Self {
        let current_lyric_index = lyrics::current_index(&lyrics, 0.0);
        Self {
            phase: PlaybackPhase::Playing,
            current_track_label: label,
            current_source: Some(source),
            total_duration_seconds: duration_seconds.unwrap_or(0.0),
            current_position_seconds: 0.0,
            session_started_at: Some(SystemTime::now()),
            lyrics,
            current_lyric_index,
        }
    }

    /// Label for messages, falling back to the source identifier
    pub fn display_label(&self) -> String {
        self.current_track_label
            .clone()
            .or_else(|| self.current_source.clone())
            .unwrap_or_default()
    }

    /// Clamp a target position into `[0, total]`
    ///
    /// Only the lower bound applies while the duration is still unknown.
    pub fn clamp_position(&self, seconds: f64) -> f64 {
        let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
        if self.total_duration_seconds > 0.0 {
            seconds.min(self.total_duration_seconds)
        } else {
            seconds
        }
    }

    /// Move the position and recompute the lyric cursor
    pub fn set_position(&mut self, seconds: f64) {
        self.current_position_seconds = self.clamp_position(seconds);
        self.current_lyric_index =
            lyrics::current_index(&self.lyrics, self.current_position_seconds);
    }

    pub fn set_duration(&mut self, seconds: f64) {
        self.total_duration_seconds = seconds.max(0.0);
        if self.total_duration_seconds > 0.0
            && self.current_position_seconds > self.total_duration_seconds
        {
            self.set_position(self.total_duration_seconds);
        }
    }

    /// `round(position * 100 / total, 1)`, zero while the duration is unknown
    pub fn progress_percent(&self) -> f64 {
        if self.total_duration_seconds <= 0.0 {
            return 0.0;
        }
        let percent = self.current_position_seconds * 100.0 / self.total_duration_seconds;
        (percent * 10.0).round() / 10.0
    }

    /// `MM:SS/MM:SS`
    pub fn position_text(&self) -> String {
        format!(
            "{}/{}",
            format_time(self.current_position_seconds),
            format_time(self.total_duration_seconds)
        )
    }
}

/// Read-only copy of the session state for the UI
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackSnapshot {
    pub phase: PlaybackPhase,
    pub track_label: Option<String>,
    pub source: Option<String>,
    pub total_duration_seconds: f64,
    pub position_seconds: f64,
    pub progress_percent: f64,
    pub started_at: Option<SystemTime>,
    pub lyrics: Vec<LyricLine>,
    pub current_lyric_index: i32,
}

impl PlaybackSnapshot {
    /// The lyric line under the cursor, if any
    pub fn current_lyric(&self) -> Option<&LyricLine> {
        usize::try_from(self.current_lyric_index)
            .ok()
            .and_then(|i| self.lyrics.get(i))
    }
}

impl From<&PlaybackState> for PlaybackSnapshot {
    fn from(state: &PlaybackState) -> Self {
        Self {
            phase: state.phase,
            track_label: state.current_track_label.clone(),
            source: state.current_source.clone(),
            total_duration_seconds: state.total_duration_seconds,
            position_seconds: state.current_position_seconds,
            progress_percent: state.progress_percent(),
            started_at: state.session_started_at,
            lyrics: state.lyrics.clone(),
            current_lyric_index: state.current_lyric_index,
        }
    }
}

impl Default for PlaybackSnapshot {
    fn default() -> Self {
        Self::from(&PlaybackState::default())
    }
}

/// Thread-safe published snapshot
///
/// The session task writes after each mutation; readers never block it for
/// longer than a clone.
#[derive(Clone, Default)]
pub struct SharedSessionState {
    inner: Arc<RwLock<PlaybackSnapshot>>,
}

impl std::fmt::Debug for SharedSessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("SharedSessionState")
            .field("phase", &inner.phase)
            .field("position", &inner.position_seconds)
            .field("duration", &inner.total_duration_seconds)
            .finish()
    }
}

impl SharedSessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.inner.read().clone()
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.inner.read().phase
    }

    pub fn progress_percent(&self) -> f64 {
        self.inner.read().progress_percent
    }

    pub(crate) fn publish(&self, state: &PlaybackState) {
        *self.inner.write() = PlaybackSnapshot::from(state);
    }
}

// ============ Control results ============

/// Outcome category of a control call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlStatus {
    Success,
    Error,
    Info,
}

/// Result returned by every public control method
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlResult {
    pub status: ControlStatus,
    pub message: String,
    /// Extra payload lines (formatted lyrics)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub lines: Vec<String>,
}

impl ControlResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self::with_status(ControlStatus::Success, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::with_status(ControlStatus::Error, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::with_status(ControlStatus::Info, message)
    }

    fn with_status(status: ControlStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            lines: Vec::new(),
        }
    }

    pub fn with_lines(mut self, lines: Vec<String>) -> Self {
        self.lines = lines;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ControlStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_lyrics() -> PlaybackState {
        PlaybackState::started(
            "http://host/a.mp3".to_string(),
            None,
            vec![
                LyricLine::new(0.0, "one"),
                LyricLine::new(10.0, "two"),
                LyricLine::new(20.0, "three"),
            ],
            Some(30.0),
        )
    }

    #[test]
    fn test_started_resets_cursor() {
        let state = with_lyrics();
        assert_eq!(state.phase, PlaybackPhase::Playing);
        assert_eq!(state.current_lyric_index, 0);
        assert_eq!(state.display_label(), "http://host/a.mp3");

        let empty = PlaybackState::started("/a.mp3".to_string(), None, Vec::new(), None);
        assert_eq!(empty.current_lyric_index, -1);
    }

    #[test]
    fn test_position_updates_lyric_index() {
        let mut state = with_lyrics();
        state.set_position(9.6);
        assert_eq!(state.current_lyric_index, 0);
        state.set_position(10.6);
        assert_eq!(state.current_lyric_index, 1);
        state.set_position(15.0);
        assert_eq!(state.current_lyric_index, 1);
        state.set_position(25.0);
        assert_eq!(state.current_lyric_index, 2);
    }

    #[test]
    fn test_clamp_and_progress() {
        let mut state = with_lyrics();
        state.set_position(-3.0);
        assert_eq!(state.current_position_seconds, 0.0);
        state.set_position(99.0);
        assert_eq!(state.current_position_seconds, 30.0);
        assert_eq!(state.progress_percent(), 100.0);

        state.set_position(10.0);
        assert_eq!(state.progress_percent(), 33.3);
        assert_eq!(state.position_text(), "00:10/00:30");
    }

    #[test]
    fn test_unknown_duration_only_clamps_below() {
        let state = PlaybackState::default();
        assert_eq!(state.clamp_position(42.0), 42.0);
        assert_eq!(state.clamp_position(-1.0), 0.0);
        assert_eq!(state.progress_percent(), 0.0);
    }

    #[test]
    fn test_shared_state_publishes_snapshot() {
        let shared = SharedSessionState::new();
        assert_eq!(shared.phase(), PlaybackPhase::Idle);

        let mut state = with_lyrics();
        state.set_position(15.0);
        shared.publish(&state);

        let snap = shared.snapshot();
        assert_eq!(snap.phase, PlaybackPhase::Playing);
        assert_eq!(snap.progress_percent, 50.0);
        assert_eq!(snap.current_lyric().map(|l| l.text.as_str()), Some("two"));
    }
}
