//! Session handle for controlling playback from the UI
//!
//! Control methods queue a command and await the session's reply. State
//! queries (`snapshot`, `progress`) read `SharedSessionState` directly and
//! never wait behind an in-flight command.

use std::path::PathBuf;

use tokio::sync::oneshot;

use super::events::{Reply, SessionCommand, SessionCommandSender};
use super::state::{ControlResult, PlaybackSnapshot, SharedSessionState};

const SESSION_CLOSED: &str = "session closed";

/// Cloneable control surface of the playback session
#[derive(Clone)]
pub struct SessionHandle {
    command_tx: SessionCommandSender,
    state: SharedSessionState,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("state", &self.state)
            .field("closed", &self.command_tx.is_closed())
            .finish()
    }
}

impl SessionHandle {
    pub(crate) fn new(command_tx: SessionCommandSender, state: SharedSessionState) -> Self {
        Self { command_tx, state }
    }

    /// Send a command and wait for its result
    ///
    /// A session that has gone away answers with an error result.
    async fn request(
        &self,
        command: impl FnOnce(Reply<ControlResult>) -> SessionCommand,
    ) -> ControlResult {
        let (reply, reply_rx) = oneshot::channel();
        if self.command_tx.send(command(reply)).is_err() {
            return ControlResult::error(SESSION_CLOSED);
        }
        reply_rx
            .await
            .unwrap_or_else(|_| ControlResult::error(SESSION_CLOSED))
    }

    // ============ Playback Control ============

    /// Play a URL (or path) as-is, replacing the current track
    pub async fn play_url(&self, url: impl Into<String>) -> ControlResult {
        let url = url.into();
        self.request(|reply| SessionCommand::PlayUrl { url, reply })
            .await
    }

    /// Play a local file, labelled from its tags
    pub async fn play_local_file(&self, path: impl Into<PathBuf>) -> ControlResult {
        let path = path.into();
        self.request(|reply| SessionCommand::PlayLocalFile { path, reply })
            .await
    }

    /// Search the catalog and play the best match with its lyrics
    pub async fn search_and_play(&self, query: impl Into<String>) -> ControlResult {
        let query = query.into();
        self.request(|reply| SessionCommand::SearchAndPlay { query, reply })
            .await
    }

    /// Toggle pause, or replay the last track when stopped
    pub async fn pause_resume(&self) -> ControlResult {
        self.request(|reply| SessionCommand::PauseResume { reply })
            .await
    }

    pub async fn stop(&self) -> ControlResult {
        self.request(|reply| SessionCommand::Stop { reply }).await
    }

    /// Seek to `seconds`, clamped into the track
    pub async fn seek(&self, seconds: f64) -> ControlResult {
        self.request(|reply| SessionCommand::Seek { seconds, reply })
            .await
    }

    /// Lyrics of the current track as `[MM:SS] text` lines
    pub async fn lyrics(&self) -> ControlResult {
        self.request(|reply| SessionCommand::Lyrics { reply }).await
    }

    // ============ State Queries ============

    /// Snapshot after all previously queued commands and events are applied
    ///
    /// Falls back to the last published snapshot when the session is gone.
    pub async fn status(&self) -> PlaybackSnapshot {
        let (reply, reply_rx) = oneshot::channel();
        if self.command_tx.send(SessionCommand::Status { reply }).is_err() {
            return self.snapshot();
        }
        reply_rx.await.unwrap_or_else(|_| self.snapshot())
    }

    /// Last published snapshot, without queueing
    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.state.snapshot()
    }

    /// Progress of the current track in percent, one decimal
    pub fn progress(&self) -> f64 {
        self.state.progress_percent()
    }

    pub fn is_closed(&self) -> bool {
        self.command_tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::events::session_command_channel;
    use crate::playback::state::{ControlStatus, PlaybackPhase};

    #[tokio::test]
    async fn test_closed_session_yields_error_result() {
        let (tx, rx) = session_command_channel();
        drop(rx);
        let handle = SessionHandle::new(tx, SharedSessionState::new());

        assert!(handle.is_closed());
        let result = handle.stop().await;
        assert_eq!(result.status, ControlStatus::Error);
        assert_eq!(result.message, SESSION_CLOSED);
        assert_eq!(handle.status().await.phase, PlaybackPhase::Idle);
    }

    #[tokio::test]
    async fn test_dropped_reply_yields_error_result() {
        let (tx, mut rx) = session_command_channel();
        let handle = SessionHandle::new(tx, SharedSessionState::new());

        // Receive the command and drop it without answering
        tokio::spawn(async move {
            let _ = rx.recv().await;
        });

        let result = handle.seek(10.0).await;
        assert_eq!(result, ControlResult::error(SESSION_CLOSED));
    }
}
