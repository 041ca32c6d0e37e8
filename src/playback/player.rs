//! Rodio media backend
//!
//! The rodio output stream cannot leave the thread that opened it, so it
//! lives on a dedicated `audio-player` thread together with the sink.
//! `RodioBackend` forwards each command there and waits for the
//! acknowledgement. Between commands the thread polls the sink to report
//! position and end of media.
//!
//! Only local files are supported; remote URLs must be cached first.

use std::fs::File;
use std::io::BufReader;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink, Source};
use tracing::{debug, info, warn};

use super::backend::{BackendError, MediaBackend};
use super::events::{BackendEvent, BackendEventKind, BackendEventSender, BackendState, MediaStatus};
use crate::utils::is_remote_source;

/// How often the sink is polled for position and completion
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// How long a command may take before the thread is considered hung
const ACK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
enum PlayerOp {
    Load(String),
    Play,
    Pause,
    Stop,
    Seek(Duration),
}

struct PlayerCommand {
    op: PlayerOp,
    reply: mpsc::Sender<Result<(), BackendError>>,
}

/// `MediaBackend` backed by rodio on the default output device
pub struct RodioBackend {
    command_tx: Option<mpsc::Sender<PlayerCommand>>,
    thread_handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for RodioBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RodioBackend")
            .field("running", &self.command_tx.is_some())
            .finish()
    }
}

impl RodioBackend {
    /// Open the default output device on a new audio thread
    ///
    /// Events for loaded tracks are sent on `events`.
    pub fn spawn(events: BackendEventSender) -> Result<Self, BackendError> {
        let (command_tx, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        let thread_handle = thread::Builder::new()
            .name("audio-player".to_string())
            .spawn(move || {
                let stream = match OutputStreamBuilder::open_default_stream() {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(BackendError::Unavailable(format!(
                            "failed to open audio output: {}",
                            e
                        ))));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                AudioThread::new(stream, events).run(command_rx);
            })
            .map_err(|e| {
                BackendError::Unavailable(format!("failed to spawn audio thread: {}", e))
            })?;

        match ready_rx.recv_timeout(ACK_TIMEOUT) {
            Ok(Ok(())) => Ok(Self {
                command_tx: Some(command_tx),
                thread_handle: Some(thread_handle),
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(BackendError::Unavailable(
                "audio thread did not start".to_string(),
            )),
        }
    }

    fn send(&self, op: PlayerOp) -> Result<(), BackendError> {
        let command_tx = self
            .command_tx
            .as_ref()
            .ok_or_else(|| BackendError::Unavailable("audio thread stopped".to_string()))?;

        let (reply, reply_rx) = mpsc::channel();
        command_tx
            .send(PlayerCommand { op, reply })
            .map_err(|_| BackendError::Unavailable("audio thread exited".to_string()))?;

        reply_rx
            .recv_timeout(ACK_TIMEOUT)
            .map_err(|_| BackendError::Unavailable("audio thread did not respond".to_string()))?
    }
}

impl MediaBackend for RodioBackend {
    fn load(&mut self, source: &str) -> Result<(), BackendError> {
        if is_remote_source(source) {
            return Err(BackendError::Unsupported(source.to_string()));
        }
        self.send(PlayerOp::Load(source.to_string()))
    }

    fn play(&mut self) -> Result<(), BackendError> {
        self.send(PlayerOp::Play)
    }

    fn pause(&mut self) -> Result<(), BackendError> {
        self.send(PlayerOp::Pause)
    }

    fn stop(&mut self) -> Result<(), BackendError> {
        self.send(PlayerOp::Stop)
    }

    fn set_position(&mut self, position_ms: u64) -> Result<(), BackendError> {
        self.send(PlayerOp::Seek(Duration::from_millis(position_ms)))
    }

    fn supports_remote(&self) -> bool {
        false
    }
}

impl Drop for RodioBackend {
    fn drop(&mut self) {
        // Closing the channel ends the thread's loop
        self.command_tx.take();
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                warn!("Audio thread panicked");
            }
        }
    }
}

// ============ Audio thread ============

struct LoadedTrack {
    source: String,
    sink: Sink,
    finished: bool,
}

struct AudioThread {
    stream: OutputStream,
    events: BackendEventSender,
    current: Option<LoadedTrack>,
}

fn emit(events: &BackendEventSender, source: &str, kind: BackendEventKind) {
    if events.send(BackendEvent::new(source, kind)).is_err() {
        debug!("Backend event receiver is gone");
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl AudioThread {
    fn new(stream: OutputStream, events: BackendEventSender) -> Self {
        Self {
            stream,
            events,
            current: None,
        }
    }

    fn run(mut self, commands: mpsc::Receiver<PlayerCommand>) {
        info!("Audio thread started");

        loop {
            match commands.recv_timeout(POLL_INTERVAL) {
                Ok(PlayerCommand { op, reply }) => {
                    debug!("Audio command: {:?}", op);
                    let result = self.apply(op);
                    let _ = reply.send(result);
                }
                Err(RecvTimeoutError::Timeout) => self.poll(),
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        if let Some(track) = self.current.take() {
            track.sink.stop();
        }
        info!("Audio thread stopped");
    }

    fn apply(&mut self, op: PlayerOp) -> Result<(), BackendError> {
        if let PlayerOp::Load(source) = op {
            return self.load(source);
        }

        let track = self.current.as_mut().ok_or(BackendError::NothingLoaded)?;
        match op {
            PlayerOp::Play => {
                track.sink.play();
                emit(
                    &self.events,
                    &track.source,
                    BackendEventKind::StateChanged(BackendState::Playing),
                );
            }
            PlayerOp::Pause => {
                track.sink.pause();
                emit(
                    &self.events,
                    &track.source,
                    BackendEventKind::PositionChanged {
                        position_ms: millis(track.sink.get_pos()),
                    },
                );
                emit(
                    &self.events,
                    &track.source,
                    BackendEventKind::StateChanged(BackendState::Paused),
                );
            }
            PlayerOp::Stop => {
                track.sink.stop();
                emit(
                    &self.events,
                    &track.source,
                    BackendEventKind::StateChanged(BackendState::Stopped),
                );
                self.current = None;
            }
            PlayerOp::Seek(position) => {
                track
                    .sink
                    .try_seek(position)
                    .map_err(|e| BackendError::Command(format!("seek failed: {:?}", e)))?;
                emit(
                    &self.events,
                    &track.source,
                    BackendEventKind::PositionChanged {
                        position_ms: millis(position),
                    },
                );
            }
            PlayerOp::Load(_) => {}
        }
        Ok(())
    }

    /// Decode `source` into a fresh, paused sink
    fn load(&mut self, source: String) -> Result<(), BackendError> {
        if let Some(old) = self.current.take() {
            old.sink.stop();
        }

        let load_error = |message: String| BackendError::Load {
            source_id: source.clone(),
            message,
        };

        emit(&self.events, &source, BackendEventKind::MediaStatusChanged(MediaStatus::Loading));

        let file = File::open(&source)
            .map_err(|e| load_error(format!("failed to open file: {}", e)))?;
        let decoder = Decoder::new(BufReader::new(file))
            .map_err(|e| load_error(format!("failed to decode audio: {}", e)))?;
        let duration = decoder.total_duration();

        let sink = Sink::connect_new(self.stream.mixer());
        sink.pause();
        sink.append(decoder);

        if let Some(duration) = duration {
            emit(
                &self.events,
                &source,
                BackendEventKind::DurationChanged {
                    duration_ms: millis(duration),
                },
            );
        }
        emit(&self.events, &source, BackendEventKind::MediaStatusChanged(MediaStatus::Loaded));
        info!("Loaded {}, duration: {:?}", source, duration);

        self.current = Some(LoadedTrack {
            source,
            sink,
            finished: false,
        });
        Ok(())
    }

    /// Report position while playing and detect the end of the track
    fn poll(&mut self) {
        let Some(track) = self.current.as_mut() else {
            return;
        };
        if track.finished || track.sink.is_paused() {
            return;
        }

        emit(
            &self.events,
            &track.source,
            BackendEventKind::PositionChanged {
                position_ms: millis(track.sink.get_pos()),
            },
        );

        if track.sink.empty() {
            track.finished = true;
            info!("Reached end of {}", track.source);
            emit(
                &self.events,
                &track.source,
                BackendEventKind::MediaStatusChanged(MediaStatus::EndOfMedia),
            );
            emit(
                &self.events,
                &track.source,
                BackendEventKind::StateChanged(BackendState::Stopped),
            );
        }
    }
}
