//! Playback session task
//!
//! One `PlaybackSession` exists per process. `spawn_session` moves it onto a
//! tokio task that owns all playback state and drains two channels: control
//! commands from `SessionHandle`s and events from the media backend. Because
//! a single task applies both, every mutation is serialized.
//!
//! State is only committed once the backend has accepted a command.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, error, info, warn};

use super::backend::{BackendError, MediaBackend};
use super::events::{
    BackendEvent, BackendEventKind, BackendEventReceiver, BackendState, MediaStatus, Reply,
    SessionCommand, SessionCommandReceiver, session_command_channel,
};
use super::handle::SessionHandle;
use super::state::{
    ControlResult, PlaybackPhase, PlaybackSnapshot, PlaybackState, SharedSessionState,
};
use crate::cache::{CacheError, CacheLayout, cache_file_name_for_url};
use crate::catalog::{CatalogClient, RemoteServiceError};
use crate::lyrics::LyricLine;
use crate::metadata::{MetadataExtractor, TrackMetadata};
use crate::notifier::Notifier;
use crate::utils::{format_time, is_remote_source};

/// Why a control command failed
///
/// Never escapes the session: each variant is rendered into an error
/// `ControlResult`.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("文件不存在: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("播放失败: {0}")]
    Backend(#[from] BackendError),
    #[error("在线服务请求失败: {0}")]
    Remote(#[from] RemoteServiceError),
    #[error("缓存写入失败: {0}")]
    Cache(#[from] CacheError),
    #[error("未找到歌曲: {0}")]
    NotFound(String),
    #[error("在线服务不可用")]
    CatalogUnavailable,
    #[error("没有正在播放的歌曲")]
    NothingPlaying,
}

/// Playback state machine and its collaborators
pub struct PlaybackSession {
    backend: Box<dyn MediaBackend>,
    catalog: Option<CatalogClient>,
    cache: Option<CacheLayout>,
    extractor: MetadataExtractor,
    notifier: Option<Arc<dyn Notifier>>,
    state: PlaybackState,
    /// Source string handed to the backend; events for anything else are stale
    loaded_source: Option<String>,
    /// Cache file name of the current remote track, reused on replay
    cache_file_name: Option<String>,
    /// Last lyric line pushed to the notifier for the current track
    shown_lyric_index: i32,
    shared: SharedSessionState,
}

impl PlaybackSession {
    pub fn new(backend: Box<dyn MediaBackend>) -> Self {
        Self {
            backend,
            catalog: None,
            cache: None,
            extractor: MetadataExtractor::default(),
            notifier: None,
            state: PlaybackState::default(),
            loaded_source: None,
            cache_file_name: None,
            shown_lyric_index: -1,
            shared: SharedSessionState::new(),
        }
    }

    pub fn with_catalog(mut self, catalog: CatalogClient) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Route remote tracks through this cache when the backend cannot stream
    pub fn with_cache(mut self, cache: CacheLayout) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_extractor(mut self, extractor: MetadataExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    // ============ Task loop ============

    async fn run(
        mut self,
        mut commands: SessionCommandReceiver,
        mut events: BackendEventReceiver,
    ) {
        info!("Playback session started");
        self.publish();

        loop {
            tokio::select! {
                // Backend events queued before a command are applied first
                biased;
                Some(event) = events.recv() => self.handle_backend_event(event),
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
            }
        }

        if self.state.phase.is_active() {
            if let Err(e) = self.backend_call(|b| b.stop()) {
                warn!("Failed to stop backend on shutdown: {}", e);
            }
        }
        info!("Playback session ended");
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        debug!("Session command: {:?}", command);

        let (reply, result) = match command {
            SessionCommand::Status { reply } => {
                let _ = reply.send(PlaybackSnapshot::from(&self.state));
                return;
            }
            SessionCommand::PlayUrl { url, reply } => (reply, self.play_url(&url).await),
            SessionCommand::PlayLocalFile { path, reply } => {
                (reply, self.play_local_file(&path).await)
            }
            SessionCommand::SearchAndPlay { query, reply } => {
                (reply, self.search_and_play(&query).await)
            }
            SessionCommand::PauseResume { reply } => (reply, self.pause_resume().await),
            SessionCommand::Stop { reply } => (reply, self.stop()),
            SessionCommand::Seek { seconds, reply } => (reply, self.seek(seconds)),
            SessionCommand::Lyrics { reply } => (reply, Ok(self.lyrics())),
        };

        self.publish();
        respond(reply, result);
    }

    // ============ Control operations ============

    async fn play_url(&mut self, url: &str) -> Result<ControlResult, PlaybackError> {
        self.start_remote(url, None, Vec::new(), None, None).await?;

        let message = format!("开始播放: {}", url);
        self.notify(&message);
        Ok(ControlResult::success(message))
    }

    async fn play_local_file(&mut self, path: &Path) -> Result<ControlResult, PlaybackError> {
        if !path.exists() {
            return Err(PlaybackError::FileNotFound(path.to_path_buf()));
        }

        let metadata = read_metadata(self.extractor, path).await;
        let label = metadata.label();

        self.detach();
        let source = path.to_string_lossy().into_owned();
        self.start(
            source.clone(),
            source,
            Some(label.clone()),
            Vec::new(),
            metadata.duration_seconds,
        )?;
        self.cache_file_name = None;

        let message = format!("正在播放本地音乐: {}", label);
        self.notify(&message);
        Ok(ControlResult::success(message))
    }

    async fn search_and_play(&mut self, query: &str) -> Result<ControlResult, PlaybackError> {
        let catalog = self
            .catalog
            .clone()
            .ok_or(PlaybackError::CatalogUnavailable)?;

        let hit = catalog
            .search(query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| PlaybackError::NotFound(query.to_string()))?;
        info!("Best match for {:?}: {} ({})", query, hit.display_name(), hit.song_id);

        let url = catalog.resolve_play_url(&hit.song_id).await?;
        let lyrics = match catalog.fetch_lyrics(&hit.song_id).await {
            Ok(lines) => lines,
            Err(e) => {
                warn!("Playing {} without lyrics: {}", hit.song_id, e);
                Vec::new()
            }
        };

        let label = hit.display_name();
        let cache_name = format!("{}.mp3", hit.song_id);
        self.start_remote(
            &url,
            Some(label.clone()),
            lyrics,
            hit.duration_seconds,
            Some(cache_name),
        )
        .await?;

        let message = format!("开始播放: {}", label);
        self.notify(&message);
        Ok(ControlResult::success(message))
    }

    async fn pause_resume(&mut self) -> Result<ControlResult, PlaybackError> {
        match self.state.phase {
            PlaybackPhase::Paused => {
                self.backend_call(|b| b.play())?;
                self.state.phase = PlaybackPhase::Playing;

                let message = format!("继续播放: {}", self.state.display_label());
                self.notify(&message);
                Ok(ControlResult::success(message))
            }
            PlaybackPhase::Playing => {
                self.backend_call(|b| b.pause())?;
                self.state.phase = PlaybackPhase::Paused;

                let message = format!(
                    "已暂停: {} [{}]",
                    self.state.display_label(),
                    self.state.position_text()
                );
                self.notify(&message);
                Ok(ControlResult::success(message))
            }
            PlaybackPhase::Idle | PlaybackPhase::Stopped => {
                match self.state.current_source.clone() {
                    Some(source) => self.replay(source).await,
                    None => Ok(ControlResult::info("没有可播放的歌曲")),
                }
            }
        }
    }

    /// Start the remembered track again, keeping its label and lyrics
    async fn replay(&mut self, source: String) -> Result<ControlResult, PlaybackError> {
        info!("Replaying {}", source);

        if !is_remote_source(&source) {
            return self.play_local_file(Path::new(&source)).await;
        }

        let label = self.state.current_track_label.clone();
        let lyrics = self.state.lyrics.clone();
        let duration = Some(self.state.total_duration_seconds).filter(|d| *d > 0.0);
        let cache_name = self.cache_file_name.clone();
        self.start_remote(&source, label, lyrics, duration, cache_name).await?;

        let message = format!("开始播放: {}", self.state.display_label());
        self.notify(&message);
        Ok(ControlResult::success(message))
    }

    fn stop(&mut self) -> Result<ControlResult, PlaybackError> {
        if !self.state.phase.is_active() {
            return Ok(ControlResult::info("没有正在播放的歌曲"));
        }

        self.backend_call(|b| b.stop())?;
        self.loaded_source = None;
        self.state.phase = PlaybackPhase::Stopped;
        self.state.set_position(0.0);

        let message = format!("已停止: {}", self.state.display_label());
        info!("{}", message);
        self.notify(&message);
        Ok(ControlResult::success(message))
    }

    fn seek(&mut self, seconds: f64) -> Result<ControlResult, PlaybackError> {
        if !self.state.phase.is_active() {
            return Err(PlaybackError::NothingPlaying);
        }

        let target = self.state.clamp_position(seconds);
        let position_ms = (target * 1000.0).round() as u64;
        self.backend_call(|b| b.set_position(position_ms))?;
        self.state.set_position(target);

        let message = format!("已跳转到: {}", self.state.position_text());
        self.notify(&message);
        Ok(ControlResult::success(message))
    }

    fn lyrics(&self) -> ControlResult {
        if self.state.lyrics.is_empty() {
            return ControlResult::info("当前歌曲没有歌词");
        }

        let lines = self.state.lyrics.iter().map(LyricLine::display).collect();
        ControlResult::success(format!("获取到 {} 行歌词", self.state.lyrics.len()))
            .with_lines(lines)
    }

    // ============ Track lifecycle ============

    /// Stop whatever the backend is currently playing
    fn detach(&mut self) {
        if self.state.phase.is_active() {
            if let Err(e) = self.backend_call(|b| b.stop()) {
                warn!("Failed to stop current track: {}", e);
            }
            self.state.phase = PlaybackPhase::Stopped;
            self.state.set_position(0.0);
        }
        self.loaded_source = None;
    }

    /// Load and play `playable`, then commit fresh state for `source`
    fn start(
        &mut self,
        source: String,
        playable: String,
        label: Option<String>,
        lyrics: Vec<LyricLine>,
        duration_seconds: Option<f64>,
    ) -> Result<(), PlaybackError> {
        self.backend_call(|b| -> Result<(), BackendError> {
            b.load(&playable)?;
            b.play()
        })?;

        info!("Playing {} (loaded as {})", source, playable);
        self.loaded_source = Some(playable);
        self.shown_lyric_index = -1;
        self.state = PlaybackState::started(source, label, lyrics, duration_seconds);
        Ok(())
    }

    async fn start_remote(
        &mut self,
        url: &str,
        label: Option<String>,
        lyrics: Vec<LyricLine>,
        duration_seconds: Option<f64>,
        cache_file_name: Option<String>,
    ) -> Result<(), PlaybackError> {
        self.detach();
        let playable = self.playable_source(url, cache_file_name.as_deref()).await?;
        self.start(url.to_string(), playable, label, lyrics, duration_seconds)?;
        self.cache_file_name = cache_file_name;
        Ok(())
    }

    /// What to hand the backend for `url`
    ///
    /// Backends that cannot stream get a cached local copy, downloaded first
    /// when missing. Without a cache or catalog the URL is passed through.
    async fn playable_source(
        &mut self,
        url: &str,
        cache_file_name: Option<&str>,
    ) -> Result<String, PlaybackError> {
        if !is_remote_source(url) || self.backend.supports_remote() {
            return Ok(url.to_string());
        }

        let Some(cache) = self.cache.clone() else {
            debug!("No cache available, passing {} to the backend", url);
            return Ok(url.to_string());
        };

        let file_name = cache_file_name
            .map(str::to_string)
            .unwrap_or_else(|| cache_file_name_for_url(url));

        if let Some(path) = cache.lookup(&file_name) {
            info!("Cache hit for {}: {:?}", url, path);
            return Ok(path.to_string_lossy().into_owned());
        }

        let Some(catalog) = self.catalog.clone() else {
            debug!("No catalog client, passing {} to the backend", url);
            return Ok(url.to_string());
        };

        let path = download_to_cache(&catalog, &cache, url, &file_name).await?;
        Ok(path.to_string_lossy().into_owned())
    }

    // ============ Backend events ============

    fn handle_backend_event(&mut self, event: BackendEvent) {
        if self.loaded_source.as_deref() != Some(event.source.as_str()) {
            debug!("Dropping stale event for {}: {:?}", event.source, event.kind);
            return;
        }

        match event.kind {
            BackendEventKind::PositionChanged { position_ms } => {
                self.state.set_position(position_ms as f64 / 1000.0);
                self.show_current_lyric();
            }
            BackendEventKind::DurationChanged { duration_ms } => {
                self.state.set_duration(duration_ms as f64 / 1000.0);
            }
            BackendEventKind::StateChanged(state) => self.mirror_backend_state(state),
            BackendEventKind::MediaStatusChanged(MediaStatus::EndOfMedia) => self.finish_track(),
            BackendEventKind::MediaStatusChanged(status) => {
                debug!("Media status for {}: {:?}", event.source, status);
            }
            BackendEventKind::Error { message } => {
                error!("Backend error for {}: {}", event.source, message);
                if self.state.phase.is_active() {
                    self.state.phase = PlaybackPhase::Stopped;
                }
                self.notify(&format!("播放失败: {}", message));
            }
        }

        self.publish();
    }

    fn mirror_backend_state(&mut self, state: BackendState) {
        let phase = match state {
            BackendState::Playing => PlaybackPhase::Playing,
            BackendState::Paused => PlaybackPhase::Paused,
            BackendState::Stopped => PlaybackPhase::Stopped,
        };

        if self.state.phase != PlaybackPhase::Idle && self.state.phase != phase {
            debug!("Backend reports {:?} while session is {:?}", state, self.state.phase);
            self.state.phase = phase;
        }
    }

    fn finish_track(&mut self) {
        if !self.state.phase.is_active() {
            return;
        }

        let total = self.state.total_duration_seconds;
        self.state.set_position(total);
        self.state.phase = PlaybackPhase::Stopped;

        let message = format!(
            "播放完成: {} [{}]",
            self.state.display_label(),
            format_time(total)
        );
        info!("{}", message);
        self.notify(&message);
    }

    /// Push the current lyric line once the cursor reaches a line not yet shown
    fn show_current_lyric(&mut self) {
        let index = self.state.current_lyric_index;
        if index < 0 || index == self.shown_lyric_index || !self.state.phase.is_active() {
            return;
        }
        self.shown_lyric_index = index;

        if let Some(line) = self.state.lyrics.get(index as usize) {
            debug!("Lyric {}: {}", index, line.text);
            let message = format!("[{}] {}", self.state.position_text(), line.text);
            self.notify(&message);
        }
    }

    // ============ Helpers ============

    /// Run a backend call outside the async scheduler
    ///
    /// Backend commands block until the audio thread acknowledges them. On a
    /// current-thread runtime the call runs inline.
    fn backend_call<T>(&mut self, call: impl FnOnce(&mut dyn MediaBackend) -> T) -> T {
        let backend = &mut *self.backend;
        match Handle::try_current().map(|handle| handle.runtime_flavor()) {
            Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(|| call(backend)),
            _ => call(backend),
        }
    }
}

/// Move a session onto its own task and return the control handle
///
/// Must be called from within a tokio runtime.
pub fn spawn_session(session: PlaybackSession, events: BackendEventReceiver) -> SessionHandle {
    let (command_tx, command_rx) = session_command_channel();
    let handle = SessionHandle::new(command_tx, session.shared.clone());
    tokio::spawn(session.run(command_rx, events));
    handle
}

fn respond(reply: Reply<ControlResult>, result: Result<ControlResult, PlaybackError>) {
    let result = result.unwrap_or_else(|e| {
        warn!("Control command failed: {}", e);
        ControlResult::error(e.to_string())
    });
    if reply.send(result).is_err() {
        debug!("Caller went away before the reply");
    }
}

/// Read tags on the blocking pool, falling back to file-level fields
async fn read_metadata(extractor: MetadataExtractor, path: &Path) -> TrackMetadata {
    let owned = path.to_path_buf();
    let probe = tokio::task::spawn_blocking(move || {
        extractor
            .extract(&owned)
            .unwrap_or_else(|| TrackMetadata::bare(&owned))
    });

    match probe.await {
        Ok(metadata) => metadata,
        Err(e) => {
            warn!("Metadata task for {:?} failed: {}", path, e);
            TrackMetadata::bare(path)
        }
    }
}

/// Download `url` into the temp area, then promote it into the cache
async fn download_to_cache(
    catalog: &CatalogClient,
    cache: &CacheLayout,
    url: &str,
    file_name: &str,
) -> Result<PathBuf, PlaybackError> {
    let staged = cache.staging_path(file_name);
    info!("Downloading {} to {:?}", url, staged);

    if let Err(e) = catalog.download(url, &staged).await {
        cache.discard(&staged);
        return Err(e.into());
    }

    cache.promote(&staged, file_name).map_err(|e| {
        cache.discard(&staged);
        PlaybackError::from(e)
    })
}
