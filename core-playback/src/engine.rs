//! # Playback Engine
//!
//! Orchestrates source selection, loading and transport control on top of
//! the host's [`AudioPlayer`].
//!
//! ## State Machine
//!
//! ```text
//!          play_source                 load ok
//!   Idle ───────────────> Loading ───────────────> Ready (playing | paused)
//!    ^                       │                        │
//!    │       stop            │ load failed            │ stop / next play_source
//!    └──────────── Error <───┘                        │
//!    └────────────────────────────────────────────────┘
//! ```
//!
//! ## Source Selection
//!
//! `play_source` tries, in order:
//! 1. the caller's override path, if it exists and passes the size check
//! 2. a cache hit
//! 3. a local file source
//! 4. for YouTube: resolve, download into the cache, play the cached file
//! 5. for direct URLs: stream remotely
//!
//! A newer `play_source` supersedes an in-flight one: the older call's
//! download is cancelled and it returns [`PlaybackError::Superseded`]
//! without touching the session.
//!
//! A pause interruption that arrives during `Loading` lets the load finish
//! but leaves the track paused until the interruption ends.

use crate::cache::CacheStore;
use crate::config::PlayerConfig;
use crate::download::DownloadEngine;
use crate::error::{PlaybackError, Result};
use crate::resolver::StreamResolver;
use crate::session::{LoopMode, PlaybackSession, PlaybackStatus, TrackMetadata};
use crate::source::MediaSource;
use bridge_traits::{
    AudioPlayer, AudioSessionEvent, AudioSessionObserver, AudioSource, InterruptionKind,
    PlayerEvent, ProcessingState,
};
use core_async::sync::{broadcast, watch, CancellationToken};
use core_async::task::AbortHandle;
use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const ERROR_CHANNEL_CAPACITY: usize = 16;
const MAX_SPEED: f32 = 4.0;

/// Notified when a track reaches its natural end (not when looping one).
#[cfg_attr(test, mockall::automock)]
pub trait SongCompletionHandler: Send + Sync {
    fn on_song_complete(&self, song_id: &str);
}

/// A request to play one track.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaySourceRequest {
    pub song_id: String,
    pub source: MediaSource,
    /// A file the host already has (for example a user download). Used only
    /// if it exists and passes the minimum size check.
    pub local_path_override: Option<PathBuf>,
    pub metadata: Option<TrackMetadata>,
}

impl PlaySourceRequest {
    pub fn new(song_id: impl Into<String>, source: MediaSource) -> Self {
        Self {
            song_id: song_id.into(),
            source,
            local_path_override: None,
            metadata: None,
        }
    }

    pub fn with_local_override(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_path_override = Some(path.into());
        self
    }

    pub fn with_metadata(mut self, metadata: TrackMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

struct LoadSlot {
    generation: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct InterruptionState {
    ducked: bool,
    resume_on_end: bool,
    /// A pause interruption arrived while a track was loading; the load
    /// opens the source but does not start it.
    held_while_loading: bool,
}

struct LoadedTrack {
    duration: Option<Duration>,
    metadata: Option<TrackMetadata>,
}

struct EngineInner {
    player: Arc<dyn AudioPlayer>,
    resolver: Arc<StreamResolver>,
    downloader: Arc<DownloadEngine>,
    cache: Arc<CacheStore>,
    event_bus: EventBus,
    config: PlayerConfig,
    session: watch::Sender<PlaybackSession>,
    errors: broadcast::Sender<String>,
    load: Mutex<LoadSlot>,
    interruption: Mutex<InterruptionState>,
    completion_handler: RwLock<Option<Arc<dyn SongCompletionHandler>>>,
    pumps: Mutex<Vec<AbortHandle>>,
}

/// The playback engine. Sole writer of the [`PlaybackSession`].
///
/// Cloning is cheap; clones drive the same player.
#[derive(Clone)]
pub struct PlaybackEngine {
    inner: Arc<EngineInner>,
}

impl PlaybackEngine {
    pub fn new(
        player: Arc<dyn AudioPlayer>,
        resolver: Arc<StreamResolver>,
        downloader: Arc<DownloadEngine>,
        cache: Arc<CacheStore>,
        event_bus: EventBus,
        config: PlayerConfig,
    ) -> Self {
        let (session, _) = watch::channel(PlaybackSession::with_volume(config.initial_volume));
        let (errors, _) = broadcast::channel(ERROR_CHANNEL_CAPACITY);

        Self {
            inner: Arc::new(EngineInner {
                player,
                resolver,
                downloader,
                cache,
                event_bus,
                config,
                session,
                errors,
                load: Mutex::new(LoadSlot {
                    generation: 0,
                    cancel: CancellationToken::new(),
                }),
                interruption: Mutex::new(InterruptionState::default()),
                completion_handler: RwLock::new(None),
                pumps: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.inner.config
    }

    /// Starts forwarding player events (and audio-session events, when an
    /// observer is given) into the engine. Replaces earlier pumps.
    pub fn attach(&self, session_observer: Option<Arc<dyn AudioSessionObserver>>) {
        let mut pumps = self.inner.pumps.lock();
        for pump in pumps.drain(..) {
            pump.abort();
        }

        let weak = Arc::downgrade(&self.inner);
        let player_events = self.inner.player.subscribe();
        pumps.push(core_async::spawn(pump_player_events(weak.clone(), player_events)).abort_handle());

        if let Some(observer) = session_observer {
            let session_events = observer.subscribe();
            pumps.push(core_async::spawn(pump_session_events(weak, session_events)).abort_handle());
        }
        debug!(pumps = pumps.len(), "Playback engine attached");
    }

    /// Stops the event pumps and cancels any in-flight load.
    pub fn shutdown(&self) {
        for pump in self.inner.pumps.lock().drain(..) {
            pump.abort();
        }
        self.inner.supersede();
    }

    pub fn set_completion_handler(&self, handler: Arc<dyn SongCompletionHandler>) {
        *self.inner.completion_handler.write() = Some(handler);
    }

    /// Current session snapshot.
    pub fn session(&self) -> PlaybackSession {
        self.inner.snapshot()
    }

    pub fn subscribe_session(&self) -> watch::Receiver<PlaybackSession> {
        self.inner.session.subscribe()
    }

    /// Load failures and player errors, as single-line messages.
    pub fn errors(&self) -> broadcast::Receiver<String> {
        self.inner.errors.subscribe()
    }

    /// Reads the live position from the player and folds it into the
    /// session.
    pub fn refresh_position(&self) -> Duration {
        let position = self.inner.player.position();
        self.inner.session.send_if_modified(|s| {
            if s.has_track() && s.position != position {
                s.position = position;
                true
            } else {
                false
            }
        });
        position
    }

    /// Loads and plays a track.
    ///
    /// # Errors
    ///
    /// - [`PlaybackError::Superseded`] if a newer request replaced this one;
    ///   the session is left to the newer request
    /// - any load failure; the session moves to `Error` and the message is
    ///   broadcast on [`errors`](Self::errors)
    #[instrument(skip(self, request), fields(song_id = %request.song_id, source = %request.source))]
    pub async fn play_source(&self, request: PlaySourceRequest) -> Result<()> {
        let inner = &self.inner;
        let (generation, cancel) = inner.begin_load();
        {
            let mut interruption = inner.interruption.lock();
            interruption.resume_on_end = false;
            interruption.held_while_loading = false;
        }

        let song_id = request.song_id.clone();
        inner.session.send_modify(|s| {
            s.status = PlaybackStatus::Loading;
            s.current_song_id = Some(song_id.clone());
            s.metadata = request.metadata.clone();
            s.duration = request.metadata.as_ref().and_then(|m| m.duration);
            s.position = Duration::ZERO;
            s.buffered_position = Duration::ZERO;
            s.playing = false;
            s.processing_state = ProcessingState::Loading;
        });
        inner.emit(PlaybackEvent::Loading {
            song_id: song_id.clone(),
        });

        let loaded = core_async::select! {
            biased;
            _ = cancel.cancelled() => Err(PlaybackError::Superseded),
            loaded = inner.load(&request, &cancel) => loaded,
        };

        if !inner.is_current(generation) {
            debug!("Load superseded");
            return Err(PlaybackError::Superseded);
        }

        let loaded = match loaded {
            Ok(loaded) => loaded,
            Err(PlaybackError::Superseded) => return Err(PlaybackError::Superseded),
            Err(e) => {
                inner.fail(Some(&song_id), &e);
                return Err(e);
            }
        };

        let mut playing = match inner.start_playback().await {
            Ok(playing) => playing,
            Err(e) => {
                if !inner.is_current(generation) {
                    return Err(PlaybackError::Superseded);
                }
                inner.fail(Some(&song_id), &e);
                return Err(e);
            }
        };

        if !inner.is_current(generation) {
            return Err(PlaybackError::Superseded);
        }

        let held = std::mem::take(&mut inner.interruption.lock().held_while_loading);
        if held && playing {
            // interruption landed while the player was starting
            playing = !inner.pause_for_interruption().await;
        }

        let title = loaded
            .metadata
            .as_ref()
            .map(|m| m.title.clone())
            .unwrap_or_default();
        inner.session.send_modify(|s| {
            s.status = PlaybackStatus::Ready;
            s.duration = loaded.duration.or(s.duration);
            s.metadata = loaded.metadata.clone();
            s.processing_state = ProcessingState::Ready;
            s.playing = playing;
        });

        if playing {
            info!(duration = ?loaded.duration, "Playback started");
            inner.emit(PlaybackEvent::Started { song_id, title });
        } else {
            info!(duration = ?loaded.duration, "Track loaded; held by interruption");
            inner.emit(PlaybackEvent::Paused {
                song_id,
                position_ms: 0,
            });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn pause(&self) -> Result<()> {
        let song_id = self.inner.require_track()?;
        self.inner.player.pause().await?;
        self.inner.interruption.lock().resume_on_end = false;

        let position = self.inner.player.position();
        self.inner.session.send_modify(|s| {
            s.playing = false;
            s.position = position;
        });
        self.inner.emit(PlaybackEvent::Paused {
            song_id,
            position_ms: position.as_millis() as u64,
        });
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn resume(&self) -> Result<()> {
        let song_id = self.inner.require_track()?;
        if !self.inner.snapshot().is_ready() {
            return Err(PlaybackError::NoTrackLoaded);
        }
        self.inner.player.play().await?;

        let position = self.inner.player.position();
        self.inner.session.send_modify(|s| {
            s.playing = true;
            s.position = position;
        });
        self.inner.emit(PlaybackEvent::Resumed {
            song_id,
            position_ms: position.as_millis() as u64,
        });
        Ok(())
    }

    /// Stops playback, cancels any in-flight load and empties the session.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<()> {
        let inner = &self.inner;
        inner.supersede();
        *inner.interruption.lock() = InterruptionState::default();

        let song_id = inner.snapshot().current_song_id;
        let stopped = inner.player.stop().await;

        inner.session.send_modify(PlaybackSession::reset);
        inner.emit(PlaybackEvent::Stopped { song_id });
        stopped.map_err(PlaybackError::from)
    }

    /// Seeks to `position`, clamped to the duration when it is known.
    #[instrument(skip(self))]
    pub async fn seek(&self, position: Duration) -> Result<()> {
        let song_id = self.inner.require_track()?;
        let target = match self.inner.snapshot().duration {
            Some(duration) => position.min(duration),
            None => position,
        };

        self.inner.player.seek(target).await?;
        self.inner.session.send_modify(|s| s.position = target);
        self.inner.emit(PlaybackEvent::Seeked {
            song_id,
            position_ms: target.as_millis() as u64,
        });
        Ok(())
    }

    /// Sets the session volume. While ducked the player keeps the reduced
    /// level until the interruption ends.
    pub async fn set_volume(&self, volume: f32) -> Result<()> {
        if !volume.is_finite() || !(0.0..=1.0).contains(&volume) {
            return Err(PlaybackError::InvalidVolume(volume));
        }

        let effective = self.inner.effective_volume(volume);
        self.inner.player.set_volume(effective).await?;
        self.inner.session.send_modify(|s| s.volume = volume);
        Ok(())
    }

    pub async fn set_speed(&self, speed: f32) -> Result<()> {
        if !speed.is_finite() || speed <= 0.0 || speed > MAX_SPEED {
            return Err(PlaybackError::InvalidSpeed(speed));
        }

        self.inner.player.set_speed(speed).await?;
        self.inner.session.send_modify(|s| s.speed = speed);
        Ok(())
    }

    pub async fn set_loop_mode(&self, mode: LoopMode) -> Result<()> {
        self.inner.player.set_looping(mode == LoopMode::One).await?;
        self.inner.session.send_modify(|s| s.loop_mode = mode);
        Ok(())
    }

    /// Applies an audio-session event (interruption or noisy route).
    pub async fn handle_session_event(&self, event: AudioSessionEvent) {
        self.inner.handle_session_event(event).await;
    }

    /// Applies a player event.
    pub async fn handle_player_event(&self, event: PlayerEvent) {
        self.inner.handle_player_event(event).await;
    }
}

impl EngineInner {
    fn snapshot(&self) -> PlaybackSession {
        self.session.borrow().clone()
    }

    fn emit(&self, event: PlaybackEvent) {
        self.event_bus.emit(CoreEvent::Playback(event)).ok();
    }

    fn begin_load(&self) -> (u64, CancellationToken) {
        let mut load = self.load.lock();
        load.cancel.cancel();
        load.generation += 1;
        load.cancel = CancellationToken::new();
        (load.generation, load.cancel.clone())
    }

    fn supersede(&self) {
        self.begin_load();
    }

    fn is_current(&self, generation: u64) -> bool {
        self.load.lock().generation == generation
    }

    fn require_track(&self) -> Result<String> {
        self.session
            .borrow()
            .current_song_id
            .clone()
            .ok_or(PlaybackError::NoTrackLoaded)
    }

    fn effective_volume(&self, volume: f32) -> f32 {
        if self.interruption.lock().ducked {
            volume * self.config.duck_volume_factor
        } else {
            volume
        }
    }

    async fn load(&self, request: &PlaySourceRequest, cancel: &CancellationToken) -> Result<LoadedTrack> {
        let min_valid = self.cache.config().min_valid_bytes;

        if let Some(path) = &request.local_path_override {
            if is_playable_file(path, min_valid).await {
                debug!(path = %path.display(), "Playing override path");
                return self
                    .open(AudioSource::local(path.clone()), request.metadata.clone())
                    .await;
            }
            debug!(path = %path.display(), "Override path unusable; ignoring");
        }

        let key = request.source.key();
        if request.source.is_downloadable() {
            if let Some(entry) = self.cache.lookup(&key).await? {
                debug!("Playing from cache");
                let cached = entry.title.as_deref().map(TrackMetadata::new);
                let metadata = merge_metadata(request.metadata.clone(), cached);
                return self.open(AudioSource::local(entry.local_path), metadata).await;
            }
        }

        match &request.source {
            MediaSource::Local(path) => {
                self.open(AudioSource::local(path.clone()), request.metadata.clone())
                    .await
            }
            MediaSource::YouTube(video_id) => {
                let resolved = self.resolver.resolve(video_id).await?;
                let metadata = merge_metadata(
                    request.metadata.clone(),
                    Some(TrackMetadata::from(&resolved.metadata)),
                );

                if !self.config.play_through_cache {
                    return self
                        .open(AudioSource::remote(resolved.stream.url.clone()), metadata)
                        .await;
                }

                let temp = self.cache.partial_path(&key, resolved.stream.extension());
                let file = self
                    .downloader
                    .download(&resolved.stream, &temp, cancel, |_| {})
                    .await?;

                let title = metadata.as_ref().map(|m| m.title.as_str());
                let entry = match self.cache.put(&key, &file.path, file.size_bytes, title).await {
                    Ok(entry) => entry,
                    Err(e) => {
                        if let Err(remove_err) = core_async::fs::remove_file(&file.path).await {
                            warn!(error = %remove_err, "Failed to remove downloaded file");
                        }
                        return Err(e.into());
                    }
                };

                self.open(AudioSource::local(entry.local_path), metadata).await
            }
            MediaSource::DirectUrl(url) => {
                self.open(AudioSource::remote(url.clone()), request.metadata.clone())
                    .await
            }
        }
    }

    async fn open(&self, source: AudioSource, metadata: Option<TrackMetadata>) -> Result<LoadedTrack> {
        let reported = self
            .player
            .set_source(source)
            .await
            .map_err(|e| PlaybackError::PlayerRejected(e.to_string()))?;

        Ok(LoadedTrack {
            duration: reported
                .filter(|d| !d.is_zero())
                .or_else(|| metadata.as_ref().and_then(|m| m.duration)),
            metadata,
        })
    }

    /// Applies session volume, speed and loop mode to a freshly opened
    /// source, then starts it unless an interruption is holding playback.
    /// Returns whether the player was started.
    async fn start_playback(&self) -> Result<bool> {
        let session = self.snapshot();
        self.player
            .set_volume(self.effective_volume(session.volume))
            .await?;
        self.player.set_speed(session.speed).await?;
        self.player
            .set_looping(session.loop_mode == LoopMode::One)
            .await?;
        if self.interruption.lock().held_while_loading {
            debug!("Pause interruption during load; not starting");
            return Ok(false);
        }
        self.player
            .play()
            .await
            .map_err(|e| PlaybackError::PlayerRejected(e.to_string()))?;
        Ok(true)
    }

    fn fail(&self, song_id: Option<&str>, error: &PlaybackError) {
        let message = error.user_message();
        warn!(song_id = ?song_id, error = %message, "Playback failed");

        self.session.send_modify(|s| {
            s.reset();
            s.status = PlaybackStatus::Error(message.clone());
        });
        self.errors.send(message.clone()).ok();
        self.emit(PlaybackEvent::Error {
            song_id: song_id.map(str::to_string),
            message,
            recoverable: error.is_transient(),
        });
    }

    async fn handle_player_event(&self, event: PlayerEvent) {
        match event {
            PlayerEvent::DurationChanged(duration) => {
                if !duration.is_zero() {
                    self.session.send_if_modified(|s| {
                        let changed = s.has_track() && s.duration != Some(duration);
                        if changed {
                            s.duration = Some(duration);
                        }
                        changed
                    });
                }
            }
            PlayerEvent::PositionChanged(position) => {
                self.session.send_if_modified(|s| {
                    let changed = s.has_track() && s.position != position;
                    if changed {
                        s.position = position;
                    }
                    changed
                });
            }
            PlayerEvent::BufferedPositionChanged(buffered) => {
                self.session.send_if_modified(|s| {
                    let changed = s.has_track() && s.buffered_position != buffered;
                    if changed {
                        s.buffered_position = buffered;
                    }
                    changed
                });
            }
            PlayerEvent::PlayingChanged(playing) => {
                self.session.send_if_modified(|s| {
                    let changed = s.is_ready() && s.playing != playing;
                    if changed {
                        s.playing = playing;
                    }
                    changed
                });
            }
            PlayerEvent::ProcessingStateChanged(state) => {
                self.session.send_if_modified(|s| {
                    let changed = s.has_track() && s.processing_state != state;
                    if changed {
                        s.processing_state = state;
                    }
                    changed
                });
            }
            PlayerEvent::Completed => self.handle_completion(),
            PlayerEvent::Error(message) => {
                let session = self.snapshot();
                if session.has_track() {
                    self.fail(
                        session.current_song_id.as_deref(),
                        &PlaybackError::PlayerRejected(message),
                    );
                }
            }
        }
    }

    fn handle_completion(&self) {
        let session = self.snapshot();
        if session.loop_mode == LoopMode::One {
            debug!("Completion ignored while looping one");
            return;
        }
        let Some(song_id) = session.current_song_id else {
            return;
        };

        self.session.send_modify(|s| {
            s.playing = false;
            s.processing_state = ProcessingState::Completed;
            if let Some(duration) = s.duration {
                s.position = duration;
            }
        });

        let handler = self.completion_handler.read().clone();
        if let Some(handler) = handler {
            handler.on_song_complete(&song_id);
        }

        info!(song_id = %song_id, "Track completed");
        self.emit(PlaybackEvent::Completed { song_id });
    }

    async fn handle_session_event(&self, event: AudioSessionEvent) {
        match event {
            AudioSessionEvent::InterruptionBegan(kind) => {
                self.emit(PlaybackEvent::Interrupted {
                    kind: interruption_name(kind).to_string(),
                });
                self.interruption_began(kind).await;
            }
            AudioSessionEvent::InterruptionEnded(kind) => {
                let resumed = self.interruption_ended(kind).await;
                self.emit(PlaybackEvent::InterruptionEnded {
                    kind: interruption_name(kind).to_string(),
                    resumed,
                });
            }
            AudioSessionEvent::BecomingNoisy => {
                self.emit(PlaybackEvent::Interrupted {
                    kind: "becoming_noisy".to_string(),
                });
                self.interruption.lock().resume_on_end = false;
                if self.snapshot().playing {
                    self.pause_for_interruption().await;
                }
            }
        }
    }

    async fn interruption_began(&self, kind: InterruptionKind) {
        match kind {
            InterruptionKind::Duck => {
                self.interruption.lock().ducked = true;
                let volume = self.snapshot().volume * self.config.duck_volume_factor;
                if let Err(e) = self.player.set_volume(volume).await {
                    warn!(error = %e, "Failed to duck volume");
                }
            }
            InterruptionKind::Pause => {
                let session = self.snapshot();
                if matches!(session.status, PlaybackStatus::Loading) {
                    let mut interruption = self.interruption.lock();
                    interruption.held_while_loading = true;
                    interruption.resume_on_end = true;
                } else if session.playing && self.pause_for_interruption().await {
                    self.interruption.lock().resume_on_end = true;
                }
            }
            InterruptionKind::Unknown => {
                debug!("Unknown interruption; leaving playback to the platform");
            }
        }
    }

    async fn interruption_ended(&self, kind: InterruptionKind) -> bool {
        match kind {
            InterruptionKind::Duck => {
                self.interruption.lock().ducked = false;
                let volume = self.snapshot().volume;
                if let Err(e) = self.player.set_volume(volume).await {
                    warn!(error = %e, "Failed to restore volume");
                }
                false
            }
            InterruptionKind::Pause => {
                let (resume, held) = {
                    let mut interruption = self.interruption.lock();
                    (
                        std::mem::take(&mut interruption.resume_on_end),
                        std::mem::take(&mut interruption.held_while_loading),
                    )
                };
                let session = self.snapshot();
                if held && matches!(session.status, PlaybackStatus::Loading) {
                    // the pending load starts playback itself
                    return true;
                }
                if !(resume && session.has_track() && session.is_ready()) {
                    return false;
                }
                match self.player.play().await {
                    Ok(()) => {
                        self.session.send_modify(|s| s.playing = true);
                        true
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to resume after interruption");
                        false
                    }
                }
            }
            InterruptionKind::Unknown => false,
        }
    }

    async fn pause_for_interruption(&self) -> bool {
        match self.player.pause().await {
            Ok(()) => {
                self.session.send_modify(|s| s.playing = false);
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to pause for interruption");
                false
            }
        }
    }
}

async fn pump_player_events(engine: Weak<EngineInner>, mut events: broadcast::Receiver<PlayerEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                let Some(inner) = engine.upgrade() else { break };
                inner.handle_player_event(event).await;
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "Player event pump lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn pump_session_events(
    engine: Weak<EngineInner>,
    mut events: broadcast::Receiver<AudioSessionEvent>,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                let Some(inner) = engine.upgrade() else { break };
                inner.handle_session_event(event).await;
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "Audio session pump lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn interruption_name(kind: InterruptionKind) -> &'static str {
    match kind {
        InterruptionKind::Duck => "duck",
        InterruptionKind::Pause => "pause",
        InterruptionKind::Unknown => "unknown",
    }
}

/// Caller metadata wins; gaps are filled from `fallback`.
fn merge_metadata(
    primary: Option<TrackMetadata>,
    fallback: Option<TrackMetadata>,
) -> Option<TrackMetadata> {
    match (primary, fallback) {
        (Some(primary), Some(fallback)) => Some(primary.or_fill_from(&fallback)),
        (primary, fallback) => primary.or(fallback),
    }
}

async fn is_playable_file(path: &Path, min_valid_bytes: u64) -> bool {
    match core_async::fs::metadata(path).await {
        Ok(metadata) => metadata.is_file() && metadata.len() >= min_valid_bytes,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::config::DownloadConfig;
    use bridge_desktop::TokioFileSystem;
    use bridge_traits::http::MockHttpClient;
    use bridge_traits::network::MockNetworkMonitor;
    use bridge_traits::playback::MockAudioPlayer;
    use bridge_traits::stream::MockStreamProvider;
    use bridge_traits::SystemClock;
    use tempfile::TempDir;

    struct Harness {
        engine: PlaybackEngine,
        bus: EventBus,
        _dir: TempDir,
    }

    fn permissive_player() -> MockAudioPlayer {
        let mut player = MockAudioPlayer::new();
        player
            .expect_set_source()
            .returning(|_| Ok(Some(Duration::from_secs(180))));
        player.expect_play().returning(|| Ok(()));
        player.expect_pause().returning(|| Ok(()));
        player.expect_stop().returning(|| Ok(()));
        player.expect_seek().returning(|_| Ok(()));
        player.expect_set_volume().returning(|_| Ok(()));
        player.expect_set_speed().returning(|_| Ok(()));
        player.expect_set_looping().returning(|_| Ok(()));
        player.expect_position().returning(|| Duration::from_secs(5));
        player
    }

    async fn harness(player: MockAudioPlayer) -> Harness {
        let dir = TempDir::new().unwrap();
        let cache = CacheStore::open(
            dir.path(),
            CacheConfig::default().with_min_valid_bytes(16),
            Arc::new(TokioFileSystem::new()),
            Arc::new(SystemClock),
        )
        .await
        .unwrap();

        let mut network = MockNetworkMonitor::new();
        network.expect_is_connected().returning(|| true);
        let bus = EventBus::new(64);

        let engine = PlaybackEngine::new(
            Arc::new(player),
            Arc::new(StreamResolver::new(Arc::new(MockStreamProvider::new()), 4)),
            Arc::new(DownloadEngine::new(
                Arc::new(MockHttpClient::new()),
                Arc::new(network),
                DownloadConfig::default(),
            )),
            Arc::new(cache),
            bus.clone(),
            PlayerConfig::default(),
        );

        Harness {
            engine,
            bus,
            _dir: dir,
        }
    }

    fn local_request(dir: &Path) -> PlaySourceRequest {
        let path = dir.join("song.mp3");
        std::fs::write(&path, vec![0u8; 64]).unwrap();
        PlaySourceRequest::new("song-1", MediaSource::Local(path))
            .with_metadata(TrackMetadata::new("Local Song"))
    }

    #[tokio::test]
    async fn test_local_source_plays() {
        let h = harness(permissive_player()).await;
        let dir = TempDir::new().unwrap();

        h.engine.play_source(local_request(dir.path())).await.unwrap();

        let session = h.engine.session();
        assert_eq!(session.status, PlaybackStatus::Ready);
        assert!(session.playing);
        assert_eq!(session.duration, Some(Duration::from_secs(180)));
        assert_eq!(session.current_song_id.as_deref(), Some("song-1"));
    }

    #[tokio::test]
    async fn test_player_rejection_moves_to_error() {
        let mut player = permissive_player();
        player.checkpoint();
        player
            .expect_set_source()
            .returning(|_| Err(bridge_traits::BridgeError::OperationFailed("codec".into())));
        let h = harness(player).await;
        let mut errors = h.engine.errors();
        let dir = TempDir::new().unwrap();

        let err = h.engine.play_source(local_request(dir.path())).await.unwrap_err();
        assert!(matches!(err, PlaybackError::PlayerRejected(_)));

        let session = h.engine.session();
        assert!(session.error_message().is_some());
        assert!(!session.has_track());
        assert!(!session.playing);
        assert!(errors.try_recv().unwrap().starts_with("Player rejected"));
    }

    #[tokio::test]
    async fn test_controls_require_track() {
        let h = harness(permissive_player()).await;
        assert!(matches!(h.engine.pause().await, Err(PlaybackError::NoTrackLoaded)));
        assert!(matches!(
            h.engine.seek(Duration::from_secs(1)).await,
            Err(PlaybackError::NoTrackLoaded)
        ));
    }

    #[tokio::test]
    async fn test_volume_and_speed_validation() {
        let h = harness(permissive_player()).await;

        assert!(matches!(h.engine.set_volume(1.5).await, Err(PlaybackError::InvalidVolume(_))));
        assert!(matches!(h.engine.set_volume(f32::NAN).await, Err(PlaybackError::InvalidVolume(_))));
        assert!(matches!(h.engine.set_speed(0.0).await, Err(PlaybackError::InvalidSpeed(_))));
        assert!(matches!(h.engine.set_speed(4.5).await, Err(PlaybackError::InvalidSpeed(_))));

        h.engine.set_volume(0.5).await.unwrap();
        h.engine.set_speed(4.0).await.unwrap();
        assert_eq!(h.engine.session().volume, 0.5);
        assert_eq!(h.engine.session().speed, 4.0);
    }

    #[tokio::test]
    async fn test_seek_is_clamped_to_duration() {
        let h = harness(permissive_player()).await;
        let dir = TempDir::new().unwrap();
        h.engine.play_source(local_request(dir.path())).await.unwrap();

        h.engine.seek(Duration::from_secs(999)).await.unwrap();
        assert_eq!(h.engine.session().position, Duration::from_secs(180));
    }

    #[tokio::test]
    async fn test_stop_resets_session() {
        let h = harness(permissive_player()).await;
        let dir = TempDir::new().unwrap();
        h.engine.play_source(local_request(dir.path())).await.unwrap();
        h.engine.set_volume(0.7).await.unwrap();

        h.engine.stop().await.unwrap();
        let session = h.engine.session();
        assert_eq!(session.status, PlaybackStatus::Idle);
        assert!(!session.has_track());
        assert_eq!(session.volume, 0.7);
    }

    #[tokio::test]
    async fn test_completion_notifies_handler() {
        let h = harness(permissive_player()).await;
        let dir = TempDir::new().unwrap();
        let mut events = h.bus.subscribe();
        h.engine.play_source(local_request(dir.path())).await.unwrap();

        let mut handler = MockSongCompletionHandler::new();
        handler
            .expect_on_song_complete()
            .withf(|id| id == "song-1")
            .times(1)
            .return_const(());
        h.engine.set_completion_handler(Arc::new(handler));

        h.engine.handle_player_event(PlayerEvent::Completed).await;

        let session = h.engine.session();
        assert!(!session.playing);
        assert_eq!(session.processing_state, ProcessingState::Completed);

        let mut completed = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, CoreEvent::Playback(PlaybackEvent::Completed { .. })) {
                completed = true;
            }
        }
        assert!(completed);
    }

    #[tokio::test]
    async fn test_completion_ignored_when_looping_one() {
        let h = harness(permissive_player()).await;
        let dir = TempDir::new().unwrap();
        h.engine.play_source(local_request(dir.path())).await.unwrap();
        h.engine.set_loop_mode(LoopMode::One).await.unwrap();

        let mut handler = MockSongCompletionHandler::new();
        handler.expect_on_song_complete().never();
        h.engine.set_completion_handler(Arc::new(handler));

        h.engine.handle_player_event(PlayerEvent::Completed).await;
        assert!(h.engine.session().playing);
    }

    #[tokio::test]
    async fn test_duck_keeps_session_volume() {
        let mut player = permissive_player();
        player.checkpoint();
        let mut seq = mockall::Sequence::new();
        player
            .expect_set_volume()
            .withf(|v| (*v - 0.4).abs() < f32::EPSILON)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        player
            .expect_set_volume()
            .withf(|v| (*v - 1.0).abs() < f32::EPSILON)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        let h = harness(player).await;

        h.engine
            .handle_session_event(AudioSessionEvent::InterruptionBegan(InterruptionKind::Duck))
            .await;
        assert_eq!(h.engine.session().volume, 1.0);

        h.engine
            .handle_session_event(AudioSessionEvent::InterruptionEnded(InterruptionKind::Duck))
            .await;
        assert_eq!(h.engine.session().volume, 1.0);
    }

    #[tokio::test]
    async fn test_becoming_noisy_pauses_without_resume() {
        let h = harness(permissive_player()).await;
        let dir = TempDir::new().unwrap();
        h.engine.play_source(local_request(dir.path())).await.unwrap();

        h.engine
            .handle_session_event(AudioSessionEvent::InterruptionBegan(InterruptionKind::Pause))
            .await;
        h.engine
            .handle_session_event(AudioSessionEvent::BecomingNoisy)
            .await;
        h.engine
            .handle_session_event(AudioSessionEvent::InterruptionEnded(InterruptionKind::Pause))
            .await;

        assert!(!h.engine.session().playing);
    }
}
