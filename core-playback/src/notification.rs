//! # Notification Sync
//!
//! Mirrors the [`PlaybackSession`] into the host's [`MediaSession`] and
//! routes the user's notification actions back into the
//! [`PlaybackEngine`].
//!
//! Metadata is pushed only when something the OS displays changes. The
//! transport state is pushed on every session change and, while playing, on
//! a `position_interval` ticker.

use crate::engine::PlaybackEngine;
use crate::error::Result;
use crate::session::{PlaybackSession, PlaybackStatus};
use async_trait::async_trait;
use bridge_traits::{MediaAction, MediaActionKind, MediaItem, MediaPlaybackState, MediaSession};
use core_async::sync::{broadcast, watch};
use core_async::task::AbortHandle;
use core_async::time::{interval, MissedTickBehavior};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Every action the notification offers.
pub const SUPPORTED_ACTIONS: [MediaActionKind; 8] = [
    MediaActionKind::Seek,
    MediaActionKind::SeekForward,
    MediaActionKind::SeekBackward,
    MediaActionKind::SkipToNext,
    MediaActionKind::SkipToPrevious,
    MediaActionKind::Play,
    MediaActionKind::Pause,
    MediaActionKind::Stop,
];

/// Queue navigation, owned by the host.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackNavigator: Send + Sync {
    async fn skip_next(&self) -> Result<()>;
    async fn skip_previous(&self) -> Result<()>;
}

/// Projects a session onto what the OS shows. The item is `None` when
/// there is no track.
pub fn project(session: &PlaybackSession) -> (Option<MediaItem>, MediaPlaybackState) {
    let item = session.current_song_id.as_ref().map(|id| {
        let metadata = session.metadata.clone().unwrap_or_default();
        MediaItem {
            id: id.clone(),
            title: metadata.title,
            artist: metadata.artist,
            artwork_uri: metadata.artwork_ref,
            duration: session.duration.or(metadata.duration),
        }
    });

    let state = MediaPlaybackState {
        playing: session.playing,
        position: session.position,
        buffered_position: session.buffered_position,
        speed: session.speed,
        processing_state: session.processing_state,
        actions: SUPPORTED_ACTIONS.to_vec(),
    };

    (item, state)
}

fn should_clear(session: &PlaybackSession) -> bool {
    match session.status {
        PlaybackStatus::Error(_) => true,
        PlaybackStatus::Idle => !session.has_track(),
        _ => false,
    }
}

/// What was last sent to the media session.
#[derive(Default)]
struct Mirror {
    item: Option<MediaItem>,
    state: Option<MediaPlaybackState>,
    cleared: bool,
}

impl Mirror {
    async fn sync(&mut self, media: &dyn MediaSession, session: &PlaybackSession) {
        if should_clear(session) {
            if !self.cleared {
                if let Err(e) = media.clear().await {
                    warn!(error = %e, "Failed to clear media session");
                }
                *self = Self {
                    cleared: true,
                    ..Self::default()
                };
            }
            return;
        }

        let (item, state) = project(session);
        if let Some(item) = item {
            if self.item.as_ref() != Some(&item) {
                match media.set_media_item(item.clone()).await {
                    Ok(()) => {
                        debug!(id = %item.id, title = %item.title, "Pushed media item");
                        self.item = Some(item);
                        self.cleared = false;
                    }
                    Err(e) => warn!(error = %e, "Failed to push media item"),
                }
            }
        }

        if self.state.as_ref() != Some(&state) {
            match media.set_playback_state(state.clone()).await {
                Ok(()) => {
                    self.state = Some(state);
                    self.cleared = false;
                }
                Err(e) => warn!(error = %e, "Failed to push playback state"),
            }
        }
    }
}

struct SyncInner {
    engine: PlaybackEngine,
    media: Arc<dyn MediaSession>,
    navigator: RwLock<Option<Arc<dyn TrackNavigator>>>,
    seek_step: Duration,
    position_interval: Duration,
    tasks: Mutex<Vec<AbortHandle>>,
}

/// Keeps the OS media session in step with the engine.
#[derive(Clone)]
pub struct NotificationSync {
    inner: Arc<SyncInner>,
}

impl NotificationSync {
    pub fn new(engine: PlaybackEngine, media: Arc<dyn MediaSession>) -> Self {
        let config = engine.config();
        let seek_step = config.seek_step;
        let position_interval = config.position_interval;

        Self {
            inner: Arc::new(SyncInner {
                engine,
                media,
                navigator: RwLock::new(None),
                seek_step,
                position_interval,
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn set_navigator(&self, navigator: Arc<dyn TrackNavigator>) {
        *self.inner.navigator.write() = Some(navigator);
    }

    /// Spawns the mirror and action loops. Restarts them if already running.
    pub fn start(&self) {
        let mut tasks = self.inner.tasks.lock();
        for task in tasks.drain(..) {
            task.abort();
        }

        let session_rx = self.inner.engine.subscribe_session();
        let actions = self.inner.media.actions();
        tasks.push(core_async::spawn(mirror_loop(self.inner.clone(), session_rx)).abort_handle());
        tasks.push(core_async::spawn(action_loop(self.inner.clone(), actions)).abort_handle());
    }

    pub fn shutdown(&self) {
        for task in self.inner.tasks.lock().drain(..) {
            task.abort();
        }
    }

    /// Routes one notification action into the engine.
    pub async fn handle_action(&self, action: MediaAction) -> Result<()> {
        self.inner.handle_action(action).await
    }
}

impl SyncInner {
    async fn handle_action(&self, action: MediaAction) -> Result<()> {
        debug!(action = ?action, "Media action");
        match action {
            MediaAction::Play => self.engine.resume().await,
            MediaAction::Pause => self.engine.pause().await,
            MediaAction::Stop => self.engine.stop().await,
            MediaAction::SeekTo(position) => self.engine.seek(position).await,
            MediaAction::SeekForward => {
                let position = self.engine.refresh_position();
                self.engine.seek(position.saturating_add(self.seek_step)).await
            }
            MediaAction::SeekBackward => {
                let position = self.engine.refresh_position();
                self.engine.seek(position.saturating_sub(self.seek_step)).await
            }
            MediaAction::SkipToNext | MediaAction::SkipToPrevious => {
                let navigator = self.navigator.read().clone();
                let Some(navigator) = navigator else {
                    debug!("No track navigator; ignoring skip");
                    return Ok(());
                };
                if action == MediaAction::SkipToNext {
                    navigator.skip_next().await
                } else {
                    navigator.skip_previous().await
                }
            }
        }
    }
}

async fn mirror_loop(inner: Arc<SyncInner>, mut session_rx: watch::Receiver<PlaybackSession>) {
    let mut mirror = Mirror::default();
    let mut ticker = interval(inner.position_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let initial = session_rx.borrow_and_update().clone();
    mirror.sync(inner.media.as_ref(), &initial).await;

    loop {
        core_async::select! {
            changed = session_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let session = session_rx.borrow_and_update().clone();
                mirror.sync(inner.media.as_ref(), &session).await;
            }
            _ = ticker.tick() => {
                if inner.engine.session().playing {
                    inner.engine.refresh_position();
                    let session = session_rx.borrow_and_update().clone();
                    mirror.sync(inner.media.as_ref(), &session).await;
                }
            }
        }
    }
}

async fn action_loop(inner: Arc<SyncInner>, mut actions: broadcast::Receiver<MediaAction>) {
    loop {
        match actions.recv().await {
            Ok(action) => {
                if let Err(e) = inner.handle_action(action).await {
                    warn!(action = ?action, error = %e, "Media action failed");
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "Media action pump lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::TrackMetadata;
    use bridge_traits::media_session::MockMediaSession;
    use bridge_traits::ProcessingState;

    fn ready_session() -> PlaybackSession {
        PlaybackSession {
            status: PlaybackStatus::Ready,
            current_song_id: Some("song-1".into()),
            metadata: Some(TrackMetadata::new("Title").with_artist("Artist")),
            duration: Some(Duration::from_secs(200)),
            position: Duration::from_secs(12),
            playing: true,
            processing_state: ProcessingState::Ready,
            ..Default::default()
        }
    }

    #[test]
    fn test_project_declares_all_actions() {
        let (item, state) = project(&ready_session());
        let item = item.unwrap();
        assert_eq!(item.id, "song-1");
        assert_eq!(item.artist.as_deref(), Some("Artist"));
        assert_eq!(item.duration, Some(Duration::from_secs(200)));
        assert_eq!(state.position, Duration::from_secs(12));
        assert_eq!(state.actions.len(), 8);
        for kind in SUPPORTED_ACTIONS {
            assert!(state.actions.contains(&kind));
        }
    }

    #[test]
    fn test_project_without_track() {
        let (item, state) = project(&PlaybackSession::default());
        assert!(item.is_none());
        assert!(!state.playing);
    }

    #[tokio::test]
    async fn test_metadata_repushed_when_duration_arrives() {
        let mut media = MockMediaSession::new();
        media.expect_set_media_item().times(2).returning(|_| Ok(()));
        media.expect_set_playback_state().returning(|_| Ok(()));
        media.expect_clear().never();

        let mut mirror = Mirror::default();
        let mut session = ready_session();
        session.duration = None;
        mirror.sync(&media, &session).await;
        mirror.sync(&media, &session).await;

        session.duration = Some(Duration::from_secs(200));
        mirror.sync(&media, &session).await;
    }

    #[tokio::test]
    async fn test_position_change_pushes_state_only() {
        let mut media = MockMediaSession::new();
        media.expect_set_media_item().times(1).returning(|_| Ok(()));
        media.expect_set_playback_state().times(2).returning(|_| Ok(()));

        let mut mirror = Mirror::default();
        let mut session = ready_session();
        mirror.sync(&media, &session).await;

        session.position = Duration::from_secs(13);
        mirror.sync(&media, &session).await;
    }

    #[tokio::test]
    async fn test_error_clears_once() {
        let mut media = MockMediaSession::new();
        media.expect_set_media_item().times(1).returning(|_| Ok(()));
        media.expect_set_playback_state().times(1).returning(|_| Ok(()));
        media.expect_clear().times(1).returning(|| Ok(()));

        let mut mirror = Mirror::default();
        mirror.sync(&media, &ready_session()).await;

        let failed = PlaybackSession {
            status: PlaybackStatus::Error("Download failed: offline".into()),
            ..Default::default()
        };
        mirror.sync(&media, &failed).await;
        mirror.sync(&media, &failed).await;
    }

    #[test]
    fn test_idle_with_track_is_not_cleared() {
        let session = PlaybackSession {
            current_song_id: Some("song".into()),
            ..Default::default()
        };
        assert!(!should_clear(&session));
        assert!(should_clear(&PlaybackSession::default()));
    }
}
