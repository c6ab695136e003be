//! OS media-session bridge.
//!
//! The media session is the notification / lock-screen surface with
//! transport controls and a seek bar. The core pushes track metadata and
//! transport state into it and receives user actions back.
//!
//! Position and duration are both plain [`Duration`]s so the seek bar is
//! always drawn in one coordinate space.

use crate::error::Result;
use crate::playback::ProcessingState;
use core_async::sync::broadcast;
use std::time::Duration;

/// Track metadata shown by the OS.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MediaItem {
    pub id: String,
    pub title: String,
    pub artist: Option<String>,
    pub artwork_uri: Option<String>,
    /// `None` until the player reports it; the seek bar is hidden meanwhile.
    pub duration: Option<Duration>,
}

/// A user action triggered from the OS surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaAction {
    Play,
    Pause,
    Stop,
    SeekTo(Duration),
    SeekForward,
    SeekBackward,
    SkipToNext,
    SkipToPrevious,
}

impl MediaAction {
    pub fn kind(&self) -> MediaActionKind {
        match self {
            MediaAction::Play => MediaActionKind::Play,
            MediaAction::Pause => MediaActionKind::Pause,
            MediaAction::Stop => MediaActionKind::Stop,
            MediaAction::SeekTo(_) => MediaActionKind::Seek,
            MediaAction::SeekForward => MediaActionKind::SeekForward,
            MediaAction::SeekBackward => MediaActionKind::SeekBackward,
            MediaAction::SkipToNext => MediaActionKind::SkipToNext,
            MediaAction::SkipToPrevious => MediaActionKind::SkipToPrevious,
        }
    }
}

/// Action capability declared to the OS. An undeclared kind has its button
/// hidden by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MediaActionKind {
    Play,
    Pause,
    Stop,
    Seek,
    SeekForward,
    SeekBackward,
    SkipToNext,
    SkipToPrevious,
}

/// Transport state shown by the OS.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaPlaybackState {
    pub playing: bool,
    pub position: Duration,
    pub buffered_position: Duration,
    pub speed: f32,
    pub processing_state: ProcessingState,
    pub actions: Vec<MediaActionKind>,
}

impl Default for MediaPlaybackState {
    fn default() -> Self {
        Self {
            playing: false,
            position: Duration::ZERO,
            buffered_position: Duration::ZERO,
            speed: 1.0,
            processing_state: ProcessingState::Idle,
            actions: Vec::new(),
        }
    }
}

/// Platform media session.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait::async_trait]
pub trait MediaSession: Send + Sync {
    /// Replace the displayed track metadata.
    async fn set_media_item(&self, item: MediaItem) -> Result<()>;

    /// Replace the displayed transport state.
    async fn set_playback_state(&self, state: MediaPlaybackState) -> Result<()>;

    /// Remove the notification entirely.
    async fn clear(&self) -> Result<()>;

    /// Subscribe to user actions.
    fn actions(&self) -> broadcast::Receiver<MediaAction>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seek_to_maps_to_seek_kind() {
        assert_eq!(
            MediaAction::SeekTo(Duration::from_secs(30)).kind(),
            MediaActionKind::Seek
        );
        assert_eq!(MediaAction::SkipToNext.kind(), MediaActionKind::SkipToNext);
    }

    #[test]
    fn default_state_is_idle_at_normal_speed() {
        let state = MediaPlaybackState::default();
        assert_eq!(state.processing_state, ProcessingState::Idle);
        assert_eq!(state.speed, 1.0);
        assert!(!state.playing);
    }
}
