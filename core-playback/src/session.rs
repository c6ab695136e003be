//! Playback session state.
//!
//! [`PlaybackSession`] is the single source of truth for what is playing.
//! The engine is its only writer; everyone else reads snapshots from a
//! `watch` channel.

use bridge_traits::{ProcessingState, VideoMetadata};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Display metadata for the current track.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: Option<String>,
    /// Artwork URI or host-specific reference.
    pub artwork_ref: Option<String>,
    pub duration: Option<Duration>,
}

impl TrackMetadata {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    pub fn with_artwork(mut self, artwork: impl Into<String>) -> Self {
        self.artwork_ref = Some(artwork.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Fills fields this value leaves empty from `other`.
    pub fn or_fill_from(mut self, other: &TrackMetadata) -> Self {
        if self.title.is_empty() {
            self.title = other.title.clone();
        }
        self.artist = self.artist.or_else(|| other.artist.clone());
        self.artwork_ref = self.artwork_ref.or_else(|| other.artwork_ref.clone());
        self.duration = self.duration.or(other.duration);
        self
    }
}

impl From<&VideoMetadata> for TrackMetadata {
    fn from(video: &VideoMetadata) -> Self {
        Self {
            title: video.title.clone(),
            artist: video.author.clone(),
            artwork_ref: video.thumbnail_url.clone(),
            duration: video.duration,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    #[default]
    None,
    /// Repeat the current track using the player's native loop.
    One,
    /// Repeat the queue. Queue advancement belongs to the completion handler.
    All,
}

/// Coarse engine state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Loading,
    /// A track is loaded; `playing` tells whether it is audible.
    Ready,
    /// The last load failed. Left by the next `play_source` or `stop`.
    Error(String),
}

/// Snapshot of the playback engine.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSession {
    pub status: PlaybackStatus,
    pub current_song_id: Option<String>,
    pub metadata: Option<TrackMetadata>,
    pub position: Duration,
    pub buffered_position: Duration,
    /// `None` until the player or the resolver reports it.
    pub duration: Option<Duration>,
    pub playing: bool,
    /// Session volume in `0.0..=1.0`. Ducking never changes it.
    pub volume: f32,
    pub speed: f32,
    pub loop_mode: LoopMode,
    pub processing_state: ProcessingState,
}

impl Default for PlaybackSession {
    fn default() -> Self {
        Self {
            status: PlaybackStatus::Idle,
            current_song_id: None,
            metadata: None,
            position: Duration::ZERO,
            buffered_position: Duration::ZERO,
            duration: None,
            playing: false,
            volume: 1.0,
            speed: 1.0,
            loop_mode: LoopMode::None,
            processing_state: ProcessingState::Idle,
        }
    }
}

impl PlaybackSession {
    pub fn with_volume(volume: f32) -> Self {
        Self {
            volume,
            ..Self::default()
        }
    }

    pub fn has_track(&self) -> bool {
        self.current_song_id.is_some()
    }

    pub fn is_ready(&self) -> bool {
        self.status == PlaybackStatus::Ready
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.status {
            PlaybackStatus::Error(message) => Some(message),
            _ => None,
        }
    }

    /// Empties the session, keeping the listener's volume, speed and loop
    /// preferences.
    pub(crate) fn reset(&mut self) {
        *self = Self {
            volume: self.volume,
            speed: self.speed,
            loop_mode: self.loop_mode,
            ..Self::default()
        };
    }
}
