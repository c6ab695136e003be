//! Playback bridge traits and supporting audio types.
//!
//! The core never decodes or renders audio itself. Hosts hand in an
//! [`AudioPlayer`] wrapping the platform engine (ExoPlayer, AVPlayer, a
//! desktop sink) and an [`AudioSessionObserver`] that reports interruptions
//! from the OS audio focus system.

use crate::error::Result;
use core_async::sync::broadcast;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// What the platform player should open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Local file accessible to the host runtime.
    LocalFile { path: PathBuf },
    /// Remote HTTP(S) stream fetched by the host player.
    RemoteStream {
        url: String,
        headers: HashMap<String, String>,
    },
}

impl AudioSource {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        AudioSource::LocalFile { path: path.into() }
    }

    pub fn remote(url: impl Into<String>) -> Self {
        AudioSource::RemoteStream {
            url: url.into(),
            headers: HashMap::new(),
        }
    }

    /// Determine whether the source represents remote content.
    pub fn is_remote(&self) -> bool {
        matches!(self, AudioSource::RemoteStream { .. })
    }
}

/// Buffering state of the player, also mirrored into the media session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingState {
    Idle,
    Loading,
    Buffering,
    Ready,
    Completed,
}

/// Events pushed by the platform player.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// Track duration became known or changed.
    DurationChanged(Duration),
    /// Periodic position report.
    PositionChanged(Duration),
    /// How far ahead the player has buffered.
    BufferedPositionChanged(Duration),
    /// The player started or stopped producing audio on its own.
    PlayingChanged(bool),
    /// Buffering state changed.
    ProcessingStateChanged(ProcessingState),
    /// The track reached its natural end.
    Completed,
    /// The player hit an unrecoverable error for the current source.
    Error(String),
}

/// Trait for platform-specific audio players.
///
/// Calls may suspend on disk or network I/O; `set_source` in particular can
/// take seconds for remote streams.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait::async_trait]
pub trait AudioPlayer: Send + Sync {
    /// Open a source. Returns the duration when the player already knows it.
    async fn set_source(&self, source: AudioSource) -> Result<Option<Duration>>;

    /// Begin or resume playback.
    async fn play(&self) -> Result<()>;

    /// Pause playback, keeping the source loaded.
    async fn pause(&self) -> Result<()>;

    /// Stop playback and release the source.
    async fn stop(&self) -> Result<()>;

    /// Seek to an absolute position.
    async fn seek(&self, position: Duration) -> Result<()>;

    /// Output gain, normalized to `0.0..=1.0`.
    async fn set_volume(&self, volume: f32) -> Result<()>;

    /// Playback rate, `1.0` being normal speed.
    async fn set_speed(&self, speed: f32) -> Result<()>;

    /// Toggle the player's native single-track loop.
    async fn set_looping(&self, looping: bool) -> Result<()>;

    /// Current playback position.
    fn position(&self) -> Duration;

    /// Subscribe to player events.
    fn subscribe(&self) -> broadcast::Receiver<PlayerEvent>;
}

/// Kind of audio-focus interruption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptionKind {
    /// Another app wants us quieter (navigation prompt, notification sound).
    Duck,
    /// Another app needs exclusive audio for a while (phone call).
    Pause,
    /// The OS did not say why. Often app backgrounding.
    Unknown,
}

/// Events from the platform audio session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioSessionEvent {
    InterruptionBegan(InterruptionKind),
    InterruptionEnded(InterruptionKind),
    /// Output route is about to become loud (headphones unplugged).
    BecomingNoisy,
}

/// Source of audio-session interruption events.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
pub trait AudioSessionObserver: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<AudioSessionEvent>;
}
