//! # Playback Error Types
//!
//! One enum per stage of the pipeline, all folded into [`PlaybackError`].

use bridge_traits::BridgeError;
use thiserror::Error;

/// Caller-supplied source strings that cannot be classified.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("Source is empty")]
    Empty,

    /// Looked like a YouTube link but no 11-character video id was found.
    #[error("Not a valid YouTube video URL: {0}")]
    InvalidVideoUrl(String),
}

/// Stream negotiation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// Provider or network failure while fetching the manifest.
    #[error("Could not load video info: {0}")]
    Upstream(String),

    /// The manifest had no muxed mp4 or audio-only mp4/m4a/webm stream.
    #[error("No playable audio stream available")]
    NoStreamAvailable,
}

/// Transfer failures. A failed download never leaves a partial file behind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DownloadError {
    #[error("No network connectivity")]
    NoConnectivity,

    #[error("Download failed: {0}")]
    Io(String),

    /// The finished file was below the minimum viable audio size.
    #[error("Downloaded file is too small ({0} bytes)")]
    TooSmall(u64),

    #[error("Download cancelled")]
    Cancelled,
}

/// Media cache failures.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache index error: {0}")]
    Index(#[from] serde_json::Error),

    #[error("Cache storage error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Invalid cache key: {0:?}")]
    InvalidKey(String),
}

/// Errors that can occur during playback operations.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Pipeline Errors
    // ========================================================================
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    // ========================================================================
    // Player Errors
    // ========================================================================
    /// The platform player refused to open the source.
    #[error("Player rejected the source: {0}")]
    PlayerRejected(String),

    #[error("Unsupported source: {0}")]
    UnsupportedSource(String),

    /// Only remote sources can be downloaded.
    #[error("Source cannot be downloaded: {0}")]
    NotDownloadable(String),

    // ========================================================================
    // Control Errors
    // ========================================================================
    #[error("Invalid volume: {0} (must be between 0.0 and 1.0)")]
    InvalidVolume(f32),

    #[error("Invalid speed: {0} (must be above 0.0 and at most 4.0)")]
    InvalidSpeed(f32),

    #[error("No track loaded")]
    NoTrackLoaded,

    /// A newer `play_source` call replaced this one before it finished.
    #[error("Load superseded by a newer request")]
    Superseded,

    // ========================================================================
    // Generic Errors
    // ========================================================================
    #[error("Platform error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl PlaybackError {
    /// Returns `true` if a later attempt could succeed without user action.
    pub fn is_transient(&self) -> bool {
        match self {
            PlaybackError::Download(DownloadError::NoConnectivity | DownloadError::Io(_)) => true,
            PlaybackError::Resolve(ResolveError::Upstream(_)) => true,
            PlaybackError::Cache(CacheError::Bridge(e)) | PlaybackError::Bridge(e) => {
                e.is_transient()
            }
            _ => false,
        }
    }

    /// First line of the display text, for task rows and toasts.
    pub fn user_message(&self) -> String {
        first_line(&self.to_string())
    }
}

pub(crate) fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or_default().trim().to_string()
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(PlaybackError::from(DownloadError::NoConnectivity).is_transient());
        assert!(PlaybackError::from(ResolveError::Upstream("502".into())).is_transient());
        assert!(!PlaybackError::from(ResolveError::NoStreamAvailable).is_transient());
        assert!(!PlaybackError::from(DownloadError::TooSmall(12)).is_transient());
        assert!(!PlaybackError::Superseded.is_transient());
    }

    #[test]
    fn test_user_message_is_single_line() {
        let err = PlaybackError::from(ResolveError::Upstream(
            "Video unavailable\nThis video is private".into(),
        ));
        assert_eq!(err.user_message(), "Could not load video info: Video unavailable");
    }

    #[test]
    fn test_wrapped_errors_display_transparently() {
        let err = PlaybackError::from(DownloadError::TooSmall(512));
        assert_eq!(err.to_string(), "Downloaded file is too small (512 bytes)");
    }
}
