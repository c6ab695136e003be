//! Remote stream manifests.
//!
//! A [`StreamProvider`] turns a YouTube video id into the list of streams
//! the platform offers, plus typed display metadata. Picking which stream
//! to download is core logic and lives in `core-playback`.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What a stream carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamKind {
    /// Audio and video in one container.
    Muxed,
    AudioOnly,
    VideoOnly,
}

/// One downloadable variant of a video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub url: String,
    /// Container name as reported by the provider (`mp4`, `m4a`, `webm`).
    pub container: String,
    pub codec: Option<String>,
    pub kind: StreamKind,
    /// Bits per second.
    pub bitrate: u64,
    /// Total size in bytes, when the provider reports it.
    pub size_bytes: Option<u64>,
}

impl StreamInfo {
    /// Container compared case-insensitively.
    pub fn has_container(&self, container: &str) -> bool {
        self.container.eq_ignore_ascii_case(container)
    }
}

/// Display metadata for a video.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub video_id: String,
    pub title: String,
    pub author: Option<String>,
    pub thumbnail_url: Option<String>,
    pub duration: Option<Duration>,
    pub description: Option<String>,
}

/// Everything the provider knows about a video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamManifest {
    pub metadata: VideoMetadata,
    pub streams: Vec<StreamInfo>,
}

/// Source of stream manifests.
///
/// # Errors
///
/// Implementations map provider failures (video unavailable, age-gated,
/// network) to [`BridgeError`](crate::BridgeError); the resolver surfaces
/// them as upstream errors.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait::async_trait]
pub trait StreamProvider: Send + Sync {
    async fn fetch_manifest(&self, video_id: &str) -> Result<StreamManifest>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_match_ignores_case() {
        let info = StreamInfo {
            url: "https://example.com/s".into(),
            container: "MP4".into(),
            codec: Some("mp4a.40.2".into()),
            kind: StreamKind::AudioOnly,
            bitrate: 128_000,
            size_bytes: None,
        };
        assert!(info.has_container("mp4"));
        assert!(!info.has_container("webm"));
    }
}
