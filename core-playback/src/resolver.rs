//! # Stream Resolver
//!
//! Picks the stream to download for a YouTube video.
//!
//! ## Preference Order
//!
//! The first tier with at least one candidate wins:
//!
//! 1. Muxed mp4, smallest reported size first (unknown sizes last)
//! 2. Audio-only mp4/m4a, highest bitrate
//! 3. Audio-only webm, highest bitrate
//!
//! Video-only streams are never chosen. Muxed mp4 wins over audio-only
//! because it is the variant every platform player opens without extra
//! codecs.

use crate::error::ResolveError;
use crate::source::VideoId;
use bridge_traits::{StreamInfo, StreamKind, StreamManifest, StreamProvider, VideoMetadata};
use lru::LruCache;
use parking_lot::Mutex;
use std::cmp::Reverse;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, instrument};

/// The stream chosen for download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHandle {
    pub url: String,
    pub container: String,
    pub codec: Option<String>,
    pub kind: StreamKind,
    pub bitrate: u64,
    /// Size reported by the provider; the download engine falls back to it
    /// when the server omits `Content-Length`.
    pub size_bytes: Option<u64>,
}

impl StreamHandle {
    /// A plain HTTP(S) URL. The container is guessed from the path's
    /// extension.
    pub fn direct(url: &str) -> Self {
        let path = url.split(|c| c == '?' || c == '#').next().unwrap_or(url);
        let container = path
            .rsplit('/')
            .next()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext)
            .filter(|ext| (1..=5).contains(&ext.len()) && ext.bytes().all(|b| b.is_ascii_alphanumeric()))
            .unwrap_or_default()
            .to_ascii_lowercase();

        Self {
            url: url.to_string(),
            container,
            codec: None,
            kind: StreamKind::AudioOnly,
            bitrate: 0,
            size_bytes: None,
        }
    }

    /// File extension for the downloaded file.
    pub fn extension(&self) -> &str {
        if self.container.is_empty() {
            "bin"
        } else {
            &self.container
        }
    }
}

impl From<&StreamInfo> for StreamHandle {
    fn from(info: &StreamInfo) -> Self {
        Self {
            url: info.url.clone(),
            container: info.container.to_ascii_lowercase(),
            codec: info.codec.clone(),
            kind: info.kind,
            bitrate: info.bitrate,
            size_bytes: info.size_bytes,
        }
    }
}

/// A chosen stream plus the video's display metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStream {
    pub stream: StreamHandle,
    pub metadata: VideoMetadata,
}

/// Applies the tier order to a manifest's streams.
pub fn select_stream(streams: &[StreamInfo]) -> Option<&StreamInfo> {
    let muxed_mp4 = streams
        .iter()
        .filter(|s| s.kind == StreamKind::Muxed && s.has_container("mp4"))
        // (unknown, size): known sizes sort before unknown ones
        .min_by_key(|s| (s.size_bytes.is_none(), s.size_bytes.unwrap_or(u64::MAX)));
    if muxed_mp4.is_some() {
        return muxed_mp4;
    }

    let audio_mp4 = streams
        .iter()
        .filter(|s| {
            s.kind == StreamKind::AudioOnly && (s.has_container("mp4") || s.has_container("m4a"))
        })
        .min_by_key(|s| Reverse(s.bitrate));
    if audio_mp4.is_some() {
        return audio_mp4;
    }

    streams
        .iter()
        .filter(|s| s.kind == StreamKind::AudioOnly && s.has_container("webm"))
        .min_by_key(|s| Reverse(s.bitrate))
}

/// Resolves video ids to downloadable streams.
///
/// Manifests are memoised per video id, so a [`metadata`](Self::metadata)
/// call followed by [`resolve`](Self::resolve) reaches the provider once.
pub struct StreamResolver {
    provider: Arc<dyn StreamProvider>,
    manifests: Mutex<LruCache<VideoId, StreamManifest>>,
}

impl StreamResolver {
    pub fn new(provider: Arc<dyn StreamProvider>, manifest_capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(manifest_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            provider,
            manifests: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Chooses the stream to download.
    ///
    /// # Errors
    ///
    /// - [`ResolveError::Upstream`] when the provider fails
    /// - [`ResolveError::NoStreamAvailable`] when no tier has a candidate
    #[instrument(skip(self), fields(video_id = %video_id))]
    pub async fn resolve(&self, video_id: &VideoId) -> Result<ResolvedStream, ResolveError> {
        let manifest = self.manifest(video_id).await?;
        let chosen = select_stream(&manifest.streams).ok_or(ResolveError::NoStreamAvailable)?;

        debug!(
            kind = ?chosen.kind,
            container = %chosen.container,
            bitrate = chosen.bitrate,
            size_bytes = ?chosen.size_bytes,
            "Selected stream"
        );

        Ok(ResolvedStream {
            stream: StreamHandle::from(chosen),
            metadata: manifest.metadata,
        })
    }

    /// Display metadata only. Never starts a download.
    #[instrument(skip(self), fields(video_id = %video_id))]
    pub async fn metadata(&self, video_id: &VideoId) -> Result<VideoMetadata, ResolveError> {
        Ok(self.manifest(video_id).await?.metadata)
    }

    /// Drops memoised manifests. Signed stream URLs expire, so hosts call
    /// this after a long idle period.
    pub fn clear_memo(&self) {
        self.manifests.lock().clear();
    }

    async fn manifest(&self, video_id: &VideoId) -> Result<StreamManifest, ResolveError> {
        let memo = self.manifests.lock().get(video_id).cloned();
        if let Some(manifest) = memo {
            debug!("Manifest memo hit");
            return Ok(manifest);
        }

        let mut manifest = self
            .provider
            .fetch_manifest(video_id.as_str())
            .await
            .map_err(|e| ResolveError::Upstream(e.to_string()))?;

        if manifest.metadata.video_id.is_empty() {
            manifest.metadata.video_id = video_id.to_string();
        }

        self.manifests
            .lock()
            .put(video_id.clone(), manifest.clone());
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::stream::MockStreamProvider;
    use bridge_traits::BridgeError;

    fn stream(kind: StreamKind, container: &str, bitrate: u64, size: Option<u64>) -> StreamInfo {
        StreamInfo {
            url: format!("https://cdn.example.com/{container}/{bitrate}/{size:?}"),
            container: container.to_string(),
            codec: None,
            kind,
            bitrate,
            size_bytes: size,
        }
    }

    fn video_id() -> VideoId {
        VideoId::new("dQw4w9WgXcQ").unwrap()
    }

    #[test]
    fn test_muxed_mp4_smallest_wins() {
        let streams = vec![
            stream(StreamKind::AudioOnly, "m4a", 256_000, Some(1_000)),
            stream(StreamKind::Muxed, "mp4", 900_000, None),
            stream(StreamKind::Muxed, "mp4", 700_000, Some(9_000_000)),
            stream(StreamKind::Muxed, "mp4", 500_000, Some(4_000_000)),
        ];

        let chosen = select_stream(&streams).unwrap();
        assert_eq!(chosen.size_bytes, Some(4_000_000));
    }

    #[test]
    fn test_unknown_size_muxed_is_still_chosen_over_audio() {
        let streams = vec![
            stream(StreamKind::AudioOnly, "m4a", 256_000, Some(1_000)),
            stream(StreamKind::Muxed, "mp4", 900_000, None),
        ];

        assert_eq!(select_stream(&streams).unwrap().kind, StreamKind::Muxed);
    }

    #[test]
    fn test_audio_mp4_highest_bitrate() {
        let streams = vec![
            stream(StreamKind::Muxed, "webm", 900_000, Some(10)),
            stream(StreamKind::AudioOnly, "webm", 320_000, None),
            stream(StreamKind::AudioOnly, "mp4", 128_000, None),
            stream(StreamKind::AudioOnly, "M4A", 160_000, None),
        ];

        let chosen = select_stream(&streams).unwrap();
        assert_eq!(chosen.bitrate, 160_000);
    }

    #[test]
    fn test_webm_fallback() {
        let streams = vec![
            stream(StreamKind::AudioOnly, "webm", 64_000, None),
            stream(StreamKind::AudioOnly, "webm", 160_000, None),
        ];

        assert_eq!(select_stream(&streams).unwrap().bitrate, 160_000);
    }

    #[test]
    fn test_direct_handle_guesses_container() {
        assert_eq!(
            StreamHandle::direct("https://cdn.example.com/music/track.MP3?sig=abc").container,
            "mp3"
        );
        assert_eq!(
            StreamHandle::direct("https://cdn.example.com/stream").extension(),
            "bin"
        );
    }

    #[test]
    fn test_video_only_is_never_chosen() {
        let streams = vec![stream(StreamKind::VideoOnly, "mp4", 2_000_000, Some(1))];
        assert!(select_stream(&streams).is_none());
    }

    #[tokio::test]
    async fn test_resolve_no_stream_available() {
        let mut provider = MockStreamProvider::new();
        provider.expect_fetch_manifest().returning(|_| {
            Ok(StreamManifest {
                metadata: VideoMetadata::default(),
                streams: vec![stream(StreamKind::VideoOnly, "webm", 1, None)],
            })
        });

        let resolver = StreamResolver::new(Arc::new(provider), 4);
        let err = resolver.resolve(&video_id()).await.unwrap_err();
        assert_eq!(err, ResolveError::NoStreamAvailable);
    }

    #[tokio::test]
    async fn test_provider_failure_is_upstream() {
        let mut provider = MockStreamProvider::new();
        provider
            .expect_fetch_manifest()
            .returning(|_| Err(BridgeError::Network("connection reset".into())));

        let resolver = StreamResolver::new(Arc::new(provider), 4);
        let err = resolver.metadata(&video_id()).await.unwrap_err();
        assert!(matches!(err, ResolveError::Upstream(msg) if msg.contains("connection reset")));
    }

    #[tokio::test]
    async fn test_metadata_then_resolve_fetches_once() {
        let mut provider = MockStreamProvider::new();
        provider.expect_fetch_manifest().times(1).returning(|_| {
            Ok(StreamManifest {
                metadata: VideoMetadata {
                    title: "Never Gonna Give You Up".into(),
                    ..Default::default()
                },
                streams: vec![stream(StreamKind::AudioOnly, "m4a", 128_000, Some(3_000_000))],
            })
        });

        let resolver = StreamResolver::new(Arc::new(provider), 4);
        let metadata = resolver.metadata(&video_id()).await.unwrap();
        assert_eq!(metadata.title, "Never Gonna Give You Up");
        assert_eq!(metadata.video_id, "dQw4w9WgXcQ");

        let resolved = resolver.resolve(&video_id()).await.unwrap();
        assert_eq!(resolved.stream.extension(), "m4a");
        assert_eq!(resolved.stream.size_bytes, Some(3_000_000));
    }
}
