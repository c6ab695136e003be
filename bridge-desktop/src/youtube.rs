//! YouTube stream manifests via `rusty_ytdl`.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    stream::{StreamInfo, StreamKind, StreamManifest, StreamProvider, VideoMetadata},
};
use rusty_ytdl::{Video, VideoFormat, VideoInfo};
use std::time::Duration;
use tracing::{debug, instrument};

/// [`StreamProvider`] backed by `rusty_ytdl`.
///
/// Only manifest extraction happens here. The bytes are fetched by the
/// download engine through the regular HTTP client.
#[derive(Debug, Default, Clone)]
pub struct YtdlStreamProvider;

impl YtdlStreamProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StreamProvider for YtdlStreamProvider {
    #[instrument(skip(self))]
    async fn fetch_manifest(&self, video_id: &str) -> Result<StreamManifest> {
        let video = Video::new(video_id)
            .map_err(|e| BridgeError::OperationFailed(format!("invalid video {}: {}", video_id, e)))?;

        let info = video
            .get_info()
            .await
            .map_err(|e| BridgeError::Network(format!("video info for {}: {}", video_id, e)))?;

        let manifest = manifest_from_info(video_id, info);
        debug!(streams = manifest.streams.len(), "Fetched stream manifest");
        Ok(manifest)
    }
}

fn manifest_from_info(video_id: &str, info: VideoInfo) -> StreamManifest {
    let details = info.video_details;

    let metadata = VideoMetadata {
        video_id: video_id.to_string(),
        title: details.title,
        author: details.author.map(|author| author.name),
        thumbnail_url: details
            .thumbnails
            .iter()
            .max_by_key(|thumb| thumb.width * thumb.height)
            .map(|thumb| thumb.url.clone()),
        duration: details
            .length_seconds
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs),
        description: Some(details.description).filter(|d| !d.is_empty()),
    };

    let streams = info.formats.iter().filter_map(stream_from_format).collect();

    StreamManifest { metadata, streams }
}

fn stream_from_format(format: &VideoFormat) -> Option<StreamInfo> {
    let kind = match (format.has_audio, format.has_video) {
        (true, true) => StreamKind::Muxed,
        (true, false) => StreamKind::AudioOnly,
        (false, true) => StreamKind::VideoOnly,
        (false, false) => return None,
    };

    if format.url.is_empty() {
        return None;
    }

    Some(StreamInfo {
        url: format.url.clone(),
        container: format.mime_type.container.to_ascii_lowercase(),
        codec: format.mime_type.codecs.first().cloned(),
        kind,
        bitrate: format.bitrate,
        size_bytes: format
            .content_length
            .as_deref()
            .and_then(|len| len.parse().ok()),
    })
}
