//! Shared fakes for the scenario tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_desktop::TokioFileSystem;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::network::MockNetworkMonitor;
use bridge_traits::stream::MockStreamProvider;
use bridge_traits::{
    AudioPlayer, AudioSource, BridgeError, ByteStream, HttpClient, HttpRequest, HttpResponse,
    MediaAction, MediaItem, MediaPlaybackState, MediaSession, PlayerEvent, StreamInfo, StreamKind,
    StreamManifest, SystemClock, VideoMetadata,
};
use bytes::Bytes;
use core_playback::{
    CacheConfig, CacheStore, DownloadConfig, DownloadEngine, DownloadTaskManager, PlaybackEngine,
    PlayerConfig, StreamResolver,
};
use core_runtime::events::EventBus;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio_util::io::StreamReader;

pub const VIDEO_ID: &str = "dQw4w9WgXcQ";
pub const CHUNK: usize = 1024;

/// Serves a fixed body, optionally stalling forever after the chunks.
pub struct FakeHttp {
    chunks: Vec<Vec<u8>>,
    stall_after: bool,
    gap: Option<Duration>,
    content_length: Option<u64>,
    requests: Mutex<Vec<String>>,
}

impl FakeHttp {
    pub fn serving(chunk_count: usize) -> Self {
        Self {
            chunks: vec![vec![7u8; CHUNK]; chunk_count],
            stall_after: false,
            gap: None,
            content_length: Some((chunk_count * CHUNK) as u64),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Serves `chunk_count` chunks, waiting `gap` before each one.
    pub fn paced(chunk_count: usize, gap: Duration) -> Self {
        Self {
            gap: Some(gap),
            ..Self::serving(chunk_count)
        }
    }

    /// Sends `sent` chunks of a `total`-chunk body, then never finishes.
    pub fn stalling(sent: usize, total: usize) -> Self {
        Self {
            chunks: vec![vec![7u8; CHUNK]; sent],
            stall_after: true,
            gap: None,
            content_length: Some((total * CHUNK) as u64),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl HttpClient for FakeHttp {
    async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
        Err(BridgeError::NotAvailable("buffered requests".into()))
    }

    async fn download_stream(&self, request: HttpRequest) -> BridgeResult<ByteStream> {
        self.requests.lock().push(request.url.clone());

        let body = stream::iter(
            self.chunks
                .clone()
                .into_iter()
                .map(|chunk| Ok::<_, io::Error>(Bytes::from(chunk))),
        );
        let reader: Box<dyn tokio::io::AsyncRead + Send + Unpin> = if let Some(gap) = self.gap {
            Box::new(StreamReader::new(Box::pin(body.then(move |chunk| async move {
                tokio::time::sleep(gap).await;
                chunk
            }))))
        } else if self.stall_after {
            Box::new(StreamReader::new(body.chain(stream::pending())))
        } else {
            Box::new(StreamReader::new(body))
        };
        Ok(ByteStream::new(self.content_length, reader))
    }
}

/// Records what the engine asks of the player.
pub struct FakePlayer {
    pub duration: Option<Duration>,
    sources: Mutex<Vec<AudioSource>>,
    playing: Mutex<bool>,
    volumes: Mutex<Vec<f32>>,
    position: Mutex<Duration>,
    events: broadcast::Sender<PlayerEvent>,
}

impl FakePlayer {
    pub fn new(duration: Option<Duration>) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            duration,
            sources: Mutex::new(Vec::new()),
            playing: Mutex::new(false),
            volumes: Mutex::new(Vec::new()),
            position: Mutex::new(Duration::ZERO),
            events,
        }
    }

    pub fn sources(&self) -> Vec<AudioSource> {
        self.sources.lock().clone()
    }

    pub fn is_playing(&self) -> bool {
        *self.playing.lock()
    }

    pub fn volumes(&self) -> Vec<f32> {
        self.volumes.lock().clone()
    }

    pub fn set_position(&self, position: Duration) {
        *self.position.lock() = position;
    }

    pub fn emit(&self, event: PlayerEvent) {
        self.events.send(event).ok();
    }
}

#[async_trait]
impl AudioPlayer for FakePlayer {
    async fn set_source(&self, source: AudioSource) -> BridgeResult<Option<Duration>> {
        self.sources.lock().push(source);
        *self.position.lock() = Duration::ZERO;
        Ok(self.duration)
    }

    async fn play(&self) -> BridgeResult<()> {
        *self.playing.lock() = true;
        Ok(())
    }

    async fn pause(&self) -> BridgeResult<()> {
        *self.playing.lock() = false;
        Ok(())
    }

    async fn stop(&self) -> BridgeResult<()> {
        *self.playing.lock() = false;
        Ok(())
    }

    async fn seek(&self, position: Duration) -> BridgeResult<()> {
        *self.position.lock() = position;
        Ok(())
    }

    async fn set_volume(&self, volume: f32) -> BridgeResult<()> {
        self.volumes.lock().push(volume);
        Ok(())
    }

    async fn set_speed(&self, _speed: f32) -> BridgeResult<()> {
        Ok(())
    }

    async fn set_looping(&self, _looping: bool) -> BridgeResult<()> {
        Ok(())
    }

    fn position(&self) -> Duration {
        *self.position.lock()
    }

    fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }
}

/// Records what the OS notification would show.
pub struct FakeMediaSession {
    items: Mutex<Vec<MediaItem>>,
    states: Mutex<Vec<MediaPlaybackState>>,
    clears: Mutex<usize>,
    actions: broadcast::Sender<MediaAction>,
}

impl FakeMediaSession {
    pub fn new() -> Self {
        let (actions, _) = broadcast::channel(16);
        Self {
            items: Mutex::new(Vec::new()),
            states: Mutex::new(Vec::new()),
            clears: Mutex::new(0),
            actions,
        }
    }

    pub fn items(&self) -> Vec<MediaItem> {
        self.items.lock().clone()
    }

    pub fn states(&self) -> Vec<MediaPlaybackState> {
        self.states.lock().clone()
    }

    pub fn clear_count(&self) -> usize {
        *self.clears.lock()
    }

    pub fn press(&self, action: MediaAction) {
        self.actions.send(action).ok();
    }
}

#[async_trait]
impl MediaSession for FakeMediaSession {
    async fn set_media_item(&self, item: MediaItem) -> BridgeResult<()> {
        self.items.lock().push(item);
        Ok(())
    }

    async fn set_playback_state(&self, state: MediaPlaybackState) -> BridgeResult<()> {
        self.states.lock().push(state);
        Ok(())
    }

    async fn clear(&self) -> BridgeResult<()> {
        *self.clears.lock() += 1;
        Ok(())
    }

    fn actions(&self) -> broadcast::Receiver<MediaAction> {
        self.actions.subscribe()
    }
}

pub fn online() -> Arc<MockNetworkMonitor> {
    let mut network = MockNetworkMonitor::new();
    network.expect_is_connected().returning(|| true);
    Arc::new(network)
}

pub fn offline() -> Arc<MockNetworkMonitor> {
    let mut network = MockNetworkMonitor::new();
    network.expect_is_connected().returning(|| false);
    Arc::new(network)
}

/// A provider that offers one audio-only m4a stream for any video.
pub fn provider(title: &'static str, duration: Option<Duration>) -> Arc<MockStreamProvider> {
    let mut provider = MockStreamProvider::new();
    provider.expect_fetch_manifest().returning(move |id| {
        Ok(StreamManifest {
            metadata: VideoMetadata {
                video_id: id.to_string(),
                title: title.to_string(),
                author: Some("Uploader".into()),
                duration,
                ..Default::default()
            },
            streams: vec![StreamInfo {
                url: format!("https://cdn.example.com/{id}.m4a?sig=secret"),
                container: "m4a".into(),
                codec: Some("mp4a.40.2".into()),
                kind: StreamKind::AudioOnly,
                bitrate: 128_000,
                size_bytes: None,
            }],
        })
    });
    Arc::new(provider)
}

pub fn download_config() -> DownloadConfig {
    DownloadConfig::default()
        .with_chunk_size(CHUNK)
        .with_min_valid_bytes(4 * CHUNK as u64)
}

pub fn cache_config() -> CacheConfig {
    CacheConfig::default().with_min_valid_bytes(4 * CHUNK as u64)
}

/// Wires the playback pipeline over one temp directory.
pub struct Fixture {
    pub dir: TempDir,
    pub bus: EventBus,
    pub http: Arc<FakeHttp>,
    pub cache: Arc<CacheStore>,
    pub resolver: Arc<StreamResolver>,
    pub downloader: Arc<DownloadEngine>,
}

impl Fixture {
    pub async fn new(http: FakeHttp, network: Arc<MockNetworkMonitor>) -> Self {
        Self::with_provider(http, network, provider("Never Gonna Give You Up", None)).await
    }

    pub async fn with_provider(
        http: FakeHttp,
        network: Arc<MockNetworkMonitor>,
        provider: Arc<MockStreamProvider>,
    ) -> Self {
        let dir = TempDir::new().unwrap();
        let bus = EventBus::new(256);
        let http = Arc::new(http);

        let cache = CacheStore::open(
            dir.path(),
            cache_config(),
            Arc::new(TokioFileSystem::new()),
            Arc::new(SystemClock),
        )
        .await
        .unwrap()
        .with_event_bus(bus.clone());

        let downloader = DownloadEngine::new(http.clone(), network, download_config());

        Self {
            dir,
            bus,
            http,
            cache: Arc::new(cache),
            resolver: Arc::new(StreamResolver::new(provider, 8)),
            downloader: Arc::new(downloader),
        }
    }

    pub fn manager(&self) -> DownloadTaskManager {
        self.manager_with(download_config())
    }

    pub fn manager_with(&self, config: DownloadConfig) -> DownloadTaskManager {
        DownloadTaskManager::new(
            self.resolver.clone(),
            self.downloader.clone(),
            self.cache.clone(),
            self.bus.clone(),
            config,
        )
    }

    pub fn engine(&self, player: Arc<FakePlayer>) -> PlaybackEngine {
        PlaybackEngine::new(
            player,
            self.resolver.clone(),
            self.downloader.clone(),
            self.cache.clone(),
            self.bus.clone(),
            PlayerConfig::default(),
        )
    }

    /// Every file under the cache root, including partials.
    pub fn files(&self) -> Vec<std::path::PathBuf> {
        fn walk(dir: &std::path::Path, out: &mut Vec<std::path::PathBuf>) {
            for entry in std::fs::read_dir(dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    walk(&path, out);
                } else {
                    out.push(path);
                }
            }
        }
        let mut out = Vec::new();
        walk(self.dir.path(), &mut out);
        out
    }

    /// Media files only: everything but the cache index.
    pub fn media_files(&self) -> Vec<std::path::PathBuf> {
        self.files()
            .into_iter()
            .filter(|p| p.file_name().and_then(|n| n.to_str()) != Some("index.json"))
            .collect()
    }
}
