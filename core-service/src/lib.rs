//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (audio player, HTTP,
//! filesystem, network probe, stream provider, audio and media sessions)
//! into the streaming core. Desktop apps typically enable the
//! `desktop-shims` feature, which lets [`CoreConfig`] fall back to the
//! `bridge-desktop` adapters for everything but the audio player.
//!
//! ```no_run
//! # async fn example(player: std::sync::Arc<dyn bridge_traits::AudioPlayer>) -> core_service::Result<()> {
//! use core_runtime::config::CoreConfig;
//! use core_service::CoreService;
//!
//! let config = CoreConfig::builder()
//!     .cache_dir("/tmp/tunestream")
//!     .audio_player(player)
//!     .build()?;
//! let core = CoreService::bootstrap(config).await?;
//! core.play("song-1", "https://youtu.be/dQw4w9WgXcQ").await?;
//! # Ok(())
//! # }
//! ```

pub mod error;

pub use error::{CoreError, Result};

use bridge_traits::VideoMetadata;
use core_playback::{
    CacheConfig, CacheStore, DownloadConfig, DownloadEngine, DownloadTaskManager, MediaSource,
    NotificationSync, PlaySourceRequest, PlaybackEngine, PlayerConfig, SongCompletionHandler,
    StartOutcome, StreamResolver, TrackNavigator,
};
use core_runtime::config::CoreConfig;
use core_runtime::events::{EventBus, EventStream};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

/// Tuning for the playback pipeline. The cache budget always comes from
/// [`CoreConfig::cache_size_mb`] and play-through caching from its feature
/// flags; the values here cover everything else.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackTuning {
    pub download: DownloadConfig,
    pub player: PlayerConfig,
    pub cache: CacheConfig,
}

impl PlaybackTuning {
    pub fn validate(&self) -> Result<()> {
        self.download
            .validate()
            .and_then(|_| self.player.validate())
            .and_then(|_| self.cache.validate())
            .map_err(CoreError::InvalidTuning)
    }
}

/// Primary façade exposed to host applications.
///
/// Cloning is cheap; clones share every component.
#[derive(Clone)]
pub struct CoreService {
    event_bus: EventBus,
    cache: Arc<CacheStore>,
    resolver: Arc<StreamResolver>,
    downloads: DownloadTaskManager,
    playback: PlaybackEngine,
    notifications: Option<NotificationSync>,
}

impl CoreService {
    /// Builds the core with default tuning.
    pub async fn bootstrap(config: CoreConfig) -> Result<Self> {
        Self::bootstrap_with(config, PlaybackTuning::default()).await
    }

    /// Builds every component from `config` and starts the event pumps.
    #[instrument(skip_all, fields(cache_dir = %config.cache_dir.display()))]
    pub async fn bootstrap_with(config: CoreConfig, tuning: PlaybackTuning) -> Result<Self> {
        config.validate()?;

        let cache_config = tuning.cache.with_max_size(config.cache_size_bytes());
        let player_config = tuning
            .player
            .with_play_through_cache(config.features.enable_play_through_cache);
        let download_config = tuning.download;
        PlaybackTuning {
            download: download_config.clone(),
            player: player_config.clone(),
            cache: cache_config.clone(),
        }
        .validate()?;

        let event_bus = EventBus::new(config.event_buffer_size);

        let cache = CacheStore::open(
            &config.cache_dir,
            cache_config,
            config.file_system.clone(),
            config.clock.clone(),
        )
        .await
        .map_err(|e| CoreError::InitializationFailed(format!("cache: {e}")))?
        .with_event_bus(event_bus.clone());
        let cache = Arc::new(cache);

        let resolver = Arc::new(StreamResolver::new(
            config.stream_provider.clone(),
            download_config.manifest_cache_capacity,
        ));
        let downloader = Arc::new(DownloadEngine::new(
            config.http_client.clone(),
            config.network_monitor.clone(),
            download_config.clone(),
        ));

        let downloads = DownloadTaskManager::new(
            resolver.clone(),
            downloader.clone(),
            cache.clone(),
            event_bus.clone(),
            download_config,
        );

        let playback = PlaybackEngine::new(
            config.audio_player.clone(),
            resolver.clone(),
            downloader,
            cache.clone(),
            event_bus.clone(),
            player_config,
        );
        let session_observer = config
            .audio_session
            .clone()
            .filter(|_| config.features.enable_interruption_handling);
        playback.attach(session_observer);

        let notifications = config
            .media_session
            .clone()
            .filter(|_| config.features.enable_notification_sync)
            .map(|media| {
                let sync = NotificationSync::new(playback.clone(), media);
                sync.start();
                sync
            });

        info!(
            features = ?config.features,
            cache_budget_bytes = config.cache_size_bytes(),
            "Core service ready"
        );

        Ok(Self {
            event_bus,
            cache,
            resolver,
            downloads,
            playback,
            notifications,
        })
    }

    pub fn playback(&self) -> &PlaybackEngine {
        &self.playback
    }

    pub fn downloads(&self) -> &DownloadTaskManager {
        &self.downloads
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn events(&self) -> &EventBus {
        &self.event_bus
    }

    /// A fresh subscription to every core event.
    pub fn event_stream(&self) -> EventStream {
        EventStream::new(self.event_bus.subscribe())
    }

    /// `None` unless notification sync is enabled and a media session was
    /// injected.
    pub fn notifications(&self) -> Option<&NotificationSync> {
        self.notifications.as_ref()
    }

    /// Parses `source` and plays it.
    pub async fn play(&self, song_id: &str, source: &str) -> Result<()> {
        let source = MediaSource::parse(source)?;
        self.playback
            .play_source(PlaySourceRequest::new(song_id, source))
            .await?;
        Ok(())
    }

    /// Parses `source` and starts a background download into the cache.
    pub fn download(&self, task_id: &str, source: &str) -> Result<StartOutcome> {
        let source = MediaSource::parse(source)?;
        Ok(self.downloads.start_download(task_id, source)?)
    }

    /// Display metadata for a YouTube link, without downloading anything.
    pub async fn video_metadata(&self, url: &str) -> Result<VideoMetadata> {
        let source = MediaSource::parse(url)?;
        let video_id = source
            .video_id()
            .ok_or_else(|| core_playback::PlaybackError::UnsupportedSource(source.key()))?;
        Ok(self.resolver.metadata(video_id).await?)
    }

    pub fn set_completion_handler(&self, handler: Arc<dyn SongCompletionHandler>) {
        self.playback.set_completion_handler(handler);
    }

    /// Routes notification skip buttons to the host queue. Ignored when
    /// notification sync is off.
    pub fn set_track_navigator(&self, navigator: Arc<dyn TrackNavigator>) {
        if let Some(sync) = &self.notifications {
            sync.set_navigator(navigator);
        }
    }

    /// Stops playback, cancels downloads, ends every background pump and
    /// writes pending cache access times.
    pub async fn shutdown(&self) -> Result<()> {
        if let Some(sync) = &self.notifications {
            sync.shutdown();
        }
        let cancelled = self.downloads.cancel_all();
        let stopped = self.playback.stop().await;
        self.playback.shutdown();
        let flushed = self.cache.flush().await;

        info!(cancelled_downloads = cancelled, "Core service shut down");
        stopped?;
        flushed?;
        Ok(())
    }
}
