//! # Core Configuration Module
//!
//! Bridge wiring and global settings for the streaming core.
//!
//! ## Overview
//!
//! The configuration system uses a builder to construct a [`CoreConfig`]
//! that holds every bridge the core talks to. It fails fast: a missing
//! required bridge is reported by [`CoreConfigBuilder::build`], never on
//! first use.
//!
//! ## Required Dependencies
//!
//! - `AudioPlayer` - the platform audio engine; always host supplied
//! - `cache_dir` - directory owned by the media cache
//!
//! ## Optional Dependencies (with platform defaults)
//!
//! - `HttpClient` - stream downloads (desktop default: reqwest)
//! - `FileSystemAccess` - cache I/O (desktop default: tokio fs)
//! - `NetworkMonitor` - pre-flight connectivity probe (desktop default: DNS lookup)
//! - `StreamProvider` - YouTube manifests (desktop default: rusty_ytdl)
//! - `AudioSessionObserver` - interruptions; without it none are handled
//! - `MediaSession` - OS notification; without it nothing is mirrored
//! - `Clock` - defaults to the system clock
//!
//! With the `desktop-shims` feature the desktop defaults are injected when a
//! bridge is not provided. Without it, every bridge in the first group must
//! be supplied by the host.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .cache_dir("/path/to/cache")
//!     .audio_player(Arc::new(MyPlayer::new()))
//!     .media_session(Arc::new(MyNotification::new()))
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::CoreConfig;
//!
//! // No audio player: fails with an actionable CapabilityMissing error
//! let config = CoreConfig::builder()
//!     .cache_dir("/path/to/cache")
//!     .build()
//!     .expect("Should fail - missing audio player");
//! ```

use crate::error::{Error, Result};
use bridge_traits::{
    AudioPlayer, AudioSessionObserver, Clock, FileSystemAccess, HttpClient, MediaSession,
    NetworkMonitor, StreamProvider, SystemClock,
};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default cache budget: 1 GB.
pub const DEFAULT_CACHE_SIZE_MB: usize = 1024;

/// Core configuration for the streaming core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Directory owned by the media cache
    pub cache_dir: PathBuf,

    /// Maximum cache size in megabytes
    pub cache_size_mb: usize,

    /// Platform audio player (required)
    pub audio_player: Arc<dyn AudioPlayer>,

    /// HTTP client for stream downloads
    pub http_client: Arc<dyn HttpClient>,

    /// File system access abstraction
    pub file_system: Arc<dyn FileSystemAccess>,

    /// Connectivity probe used before each download
    pub network_monitor: Arc<dyn NetworkMonitor>,

    /// YouTube manifest provider
    pub stream_provider: Arc<dyn StreamProvider>,

    /// Audio-session interruption source (optional)
    pub audio_session: Option<Arc<dyn AudioSessionObserver>>,

    /// OS media session (optional)
    pub media_session: Option<Arc<dyn MediaSession>>,

    /// Wall clock for cache timestamps
    pub clock: Arc<dyn Clock>,

    /// Per-subscriber buffer of the event bus
    pub event_buffer_size: usize,

    /// Feature flags
    pub features: FeatureFlags,
}

impl fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreConfig")
            .field("cache_dir", &self.cache_dir)
            .field("cache_size_mb", &self.cache_size_mb)
            .field("audio_player", &"AudioPlayer { ... }")
            .field("http_client", &"HttpClient { ... }")
            .field("file_system", &"FileSystemAccess { ... }")
            .field("network_monitor", &"NetworkMonitor { ... }")
            .field("stream_provider", &"StreamProvider { ... }")
            .field(
                "audio_session",
                &self
                    .audio_session
                    .as_ref()
                    .map(|_| "AudioSessionObserver { ... }"),
            )
            .field(
                "media_session",
                &self.media_session.as_ref().map(|_| "MediaSession { ... }"),
            )
            .field("event_buffer_size", &self.event_buffer_size)
            .field("features", &self.features)
            .finish()
    }
}

/// Feature flags control optional functionality.
///
/// A flag that needs a bridge is rejected by [`CoreConfig::validate`] when
/// the bridge is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Mirror playback into the OS media session (requires MediaSession)
    pub enable_notification_sync: bool,

    /// React to audio-focus interruptions (requires AudioSessionObserver)
    pub enable_interruption_handling: bool,

    /// Cache YouTube tracks fetched by `play_source`
    pub enable_play_through_cache: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_notification_sync: false,
            enable_interruption_handling: false,
            enable_play_through_cache: true,
        }
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder();
    /// ```
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Cache budget in bytes.
    pub fn cache_size_bytes(&self) -> u64 {
        self.cache_size_mb as u64 * 1024 * 1024
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Cache directory is not empty
    /// - Cache size is reasonable (> 0 and < 100GB)
    /// - The event buffer is not zero-sized
    /// - Feature flags are consistent with available bridges
    pub fn validate(&self) -> Result<()> {
        if self.cache_dir.as_os_str().is_empty() {
            return Err(Error::Config("Cache directory cannot be empty".to_string()));
        }

        if self.cache_size_mb == 0 {
            return Err(Error::Config(
                "Cache size must be greater than 0 MB".to_string(),
            ));
        }

        if self.cache_size_mb > 100_000 {
            return Err(Error::Config(
                "Cache size exceeds maximum of 100GB (100,000 MB)".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if self.features.enable_notification_sync && self.media_session.is_none() {
            return Err(Error::Config(
                "Notification sync enabled but no MediaSession provided. \
                 Disable the feature or inject a MediaSession implementation."
                    .to_string(),
            ));
        }

        if self.features.enable_interruption_handling && self.audio_session.is_none() {
            return Err(Error::Config(
                "Interruption handling enabled but no AudioSessionObserver provided. \
                 Disable the feature or inject an AudioSessionObserver implementation."
                    .to_string(),
            ));
        }

        Ok(())
    }
}

fn audio_player_missing_error() -> Error {
    Error::capability_missing(
        "AudioPlayer",
        "AudioPlayer implementation is required for playback. \
         Android: wrap ExoPlayer. iOS: wrap AVPlayer. \
         Desktop: inject a rodio- or gstreamer-backed player.",
    )
}

#[cfg(not(feature = "desktop-shims"))]
fn http_client_missing_error() -> Error {
    Error::capability_missing(
        "HttpClient",
        "HttpClient implementation is required for stream downloads. \
         Desktop: ensure the 'desktop-shims' feature is enabled to use the default ReqwestHttpClient. \
         Mobile: inject a client backed by OkHttp or URLSession.",
    )
}

#[cfg(not(feature = "desktop-shims"))]
fn file_system_missing_error() -> Error {
    Error::capability_missing(
        "FileSystemAccess",
        "FileSystemAccess implementation is required for the media cache. \
         Desktop: ensure the 'desktop-shims' feature is enabled to use the default TokioFileSystem. \
         Mobile: inject an adapter for the app sandbox cache directory.",
    )
}

#[cfg(not(feature = "desktop-shims"))]
fn network_monitor_missing_error() -> Error {
    Error::capability_missing(
        "NetworkMonitor",
        "NetworkMonitor implementation is required for the pre-download connectivity probe. \
         Desktop: ensure the 'desktop-shims' feature is enabled to use the default DesktopNetworkMonitor. \
         Mobile: inject ConnectivityManager or NWPathMonitor.",
    )
}

#[cfg(not(feature = "desktop-shims"))]
fn stream_provider_missing_error() -> Error {
    Error::capability_missing(
        "StreamProvider",
        "StreamProvider implementation is required to resolve YouTube sources. \
         Desktop: ensure the 'desktop-shims' feature is enabled to use the default YtdlStreamProvider.",
    )
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::new()
        .map_err(|e| Error::Internal(format!("Failed to create default HttpClient: {}", e)))?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(http_client_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_file_system(cache_dir: &Path) -> Result<Arc<dyn FileSystemAccess>> {
    use bridge_desktop::TokioFileSystem;

    Ok(Arc::new(TokioFileSystem::with_cache_directory(cache_dir)))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_file_system(_cache_dir: &Path) -> Result<Arc<dyn FileSystemAccess>> {
    Err(file_system_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_network_monitor() -> Result<Arc<dyn NetworkMonitor>> {
    use bridge_desktop::DesktopNetworkMonitor;

    Ok(Arc::new(DesktopNetworkMonitor::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_network_monitor() -> Result<Arc<dyn NetworkMonitor>> {
    Err(network_monitor_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_stream_provider() -> Result<Arc<dyn StreamProvider>> {
    use bridge_desktop::YtdlStreamProvider;

    Ok(Arc::new(YtdlStreamProvider::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_stream_provider() -> Result<Arc<dyn StreamProvider>> {
    Err(stream_provider_missing_error())
}

/// Builder for constructing [`CoreConfig`] instances.
///
/// Set options incrementally, then call
/// [`build()`](CoreConfigBuilder::build).
#[derive(Default)]
pub struct CoreConfigBuilder {
    cache_dir: Option<PathBuf>,
    cache_size_mb: Option<usize>,
    audio_player: Option<Arc<dyn AudioPlayer>>,
    http_client: Option<Arc<dyn HttpClient>>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    stream_provider: Option<Arc<dyn StreamProvider>>,
    audio_session: Option<Arc<dyn AudioSessionObserver>>,
    media_session: Option<Arc<dyn MediaSession>>,
    clock: Option<Arc<dyn Clock>>,
    event_buffer_size: Option<usize>,
    features: Option<FeatureFlags>,
}

impl CoreConfigBuilder {
    /// Sets the cache directory.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory the media cache owns exclusively
    ///
    /// # Examples
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder()
    ///     .cache_dir("/path/to/cache");
    /// ```
    pub fn cache_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.cache_dir = Some(path.into());
        self
    }

    /// Sets the cache budget in megabytes (default: 1024).
    pub fn cache_size_mb(mut self, size_mb: usize) -> Self {
        self.cache_size_mb = Some(size_mb);
        self
    }

    /// Sets the platform audio player. Required.
    pub fn audio_player(mut self, player: Arc<dyn AudioPlayer>) -> Self {
        self.audio_player = Some(player);
        self
    }

    /// Sets a custom HTTP client.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets a custom file system implementation.
    pub fn file_system(mut self, fs: Arc<dyn FileSystemAccess>) -> Self {
        self.file_system = Some(fs);
        self
    }

    /// Sets the connectivity monitor.
    pub fn network_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.network_monitor = Some(monitor);
        self
    }

    /// Sets the YouTube manifest provider.
    pub fn stream_provider(mut self, provider: Arc<dyn StreamProvider>) -> Self {
        self.stream_provider = Some(provider);
        self
    }

    /// Sets the audio-session observer and turns interruption handling on.
    pub fn audio_session(mut self, observer: Arc<dyn AudioSessionObserver>) -> Self {
        self.audio_session = Some(observer);
        let mut features = self.features.unwrap_or_default();
        features.enable_interruption_handling = true;
        self.features = Some(features);
        self
    }

    /// Sets the OS media session and turns notification sync on.
    pub fn media_session(mut self, session: Arc<dyn MediaSession>) -> Self {
        self.media_session = Some(session);
        let mut features = self.features.unwrap_or_default();
        features.enable_notification_sync = true;
        self.features = Some(features);
        self
    }

    /// Sets the clock used for cache timestamps.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets the event bus buffer size.
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Replaces all feature flags.
    pub fn features(mut self, features: FeatureFlags) -> Self {
        self.features = Some(features);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Returns
    ///
    /// Returns `Ok(CoreConfig)` on success, or an error if:
    /// - The cache directory or audio player is missing
    /// - A bridge without a default is missing
    /// - Configuration values are invalid
    /// - Feature flags are inconsistent with available bridges
    pub fn build(self) -> Result<CoreConfig> {
        let cache_dir = self.cache_dir.ok_or_else(|| {
            Error::Config("Cache directory is required. Use .cache_dir() to set it.".to_string())
        })?;

        let audio_player = self.audio_player.ok_or_else(audio_player_missing_error)?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let file_system = match self.file_system {
            Some(fs) => fs,
            None => provide_default_file_system(&cache_dir)?,
        };

        let network_monitor = match self.network_monitor {
            Some(monitor) => monitor,
            None => provide_default_network_monitor()?,
        };

        let stream_provider = match self.stream_provider {
            Some(provider) => provider,
            None => provide_default_stream_provider()?,
        };

        let config = CoreConfig {
            cache_dir,
            cache_size_mb: self.cache_size_mb.unwrap_or(DEFAULT_CACHE_SIZE_MB),
            audio_player,
            http_client,
            file_system,
            network_monitor,
            stream_provider,
            audio_session: self.audio_session,
            media_session: self.media_session,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            event_buffer_size: self
                .event_buffer_size
                .unwrap_or(crate::events::DEFAULT_EVENT_BUFFER_SIZE),
            features: self.features.unwrap_or_default(),
        };

        config.validate()?;

        Ok(config)
    }
}
