//! # Host Bridge Traits
//!
//! Platform abstraction traits that each host implements.
//!
//! ## Overview
//!
//! The streaming core needs a handful of capabilities that differ per
//! platform. Each one is a trait here; `bridge-desktop` ships desktop
//! adapters and mobile hosts inject their own.
//!
//! ## Traits
//!
//! ### Networking & I/O
//! - [`HttpClient`](http::HttpClient) - Byte streams for downloads
//! - [`FileSystemAccess`](storage::FileSystemAccess) - Cache directory I/O
//! - [`NetworkMonitor`](network::NetworkMonitor) - Pre-flight connectivity probe
//! - [`StreamProvider`](stream::StreamProvider) - YouTube stream manifests
//!
//! ### Audio
//! - [`AudioPlayer`](playback::AudioPlayer) - The platform audio engine
//! - [`AudioSessionObserver`](playback::AudioSessionObserver) - Interruptions and noisy-route events
//! - [`MediaSession`](media_session::MediaSession) - OS notification and lock-screen controls
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Wall-clock source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Fail-Fast Strategy
//!
//! The core fails with `CapabilityMissing` at configuration time when a
//! required bridge is absent, rather than on first use.
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Adapters
//! convert platform errors into it and keep the message actionable.
//!
//! ## Mocks
//!
//! With the `mocks` feature every async seam gets a `mockall` mock
//! (`MockHttpClient`, `MockStreamProvider`, ...) for downstream tests.

pub mod error;
pub mod http;
pub mod media_session;
pub mod network;
pub mod playback;
pub mod storage;
pub mod stream;
pub mod time;

pub use error::BridgeError;

pub use http::{ByteStream, HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use media_session::{MediaAction, MediaActionKind, MediaItem, MediaPlaybackState, MediaSession};
pub use network::{NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType};
pub use playback::{
    AudioPlayer, AudioSessionEvent, AudioSessionObserver, AudioSource, InterruptionKind,
    PlayerEvent, ProcessingState,
};
pub use storage::{FileMetadata, FileSystemAccess};
pub use stream::{StreamInfo, StreamKind, StreamManifest, StreamProvider, VideoMetadata};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, SystemClock};
