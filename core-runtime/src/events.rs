//! # Event Bus System
//!
//! Typed events for the streaming core, delivered over `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: one enum per domain (downloads, playback, cache)
//! - **EventBus**: the broadcast channel every service publishes into
//! - **EventStream**: a receiver wrapper with an optional filter
//!
//! The bus is the presentation callback surface. A host that wants
//! "on progress / on status / on complete / on error" callbacks subscribes
//! once and matches on [`DownloadEvent`].
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐   emit   ┌───────────┐
//! │ DownloadManager  ├─────────>│           │
//! └──────────────────┘          │           │
//!                               │ EventBus  │   subscribe   ┌────────────┐
//! ┌──────────────────┐   emit   │ (broadcast├──────────────>│ UI / host  │
//! │ PlaybackEngine   ├─────────>│  channel) │               └────────────┘
//! └──────────────────┘          │           │
//!                               │           │   subscribe   ┌────────────┐
//! ┌──────────────────┐   emit   │           ├──────────────>│ Analytics  │
//! │ CacheStore       ├─────────>│           │               └────────────┘
//! └──────────────────┘          └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, DownloadEvent, EventBus, EventStream};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(64);
//! let mut downloads =
//!     EventStream::new(bus.subscribe()).filter(|event| matches!(event, CoreEvent::Download(_)));
//!
//! bus.emit(CoreEvent::Download(DownloadEvent::Progress {
//!     task_id: "song-1".to_string(),
//!     fraction: 0.25,
//!     downloaded_bytes: 262_144,
//!     total_bytes: Some(1_048_576),
//! }))
//! .ok();
//!
//! let event = downloads.recv().await.unwrap();
//! assert_eq!(event.description(), "Download progress");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber fell behind and missed `n`
//!   events. Non-fatal; keep receiving.
//! - **`RecvError::Closed`**: every sender is gone. Treat as shutdown.
//!
//! `emit` fails only when nobody is subscribed. Publishers ignore that.

use core_async::sync::broadcast;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use core_async::sync::broadcast::error::{RecvError, SendError};
pub use core_async::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Progress events arrive at most every throttle window per task, so a
/// hundred slots cover several concurrent downloads.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Download task lifecycle and progress
    Download(DownloadEvent),
    /// Playback transport and errors
    Playback(PlaybackEvent),
    /// Cache index changes
    Cache(CacheEvent),
}

impl CoreEvent {
    /// Short human-readable description.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Download(e) => e.description(),
            CoreEvent::Playback(e) => e.description(),
            CoreEvent::Cache(e) => e.description(),
        }
    }

    /// Severity used by hosts to decide whether to surface the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Download(DownloadEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Playback(PlaybackEvent::Error { .. }) => EventSeverity::Error,
            CoreEvent::Cache(CacheEvent::EntryInvalidated { .. }) => EventSeverity::Warning,
            CoreEvent::Download(DownloadEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Playback(PlaybackEvent::Started { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Download Events
// ============================================================================

/// Download task events, keyed by the caller-supplied task id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum DownloadEvent {
    /// A task entered the manager.
    Queued { task_id: String, source_key: String },
    /// The task moved to a new state (`pending`, `resolving`, ...).
    StatusChanged { task_id: String, status: String },
    /// Throttled transfer progress.
    Progress {
        task_id: String,
        /// Completed fraction in `0.0..=1.0`.
        fraction: f32,
        downloaded_bytes: u64,
        total_bytes: Option<u64>,
    },
    /// The file is verified and cached.
    Completed {
        task_id: String,
        local_path: String,
        size_bytes: u64,
    },
    /// The task failed; `message` is a single line.
    Failed { task_id: String, message: String },
    Cancelled { task_id: String },
    /// The task's grace period ended and it left the task list.
    Removed { task_id: String },
}

impl DownloadEvent {
    fn description(&self) -> &str {
        match self {
            DownloadEvent::Queued { .. } => "Download queued",
            DownloadEvent::StatusChanged { .. } => "Download status changed",
            DownloadEvent::Progress { .. } => "Download progress",
            DownloadEvent::Completed { .. } => "Download completed",
            DownloadEvent::Failed { .. } => "Download failed",
            DownloadEvent::Cancelled { .. } => "Download cancelled",
            DownloadEvent::Removed { .. } => "Download removed",
        }
    }

    /// Task the event belongs to.
    pub fn task_id(&self) -> &str {
        match self {
            DownloadEvent::Queued { task_id, .. }
            | DownloadEvent::StatusChanged { task_id, .. }
            | DownloadEvent::Progress { task_id, .. }
            | DownloadEvent::Completed { task_id, .. }
            | DownloadEvent::Failed { task_id, .. }
            | DownloadEvent::Cancelled { task_id }
            | DownloadEvent::Removed { task_id } => task_id,
        }
    }
}

// ============================================================================
// Playback Events
// ============================================================================

/// Playback engine events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum PlaybackEvent {
    /// A `play_source` call started loading.
    Loading { song_id: String },
    Started { song_id: String, title: String },
    Paused { song_id: String, position_ms: u64 },
    Resumed { song_id: String, position_ms: u64 },
    Stopped { song_id: Option<String> },
    Seeked { song_id: String, position_ms: u64 },
    /// The track reached its natural end.
    Completed { song_id: String },
    /// An audio-session interruption began.
    Interrupted { kind: String },
    /// An interruption ended; `resumed` tells whether playback restarted.
    InterruptionEnded { kind: String, resumed: bool },
    Error {
        song_id: Option<String>,
        message: String,
        recoverable: bool,
    },
}

impl PlaybackEvent {
    fn description(&self) -> &str {
        match self {
            PlaybackEvent::Loading { .. } => "Loading track",
            PlaybackEvent::Started { .. } => "Playback started",
            PlaybackEvent::Paused { .. } => "Playback paused",
            PlaybackEvent::Resumed { .. } => "Playback resumed",
            PlaybackEvent::Stopped { .. } => "Playback stopped",
            PlaybackEvent::Seeked { .. } => "Playback position changed",
            PlaybackEvent::Completed { .. } => "Track completed",
            PlaybackEvent::Interrupted { .. } => "Playback interrupted",
            PlaybackEvent::InterruptionEnded { .. } => "Interruption ended",
            PlaybackEvent::Error { .. } => "Playback error",
        }
    }
}

// ============================================================================
// Cache Events
// ============================================================================

/// Media cache events, keyed by source key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum CacheEvent {
    EntryAdded { key: String, size_bytes: u64 },
    /// A lookup found the backing file missing or undersized and dropped the entry.
    EntryInvalidated { key: String, reason: String },
    EntryRemoved { key: String },
    /// The entry was dropped to bring the cache under its size budget.
    Evicted { key: String, size_bytes: u64 },
    Cleared { entries_removed: usize },
}

impl CacheEvent {
    fn description(&self) -> &str {
        match self {
            CacheEvent::EntryAdded { .. } => "Cache entry added",
            CacheEvent::EntryInvalidated { .. } => "Cache entry invalidated",
            CacheEvent::EntryRemoved { .. } => "Cache entry removed",
            CacheEvent::Evicted { .. } => "Cache entry evicted",
            CacheEvent::Cleared { .. } => "Cache cleared",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Broadcast channel shared by every core service.
///
/// Cloning is cheap and every clone publishes into the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a bus that buffers up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a bus with [`DEFAULT_EVENT_BUFFER_SIZE`].
    #[allow(clippy::should_implement_trait)]
    pub fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }

    /// Publishes an event to every current subscriber.
    ///
    /// Returns the number of subscribers reached, or an error when there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// Receiver wrapper that skips events rejected by a filter.
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only yield events for which `predicate` returns `true`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Waits for the next matching event.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Returns the next buffered matching event, or `None` when nothing is buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(task_id: &str, fraction: f32) -> CoreEvent {
        CoreEvent::Download(DownloadEvent::Progress {
            task_id: task_id.to_string(),
            fraction,
            downloaded_bytes: (fraction * 1000.0) as u64,
            total_bytes: Some(1000),
        })
    }

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(progress("song-1", 0.5)).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = CoreEvent::Cache(CacheEvent::EntryAdded {
            key: "dQw4w9WgXcQ".to_string(),
            size_bytes: 4_000_000,
        });
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Playback(_)));

        bus.emit(progress("song-1", 0.1)).ok();
        let playback = CoreEvent::Playback(PlaybackEvent::Completed {
            song_id: "song-1".to_string(),
        });
        bus.emit(playback.clone()).ok();

        assert_eq!(stream.recv().await.unwrap(), playback);
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(progress("song-1", i as f32 / 10.0)).ok();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity() {
        let failed = CoreEvent::Download(DownloadEvent::Failed {
            task_id: "song-1".to_string(),
            message: "No connectivity".to_string(),
        });
        assert_eq!(failed.severity(), EventSeverity::Error);

        let invalidated = CoreEvent::Cache(CacheEvent::EntryInvalidated {
            key: "dQw4w9WgXcQ".to_string(),
            reason: "file missing".to_string(),
        });
        assert_eq!(invalidated.severity(), EventSeverity::Warning);

        let started = CoreEvent::Playback(PlaybackEvent::Started {
            song_id: "song-1".to_string(),
            title: "Song".to_string(),
        });
        assert_eq!(started.severity(), EventSeverity::Info);

        assert_eq!(progress("song-1", 0.3).severity(), EventSeverity::Debug);
    }

    #[test]
    fn test_download_event_task_id() {
        let event = DownloadEvent::Removed {
            task_id: "song-9".to_string(),
        };
        assert_eq!(event.task_id(), "song-9");
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = CoreEvent::Download(DownloadEvent::Completed {
            task_id: "song-1".to_string(),
            local_path: "/cache/tracks/dQw4w9WgXcQ_Song.m4a".to_string(),
            size_bytes: 2048,
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Download");
        assert_eq!(json["payload"]["event"], "Completed");

        let back: CoreEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[tokio::test]
    async fn test_try_recv() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe());
        assert!(stream.try_recv().is_none());

        let event = CoreEvent::Cache(CacheEvent::Cleared { entries_removed: 3 });
        bus.emit(event.clone()).ok();

        let received = stream.try_recv().unwrap().unwrap();
        assert_eq!(received, event);
    }
}
