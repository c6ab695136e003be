//! # Playback & Streaming Module
//!
//! Resolves media sources, downloads them into a local cache and drives the
//! host's audio player.
//!
//! ## Overview
//!
//! This module handles:
//! - Source classification (local files, direct URLs, YouTube links)
//! - Stream negotiation for YouTube videos
//! - Background downloads with observable, throttled progress
//! - A size-bounded, self-healing media cache
//! - Playback orchestration with interruption handling
//! - Mirroring playback state into the OS media session

pub mod cache;
pub mod config;
pub mod download;
pub mod engine;
pub mod error;
pub mod notification;
pub mod resolver;
pub mod session;
pub mod source;

pub use cache::{CacheConfig, CacheEntry, CacheStats, CacheStore, EvictionPolicy};
pub use config::{DownloadConfig, PlayerConfig};
pub use download::{
    DownloadEngine, DownloadState, DownloadTask, DownloadTaskManager, StartOutcome,
    TaskListUpdate, UpdateCause,
};
pub use engine::{PlaySourceRequest, PlaybackEngine, SongCompletionHandler};
pub use error::{
    CacheError, DownloadError, PlaybackError, ResolveError, Result, SourceError,
};
pub use notification::{NotificationSync, TrackNavigator, SUPPORTED_ACTIONS};
pub use resolver::{ResolvedStream, StreamHandle, StreamResolver};
pub use session::{LoopMode, PlaybackSession, PlaybackStatus, TrackMetadata};
pub use source::{extract_video_id, MediaSource, VideoId};
