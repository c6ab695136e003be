//! # Media Cache Module
//!
//! Content-addressed storage for downloaded audio.
//!
//! ## Overview
//!
//! Every remote source is cached under its [`MediaSource::key`]: the video id
//! for YouTube, the URL otherwise. Key features:
//! - Persistent JSON index written with temp-then-rename
//! - Lazy invalidation: stale entries are dropped when looked up
//! - Size budget with LRU, FIFO or largest-first eviction
//! - All disk access through `FileSystemAccess`
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────┐
//! │     CacheStore                         │
//! │  - lookup() / put()                    │
//! │  - remove() / clear() / prune()        │
//! │  - stats()                             │
//! └────────┬───────────────────────────────┘
//!          │
//!          ├──> FileSystemAccess (Storage)
//!          ├──> Clock (entry timestamps)
//!          └──> EventBus (CacheEvent)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_playback::cache::{CacheConfig, CacheStore};
//!
//! # async fn example(store: &CacheStore) -> Result<(), Box<dyn std::error::Error>> {
//! if let Some(entry) = store.lookup("dQw4w9WgXcQ").await? {
//!     println!("Cached at {}", entry.local_path.display());
//! }
//!
//! let stats = store.stats().await?;
//! println!("Cache usage: {:.1}%", stats.usage_percentage());
//! # Ok(())
//! # }
//! ```
//!
//! [`MediaSource::key`]: crate::source::MediaSource::key

pub mod config;
pub mod naming;
pub mod stats;
pub mod store;

// Re-export commonly used types
pub use config::{CacheConfig, EvictionPolicy};
pub use stats::CacheStats;
pub use store::{CacheEntry, CacheStore};
