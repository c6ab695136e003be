//! Async facade for the tunestream core.
//!
//! Core crates depend on this crate instead of naming tokio directly. Every
//! primitive the download and playback services need is re-exported here so
//! the runtime choice lives in one place.
//!
//! # Modules
//!
//! - `task`: task spawning and join handles
//! - `time`: sleeps, timeouts, intervals and the runtime clock
//! - `sync`: locks, channels, semaphores and cancellation tokens
//! - `io`: async read/write traits used by byte streams
//! - `fs`: file handles for partial downloads
//! - `runtime`: handles for code that runs outside an async context
//!
//! # Examples
//!
//! ```rust
//! use core_async::task;
//! use core_async::time::{sleep, Duration};
//!
//! async fn example() {
//!     let handle = task::spawn(async {
//!         sleep(Duration::from_millis(10)).await;
//!         42
//!     });
//!     assert_eq!(handle.await.unwrap(), 42);
//! }
//! ```

pub mod fs;
pub mod io;
pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

pub use task::spawn;
pub use tokio::{join, select};
pub use time::{sleep, Duration, Instant};
