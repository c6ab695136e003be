//! # Downloads
//!
//! - [`DownloadEngine`] moves bytes for a single resolved stream
//! - [`DownloadTaskManager`] runs background tasks that fill the cache and
//!   reports their progress

pub mod engine;
pub mod manager;
pub mod progress;
pub mod task;

pub use engine::{DownloadEngine, DownloadedFile};
pub use manager::DownloadTaskManager;
pub use progress::{DownloadProgress, TransferProgress};
pub use task::{DownloadState, DownloadTask, StartOutcome, TaskListUpdate, UpdateCause};
