//! Task spawning.
//!
//! Background work (download pipelines, grace-period timers, event pumps)
//! runs as ordinary tokio tasks on the host runtime; nothing in the core
//! owns a private event loop.

pub use tokio::task::{yield_now, AbortHandle, JoinError, JoinHandle, JoinSet};

/// Spawns a future onto the current runtime.
///
/// # Examples
///
/// ```rust
/// use core_async::task::spawn;
///
/// # async fn example() {
/// let handle = spawn(async { 42 });
/// assert_eq!(handle.await.unwrap(), 42);
/// # }
/// ```
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::task::spawn(future)
}

/// Result type for joined tasks.
pub type Result<T> = std::result::Result<T, JoinError>;
