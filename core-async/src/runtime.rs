//! Runtime handles.
//!
//! Used by code that may be invoked outside a task, such as the logging layer
//! forwarding events to a host sink.

pub use tokio::runtime::{Builder, Handle, Runtime};

/// Runs `future` to completion on a throwaway current-thread runtime.
///
/// Returns `None` if the runtime could not be built.
pub fn block_on<F>(future: F) -> Option<F::Output>
where
    F: std::future::Future,
{
    Builder::new_current_thread()
        .enable_all()
        .build()
        .ok()
        .map(|runtime| runtime.block_on(future))
}
