//! # Desktop Bridge Implementations
//!
//! Desktop adapters for the bridge traits:
//!
//! - [`ReqwestHttpClient`] - `reqwest` with retry and streaming bodies
//! - [`TokioFileSystem`] - `tokio::fs` rooted at the OS cache directory
//! - [`DesktopNetworkMonitor`] - DNS-based connectivity probe
//! - [`YtdlStreamProvider`] - YouTube manifests via `rusty_ytdl` (feature `youtube`)
//!
//! Audio output and the media session are host UI concerns and are not
//! provided here.

mod filesystem;
mod http;
mod network;

#[cfg(feature = "youtube")]
mod youtube;

pub use filesystem::TokioFileSystem;
pub use http::ReqwestHttpClient;
pub use network::DesktopNetworkMonitor;

#[cfg(feature = "youtube")]
pub use youtube::YtdlStreamProvider;
