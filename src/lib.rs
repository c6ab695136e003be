//! Workspace umbrella crate.
//!
//! This crate exposes the feature flags that map onto the individual
//! workspace crates (`core-service`, `bridge-desktop`). Host applications can
//! depend on `tunestream-workspace` and enable `desktop-shims` or `youtube`
//! without wiring each crate individually.

#[cfg(any(feature = "desktop-shims", feature = "youtube"))]
pub use core_service::{CoreError, CoreService, PlaybackTuning};

#[cfg(feature = "youtube")]
pub use bridge_desktop::YtdlStreamProvider;
