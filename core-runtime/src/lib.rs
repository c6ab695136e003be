//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the streaming core:
//! - Logging and tracing infrastructure
//! - Configuration and bridge wiring
//! - Event bus for download, playback and cache events
//!
//! ## Overview
//!
//! Every other core crate depends on this one. It fixes the logging
//! conventions, the fail-fast configuration rules and the broadcast event
//! surface hosts subscribe to.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
