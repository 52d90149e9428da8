//! VidFeed Common Utilities
//!
//! Shared infrastructure for all VidFeed crates:
//! - Error types and result aliases
//! - Drift and frame-rate utilities for real-time passes
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
