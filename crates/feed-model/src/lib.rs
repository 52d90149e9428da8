//! VidFeed Feed Model
//!
//! Defines the core data contracts shared by the editor and the feed:
//! - **Clips:** Source media references with lazily probed durations
//! - **Trim:** Validated `[start, end)` windows over a single source
//! - **Filters:** Composable colour-matrix expressions (CSS `filter` syntax)
//! - **Render:** Job mode, status, progress snapshots, and encoded output
//! - **Feed:** Persisted posts, profiles, and integration configs
//! - **Generation:** The remote video-generation request/response contract
//!
//! All times are in seconds on the source's own timeline.

pub mod clip;
pub mod error;
pub mod feed;
pub mod filter;
pub mod generation;
pub mod render;
pub mod trim;

pub use clip::*;
pub use error::*;
pub use feed::*;
pub use filter::*;
pub use render::*;
pub use trim::*;
