//! VidFeed Editing Core
//!
//! Pure editor state that feeds the render engine:
//! - **Filters:** the static filter catalog with an always-present identity entry
//! - **Sequencer:** the ordered, reorderable clip list used by merge renders
//! - **Trim:** the validated start/end selector used by trim renders
//! - **Progress:** completion estimates from elapsed media time
//!
//! Nothing in this crate touches media; durations come in through the
//! [`sequencer::DurationProbe`] seam.

pub mod filters;
pub mod progress;
pub mod sequencer;
pub mod trim;
