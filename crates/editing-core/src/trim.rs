//! Start/end selection over a single source.
//!
//! Invalid requests are rejected silently: the UI re-reads the selector after
//! every attempt, so a rejected value simply snaps back.

use vidfeed_feed_model::trim::TrimRange;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrimSelector {
    start: f64,
    end: f64,
    duration: f64,
}

impl TrimSelector {
    /// A selector spanning the whole source.
    pub fn new(total_duration: f64) -> Self {
        let mut selector = Self::default();
        selector.reset(total_duration);
        selector
    }

    /// Select the whole source. Non-finite or negative durations collapse to
    /// an empty selector with no valid range.
    pub fn reset(&mut self, total_duration: f64) {
        let duration = if total_duration.is_finite() && total_duration > 0.0 {
            total_duration
        } else {
            0.0
        };
        self.duration = duration;
        self.start = 0.0;
        self.end = duration;
    }

    /// Returns true when the value was accepted.
    pub fn set_start(&mut self, value: f64) -> bool {
        if TrimRange::is_valid(value, self.end, self.duration) {
            self.start = value;
            true
        } else {
            tracing::trace!(value, end = self.end, "Rejected trim start");
            false
        }
    }

    /// Returns true when the value was accepted.
    pub fn set_end(&mut self, value: f64) -> bool {
        if TrimRange::is_valid(self.start, value, self.duration) {
            self.end = value;
            true
        } else {
            tracing::trace!(value, start = self.start, "Rejected trim end");
            false
        }
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// The current window, if the source has a usable duration.
    pub fn range(&self) -> Option<TrimRange> {
        TrimRange::new(self.start, self.end, self.duration).ok()
    }
}
