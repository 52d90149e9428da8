//! Trim windows over a single source timeline.

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// A `[start, end)` window in seconds.
///
/// Values built through [`TrimRange::new`] satisfy
/// `0 <= start < end <= duration`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrimRange {
    pub start: f64,
    pub end: f64,
}

impl TrimRange {
    /// Validate a window against the source duration.
    pub fn new(start: f64, end: f64, duration: f64) -> Result<Self, ModelError> {
        if Self::is_valid(start, end, duration) {
            Ok(Self { start, end })
        } else {
            Err(ModelError::InvalidTrimRange {
                start,
                end,
                duration,
            })
        }
    }

    /// The whole source.
    pub fn full(duration: f64) -> Result<Self, ModelError> {
        Self::new(0.0, duration, duration)
    }

    pub fn is_valid(start: f64, end: f64, duration: f64) -> bool {
        start.is_finite()
            && end.is_finite()
            && duration.is_finite()
            && 0.0 <= start
            && start < end
            && end <= duration
    }

    /// Window length in seconds.
    pub fn len(&self) -> f64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 0.0
    }

    /// Whether a source timestamp falls inside the window.
    pub fn contains(&self, secs: f64) -> bool {
        secs >= self.start && secs < self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn full_range_spans_source() {
        let range = TrimRange::full(12.0).unwrap();
        assert_eq!(range, TrimRange { start: 0.0, end: 12.0 });
        assert!((range.len() - 12.0).abs() < 1e-12);
        assert!(range.contains(11.99));
        assert!(!range.contains(12.0));
    }

    #[test]
    fn rejects_inverted_and_out_of_bounds() {
        assert!(TrimRange::new(5.0, 3.0, 12.0).is_err());
        assert!(TrimRange::new(5.0, 5.0, 12.0).is_err());
        assert!(TrimRange::new(-0.1, 3.0, 12.0).is_err());
        assert!(TrimRange::new(1.0, 12.5, 12.0).is_err());
        assert!(TrimRange::full(0.0).is_err());
        assert!(TrimRange::new(f64::NAN, 1.0, 2.0).is_err());
    }

    proptest! {
        #[test]
        fn valid_windows_have_positive_length(
            duration in 0.01f64..600.0,
            a in 0.0f64..1.0,
            b in 0.0f64..1.0,
        ) {
            let (start, end) = (a.min(b) * duration, a.max(b) * duration);
            match TrimRange::new(start, end, duration) {
                Ok(range) => prop_assert!(range.len() > 0.0 && range.end <= duration),
                Err(_) => prop_assert!(start >= end),
            }
        }
    }
}
