//! Completion estimates from elapsed media time.
//!
//! Passes run at playback speed, so the only reliable measure of progress is
//! how much media has been played against how much is expected in total.

use vidfeed_feed_model::render::RenderMode;

/// Highest percentage reported while a job is still running.
pub const RUNNING_CAP_PERCENT: f64 = 99.0;

/// Estimate completion in `[0, 99]`.
///
/// `completed_before` is the media time covered by finished passes (always 0
/// in trim mode), `current_elapsed` the media time played in the current
/// pass, and `total_expected` the sum of clip durations (merge) or the trim
/// window length (trim). An unknown or zero total yields 0.
pub fn estimate(
    mode: RenderMode,
    completed_before: f64,
    current_elapsed: f64,
    total_expected: f64,
) -> f64 {
    if !(total_expected.is_finite() && total_expected > 0.0) {
        return 0.0;
    }
    let completed = match mode {
        RenderMode::Trim => 0.0,
        RenderMode::Merge => sanitize(completed_before),
    };
    let done = completed + sanitize(current_elapsed);
    (done / total_expected * 100.0).clamp(0.0, RUNNING_CAP_PERCENT)
}

fn sanitize(secs: f64) -> f64 {
    if secs.is_finite() {
        secs.max(0.0)
    } else {
        0.0
    }
}

/// Job-wide progress that never moves backwards and only reaches 100 through
/// [`ProgressTracker::complete`].
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    mode: RenderMode,
    total_expected: f64,
    completed_before: f64,
    percent: f64,
}

impl ProgressTracker {
    pub fn new(mode: RenderMode, total_expected: f64) -> Self {
        Self {
            mode,
            total_expected,
            completed_before: 0.0,
            percent: 0.0,
        }
    }

    /// Record a frame tick of the current pass and return the new percentage.
    pub fn tick(&mut self, current_elapsed: f64) -> f64 {
        let next = estimate(
            self.mode,
            self.completed_before,
            current_elapsed,
            self.total_expected,
        );
        self.percent = self.percent.max(next);
        self.percent
    }

    /// Close the current pass after `pass_secs` of media and return the
    /// boundary percentage.
    pub fn finish_pass(&mut self, pass_secs: f64) -> f64 {
        self.completed_before += sanitize(pass_secs);
        self.tick(0.0)
    }

    /// Media time covered by finished passes.
    pub fn completed_before(&self) -> f64 {
        self.completed_before
    }

    pub fn percent(&self) -> f64 {
        self.percent
    }

    /// Mark the job finished. Only valid once output exists.
    pub fn complete(&mut self) -> f64 {
        self.percent = 100.0;
        self.percent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn zero_or_unknown_total_is_zero() {
        assert_eq!(estimate(RenderMode::Trim, 0.0, 3.0, 0.0), 0.0);
        assert_eq!(estimate(RenderMode::Merge, 2.0, 3.0, f64::NAN), 0.0);
    }

    #[test]
    fn caps_at_ninety_nine() {
        assert_eq!(estimate(RenderMode::Trim, 0.0, 12.0, 10.0), RUNNING_CAP_PERCENT);
    }

    #[test]
    fn merge_scenario_four_plus_six() {
        let mut tracker = ProgressTracker::new(RenderMode::Merge, 10.0);
        tracker.tick(2.0);
        assert!((tracker.finish_pass(4.0) - 40.0).abs() < 1e-9);
        assert!((tracker.tick(3.0) - 70.0).abs() < 1e-9);
        assert_eq!(tracker.complete(), 100.0);
    }

    #[test]
    fn trim_mode_ignores_completed_before() {
        assert!((estimate(RenderMode::Trim, 5.0, 1.0, 4.0) - 25.0).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn tracker_is_monotonic(
            durations in proptest::collection::vec(0.1f64..20.0, 1..6),
            jitter in proptest::collection::vec(-0.5f64..0.5, 1..40),
        ) {
            let total: f64 = durations.iter().sum();
            let mut tracker = ProgressTracker::new(RenderMode::Merge, total);
            let mut last = 0.0;
            for d in &durations {
                for (i, j) in jitter.iter().enumerate() {
                    let t = (i as f64 / jitter.len() as f64) * d + j;
                    let p = tracker.tick(t);
                    prop_assert!(p >= last && p <= RUNNING_CAP_PERCENT);
                    last = p;
                }
                let p = tracker.finish_pass(*d);
                prop_assert!(p >= last);
                last = p;
            }
            prop_assert_eq!(tracker.complete(), 100.0);
        }
    }
}
