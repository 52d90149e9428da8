//! Clock and timing utilities for real-time render passes.
//!
//! A pass is driven by source playback, so its wall-clock duration tracks
//! the media window it covers. Pass timing itself comes from the tokio
//! clock; this module only compares time bases and conforms a variable
//! source frame cadence to a fixed output rate.

/// Convert seconds to nanoseconds, clamping negatives to zero.
pub fn secs_to_ns(secs: f64) -> u64 {
    (secs.max(0.0) * 1_000_000_000.0) as u64
}

/// Drift measurement between two time bases.
#[derive(Debug, Clone, Copy)]
pub struct DriftMeasurement {
    /// Timestamp in the reference time base (ns).
    pub reference_ns: u64,
    /// Timestamp in the measured time base (ns).
    pub measured_ns: u64,
}

impl DriftMeasurement {
    /// Drift in nanoseconds (positive = measured is ahead).
    pub fn drift_ns(&self) -> i64 {
        self.measured_ns as i64 - self.reference_ns as i64
    }

    /// Drift in milliseconds.
    pub fn drift_ms(&self) -> f64 {
        self.drift_ns() as f64 / 1_000_000.0
    }

    /// Whether drift exceeds an acceptable threshold.
    pub fn exceeds_threshold_ms(&self, threshold_ms: f64) -> bool {
        self.drift_ms().abs() > threshold_ms
    }
}

/// Maps source frames onto a constant output frame rate.
///
/// Each incoming frame is written as many times as needed to keep the output
/// frame count at `floor(pts * fps) + 1`; a frame that arrives before its
/// output slot is due is dropped (0 copies).
#[derive(Debug)]
pub struct FrameRateConformer {
    fps: u32,
    written: u64,
}

impl FrameRateConformer {
    /// Create a conformer targeting the given output rate.
    pub fn new(fps: u32) -> Self {
        Self {
            fps: fps.max(1),
            written: 0,
        }
    }

    /// Number of output copies to emit for a frame presented at `pts_secs`
    /// on the output timeline.
    pub fn frames_due(&mut self, pts_secs: f64) -> u64 {
        let slot = (pts_secs.max(0.0) * self.fps as f64 + 1e-6).floor() as u64;
        self.advance_to(slot + 1)
    }

    /// Number of copies of the last frame needed so the output covers
    /// `secs` of timeline.
    pub fn pad_to(&mut self, secs: f64) -> u64 {
        let target = (secs.max(0.0) * self.fps as f64).round() as u64;
        self.advance_to(target)
    }

    /// Output frames accounted for so far.
    pub fn frames_written(&self) -> u64 {
        self.written
    }

    /// Output timeline covered so far, in seconds.
    pub fn written_secs(&self) -> f64 {
        self.written as f64 / self.fps as f64
    }

    /// Output frame interval in seconds.
    pub fn interval_secs(&self) -> f64 {
        1.0 / self.fps as f64
    }

    fn advance_to(&mut self, target: u64) -> u64 {
        let due = target.saturating_sub(self.written);
        self.written += due;
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secs_to_ns_clamps_negative_input() {
        assert_eq!(secs_to_ns(2.0), 2_000_000_000);
        assert_eq!(secs_to_ns(0.25), 250_000_000);
        assert_eq!(secs_to_ns(-1.0), 0);
    }

    #[test]
    fn test_drift_measurement() {
        let drift = DriftMeasurement {
            reference_ns: 1_000_000_000,
            measured_ns: 1_050_000_000,
        };
        assert_eq!(drift.drift_ns(), 50_000_000);
        assert!((drift.drift_ms() - 50.0).abs() < 1e-9);
        assert!(drift.exceeds_threshold_ms(10.0));
        assert!(!drift.exceeds_threshold_ms(100.0));

        let behind = DriftMeasurement {
            reference_ns: secs_to_ns(2.0),
            measured_ns: secs_to_ns(1.5),
        };
        assert!((behind.drift_ms() + 500.0).abs() < 1e-9);
        assert!(behind.exceeds_threshold_ms(250.0));
    }

    #[test]
    fn conformer_passes_matching_rate_through() {
        let mut conformer = FrameRateConformer::new(30);
        for i in 0..30 {
            assert_eq!(conformer.frames_due(i as f64 / 30.0), 1);
        }
        assert_eq!(conformer.frames_written(), 30);
    }

    #[test]
    fn conformer_drops_and_duplicates() {
        let mut fast = FrameRateConformer::new(30);
        let copies: u64 = (0..60).map(|i| fast.frames_due(i as f64 / 60.0)).sum();
        assert_eq!(copies, 30);

        let mut slow = FrameRateConformer::new(30);
        assert_eq!(slow.frames_due(0.0), 1);
        assert_eq!(slow.frames_due(1.0 / 15.0), 2);
    }

    #[test]
    fn conformer_pads_to_duration() {
        let mut conformer = FrameRateConformer::new(10);
        conformer.frames_due(0.0);
        assert_eq!(conformer.pad_to(1.0), 9);
        assert_eq!(conformer.pad_to(0.5), 0);
        assert!((conformer.written_secs() - 1.0).abs() < 1e-9);
    }
}
