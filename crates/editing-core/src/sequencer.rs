//! Ordered clip list for merge renders.
//!
//! Reordering is a pure permutation: no operation here ever adds or drops a
//! clip except `append` and `remove`.

use vidfeed_common::error::VidfeedResult;
use vidfeed_feed_model::clip::{Clip, ClipId};

/// Resolves the duration of a media source.
#[async_trait::async_trait]
pub trait DurationProbe: Send + Sync {
    async fn probe_duration(&self, uri: &str) -> VidfeedResult<f64>;
}

/// Destination of a [`ClipSequencer::move_before`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveTarget {
    /// Place the clip immediately before this one.
    Before(ClipId),
    /// Place the clip last.
    End,
}

/// The editor's clip sequence.
#[derive(Debug, Clone, Default)]
pub struct ClipSequencer {
    clips: Vec<Clip>,
}

impl ClipSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sequence seeded with the subject video of an editor session.
    pub fn with_initial(source_uri: impl Into<String>, display_name: impl Into<String>) -> Self {
        let mut sequencer = Self::new();
        sequencer.append(source_uri, display_name);
        sequencer
    }

    pub fn clips(&self) -> &[Clip] {
        &self.clips
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    pub fn ids(&self) -> Vec<ClipId> {
        self.clips.iter().map(|c| c.id).collect()
    }

    pub fn get(&self, id: ClipId) -> Option<&Clip> {
        self.clips.iter().find(|c| c.id == id)
    }

    pub fn position(&self, id: ClipId) -> Option<usize> {
        self.clips.iter().position(|c| c.id == id)
    }

    /// Add a clip at the end. Its duration stays unknown until probed.
    pub fn append(&mut self, source_uri: impl Into<String>, display_name: impl Into<String>) -> Clip {
        let clip = Clip::new(source_uri, display_name);
        tracing::debug!(clip = %clip.id, uri = %clip.source_uri, "Clip appended");
        self.clips.push(clip.clone());
        clip
    }

    /// Record a probed duration. Returns false when the clip is gone or the
    /// value is not a usable duration.
    pub fn set_duration(&mut self, id: ClipId, secs: f64) -> bool {
        if !(secs.is_finite() && secs > 0.0) {
            return false;
        }
        match self.clips.iter_mut().find(|c| c.id == id) {
            Some(clip) => {
                clip.duration_secs = Some(secs);
                true
            }
            None => false,
        }
    }

    /// Clips still waiting for a duration.
    pub fn pending_probes(&self) -> Vec<(ClipId, String)> {
        self.clips
            .iter()
            .filter(|c| !c.is_probed())
            .map(|c| (c.id, c.source_uri.clone()))
            .collect()
    }

    /// Probe every clip with an unknown duration.
    ///
    /// Failures leave the duration unknown; the clip stays in the sequence.
    /// Returns the number of clips resolved.
    pub async fn probe_durations(&mut self, probe: &dyn DurationProbe) -> usize {
        let mut resolved = 0;
        for (id, uri) in self.pending_probes() {
            match probe.probe_duration(&uri).await {
                Ok(secs) if self.set_duration(id, secs) => resolved += 1,
                Ok(secs) => {
                    tracing::warn!(clip = %id, uri = %uri, secs, "Probe returned unusable duration");
                }
                Err(e) => {
                    tracing::warn!(clip = %id, uri = %uri, error = %e, "Duration probe failed");
                }
            }
        }
        resolved
    }

    /// Remove a clip. No-op when absent.
    pub fn remove(&mut self, id: ClipId) -> Option<Clip> {
        let index = self.position(id)?;
        Some(self.clips.remove(index))
    }

    /// Move `id` so that it sits immediately before `target`.
    ///
    /// Returns true when the order changed. Unknown ids, self-targets, and
    /// moves that would leave the clip where it already is are no-ops.
    pub fn move_before(&mut self, id: ClipId, target: MoveTarget) -> bool {
        let Some(from) = self.position(id) else {
            return false;
        };

        let insert_at = match target {
            MoveTarget::End => {
                if from + 1 == self.clips.len() {
                    return false;
                }
                self.clips.len() - 1
            }
            MoveTarget::Before(before) => {
                if before == id {
                    return false;
                }
                let Some(to) = self.position(before) else {
                    return false;
                };
                if from + 1 == to {
                    return false;
                }
                if from < to {
                    to - 1
                } else {
                    to
                }
            }
        };

        let clip = self.clips.remove(from);
        self.clips.insert(insert_at, clip);
        true
    }

    /// Index-based move used by drag reordering: the clip at `from` ends up
    /// at index `to`. Returns true when the order changed.
    pub fn reorder_by_drag(&mut self, from: usize, to: usize) -> bool {
        if from == to || from >= self.clips.len() || to >= self.clips.len() {
            return false;
        }
        let clip = self.clips.remove(from);
        self.clips.insert(to, clip);
        true
    }

    /// Sum of known clip durations.
    pub fn total_duration_secs(&self) -> f64 {
        self.clips.iter().map(Clip::known_duration).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use vidfeed_common::error::VidfeedError;

    fn sequence(n: usize) -> ClipSequencer {
        let mut seq = ClipSequencer::new();
        for i in 0..n {
            seq.append(format!("blob:{i}"), format!("Clip {i}"));
        }
        seq
    }

    fn names(seq: &ClipSequencer) -> Vec<String> {
        seq.clips().iter().map(|c| c.display_name.clone()).collect()
    }

    #[test]
    fn append_is_visible_before_probing() {
        let mut seq = ClipSequencer::with_initial("blob:subject", "Subject");
        let clip = seq.append("blob:upload", "Upload");
        assert_eq!(seq.len(), 2);
        assert_eq!(seq.get(clip.id).unwrap().duration_secs, None);
        assert_eq!(seq.pending_probes().len(), 2);
    }

    #[test]
    fn remove_preserves_order_and_ignores_unknown() {
        let mut seq = sequence(4);
        let ids = seq.ids();
        assert!(seq.remove(ids[1]).is_some());
        assert_eq!(names(&seq), ["Clip 0", "Clip 2", "Clip 3"]);
        assert!(seq.remove(ids[1]).is_none());
        assert_eq!(seq.len(), 3);
    }

    #[test]
    fn move_before_forward_and_backward() {
        let mut seq = sequence(4);
        let ids = seq.ids();

        assert!(seq.move_before(ids[0], MoveTarget::Before(ids[3])));
        assert_eq!(names(&seq), ["Clip 1", "Clip 2", "Clip 0", "Clip 3"]);

        assert!(seq.move_before(ids[3], MoveTarget::Before(ids[1])));
        assert_eq!(names(&seq), ["Clip 3", "Clip 1", "Clip 2", "Clip 0"]);

        assert!(seq.move_before(ids[3], MoveTarget::End));
        assert_eq!(names(&seq), ["Clip 1", "Clip 2", "Clip 0", "Clip 3"]);
    }

    #[test]
    fn move_before_no_ops() {
        let mut seq = sequence(3);
        let ids = seq.ids();
        assert!(!seq.move_before(ids[0], MoveTarget::Before(ids[1])));
        assert!(!seq.move_before(ids[1], MoveTarget::Before(ids[1])));
        assert!(!seq.move_before(ids[2], MoveTarget::End));
        assert!(!seq.move_before(ClipId::new(), MoveTarget::End));
        assert!(!seq.move_before(ids[0], MoveTarget::Before(ClipId::new())));
        assert_eq!(names(&seq), ["Clip 0", "Clip 1", "Clip 2"]);
    }

    #[test]
    fn drag_reorder() {
        let mut seq = sequence(3);
        assert!(seq.reorder_by_drag(0, 2));
        assert_eq!(names(&seq), ["Clip 1", "Clip 2", "Clip 0"]);
        assert!(!seq.reorder_by_drag(1, 1));
        assert!(!seq.reorder_by_drag(0, 3));
        assert_eq!(names(&seq), ["Clip 1", "Clip 2", "Clip 0"]);
    }

    #[test]
    fn total_duration_ignores_unprobed() {
        let mut seq = sequence(3);
        let ids = seq.ids();
        assert!(seq.set_duration(ids[0], 4.0));
        assert!(seq.set_duration(ids[2], 6.0));
        assert!(!seq.set_duration(ids[1], f64::INFINITY));
        assert!((seq.total_duration_secs() - 10.0).abs() < 1e-9);
    }

    struct MapProbe;

    #[async_trait::async_trait]
    impl DurationProbe for MapProbe {
        async fn probe_duration(&self, uri: &str) -> VidfeedResult<f64> {
            match uri {
                "blob:0" => Ok(4.0),
                "blob:1" => Err(VidfeedError::source_decode(uri, "revoked")),
                _ => Ok(0.0),
            }
        }
    }

    #[tokio::test]
    async fn probe_failures_keep_clips() {
        let mut seq = sequence(3);
        let resolved = seq.probe_durations(&MapProbe).await;
        assert_eq!(resolved, 1);
        assert_eq!(seq.len(), 3);
        assert_eq!(seq.clips()[0].duration_secs, Some(4.0));
        assert_eq!(seq.clips()[1].duration_secs, None);
        assert_eq!(seq.clips()[2].duration_secs, None);
    }

    proptest! {
        #[test]
        fn reorders_are_permutations(
            n in 1usize..12,
            moves in proptest::collection::vec((0usize..12, 0usize..13, any::<bool>()), 0..20),
        ) {
            let mut seq = sequence(n);
            let mut before = seq.ids();
            before.sort();

            for (a, b, by_id) in moves {
                if by_id {
                    let ids = seq.ids();
                    let id = ids[a % n];
                    let target = if b >= n { MoveTarget::End } else { MoveTarget::Before(ids[b]) };
                    seq.move_before(id, target);
                } else {
                    seq.reorder_by_drag(a % n, b % n);
                }
            }

            let mut after = seq.ids();
            after.sort();
            prop_assert_eq!(before, after);
        }

        #[test]
        fn self_moves_are_no_ops(n in 1usize..10, i in 0usize..10) {
            let mut seq = sequence(n);
            let original = seq.ids();
            let i = i % n;
            prop_assert!(!seq.reorder_by_drag(i, i));
            if i + 1 < n {
                prop_assert!(!seq.move_before(original[i], MoveTarget::Before(original[i + 1])));
            }
            prop_assert_eq!(seq.ids(), original);
        }
    }
}
