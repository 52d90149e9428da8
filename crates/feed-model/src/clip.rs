//! Source media references used by the editor.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque clip identifier, assigned at insertion and stable across reorders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClipId(Uuid);

impl ClipId {
    /// Allocate a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClipId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A reference to a playable media resource.
///
/// The clip never owns decoded bytes, only the URI of a local object
/// (`blob:`, `file://`) or a remote resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    /// Stable identity.
    pub id: ClipId,

    /// Where the media lives.
    pub source_uri: String,

    /// User-facing label.
    pub display_name: String,

    /// Duration in seconds once the source has been probed.
    #[serde(default)]
    pub duration_secs: Option<f64>,
}

impl Clip {
    /// Create a clip whose duration has not been probed yet.
    pub fn new(source_uri: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: ClipId::new(),
            source_uri: source_uri.into(),
            display_name: display_name.into(),
            duration_secs: None,
        }
    }

    /// Builder-style helper for callers that already know the duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    /// Known duration, or zero while unprobed.
    pub fn known_duration(&self) -> f64 {
        self.duration_secs
            .filter(|d| d.is_finite() && *d > 0.0)
            .unwrap_or(0.0)
    }

    pub fn is_probed(&self) -> bool {
        self.duration_secs.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_clips_have_unique_ids_and_unknown_duration() {
        let a = Clip::new("blob:a", "A");
        let b = Clip::new("blob:a", "A");
        assert_ne!(a.id, b.id);
        assert!(!a.is_probed());
        assert_eq!(a.known_duration(), 0.0);
    }

    #[test]
    fn nonsense_durations_count_as_zero() {
        assert_eq!(Clip::new("x", "x").with_duration(f64::NAN).known_duration(), 0.0);
        assert_eq!(Clip::new("x", "x").with_duration(-3.0).known_duration(), 0.0);
        assert_eq!(Clip::new("x", "x").with_duration(4.5).known_duration(), 4.5);
    }

    #[test]
    fn clip_ids_serialize_as_plain_strings() {
        let clip = Clip::new("https://cdn/v.mp4", "Generated").with_duration(8.0);
        let json = serde_json::to_value(&clip).unwrap();
        assert!(json["id"].is_string());
        let parsed: Clip = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, clip);
    }
}
