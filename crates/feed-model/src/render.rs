//! Render job state as seen by the UI layer.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which kind of render a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// One pass over a trim window of a single source.
    Trim,
    /// One pass per clip, concatenated into a single output.
    Merge,
}

/// Lifecycle of a render job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

impl RenderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RenderStatus::Completed | RenderStatus::Failed)
    }
}

/// Point-in-time view of the orchestrator, published on every change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderSnapshot {
    /// Identifier of the current (or last) job.
    pub job_id: Option<Uuid>,

    /// Mode of the current (or last) job.
    pub mode: Option<RenderMode>,

    pub status: RenderStatus,

    /// `[0, 99]` while running; exactly 100 only once output exists.
    pub progress_percent: f64,

    /// User-facing failure message when `status == Failed`.
    pub error: Option<String>,
}

/// The finished media resource produced by a completed job.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderOutput {
    /// Container bytes.
    pub bytes: Vec<u8>,

    /// MIME type of `bytes` (e.g. `video/x-msvideo`).
    pub mime_type: String,

    /// Output timeline length in seconds.
    pub duration_secs: f64,

    pub width: u32,
    pub height: u32,
}

impl RenderOutput {
    /// Suggested file extension for downloads.
    pub fn file_extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "video/x-msvideo" => "avi",
            "video/x-matroska" => "mkv",
            "video/webm" => "webm",
            "video/mp4" => "mp4",
            _ => "bin",
        }
    }
}

impl std::fmt::Debug for RenderOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderOutput")
            .field("bytes", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .field("duration_secs", &self.duration_secs)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}
