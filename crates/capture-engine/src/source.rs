//! Decoding media sources.
//!
//! A source is driven by playback: after `play`, each call to
//! [`MediaSource::next_event`] resolves when the next decoded frame or audio
//! chunk is due at 1x speed.

use vidfeed_common::error::VidfeedResult;

/// A decoded RGBA8 video frame.
#[derive(Clone, PartialEq)]
pub struct VideoFrame {
    /// Presentation time on the source timeline.
    pub pts_secs: f64,
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA8, `width * height * 4` bytes.
    pub data: Vec<u8>,
}

impl VideoFrame {
    pub fn expected_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 4
    }

    pub fn is_well_formed(&self) -> bool {
        self.width > 0 && self.height > 0 && self.data.len() == Self::expected_len(self.width, self.height)
    }
}

impl std::fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoFrame")
            .field("pts_secs", &self.pts_secs)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("data", &self.data.len())
            .finish()
    }
}

/// A chunk of decoded interleaved f32 audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    pub pts_secs: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl AudioChunk {
    /// Number of sample frames (samples per channel).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.frames() as f64 / self.sample_rate as f64
        }
    }
}

/// What a playing source produced next.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    Video(VideoFrame),
    Audio(AudioChunk),
    /// The source reached its natural end.
    Ended,
}

/// Metadata known about a source. Fields may be `None` until the first
/// frame has been decoded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceInfo {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<f64>,
    pub duration_secs: Option<f64>,
    pub has_audio: bool,
}

impl SourceInfo {
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match (self.width, self.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
            _ => None,
        }
    }
}

/// A seekable, playable, decoding media source.
#[async_trait::async_trait]
pub trait MediaSource: Send {
    /// Where the source was opened from.
    fn uri(&self) -> &str;

    fn info(&self) -> SourceInfo;

    /// Position playback at `position_secs`. Resolves once the seek landed.
    async fn seek(&mut self, position_secs: f64) -> VidfeedResult<()>;

    /// Start playback. Resolves once playback is confirmed.
    async fn play(&mut self) -> VidfeedResult<()>;

    /// Wait for the next decoded event.
    async fn next_event(&mut self) -> VidfeedResult<SourceEvent>;

    /// Stop playback and detach from the decode context.
    fn stop(&mut self);
}
