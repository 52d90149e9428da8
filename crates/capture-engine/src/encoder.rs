//! Stream encoders and output accumulation.
//!
//! An encoder consumes surface frames and mixed audio and emits encoded
//! chunks incrementally. The render job drains chunks after every write and
//! appends them to an [`OutputAccumulator`]; the final container is built
//! from the accumulated chunks when the encoder finishes.

use vidfeed_common::error::VidfeedResult;
use vidfeed_feed_model::render::RenderOutput;

use crate::surface::Surface;

/// Fixed parameters of one encoder instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncoderSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Encoded chunks collected over the lifetime of a render job.
#[derive(Debug, Default)]
pub struct OutputAccumulator {
    chunks: Vec<Vec<u8>>,
    bytes: usize,
}

impl OutputAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: Vec<u8>) {
        if chunk.is_empty() {
            return;
        }
        self.bytes += chunk.len();
        self.chunks.push(chunk);
    }

    pub fn extend(&mut self, chunks: impl IntoIterator<Item = Vec<u8>>) {
        for chunk in chunks {
            self.push(chunk);
        }
    }

    /// Total payload size so far.
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Concatenate every chunk in arrival order.
    pub fn into_bytes(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.bytes);
        for chunk in self.chunks {
            out.extend_from_slice(&chunk);
        }
        out
    }
}

/// A single-use encoder. One instance spans every pass of a job so that
/// timestamps stay continuous across clip boundaries.
pub trait StreamEncoder: Send {
    /// MIME type of the finished container.
    fn mime_type(&self) -> &str;

    fn settings(&self) -> &EncoderSettings;

    /// Begin encoding. Must be called once before any write.
    fn start(&mut self) -> VidfeedResult<()>;

    /// Append one output frame copied from the surface.
    fn write_video(&mut self, surface: &Surface) -> VidfeedResult<()>;

    /// Append interleaved samples in the encoder's rate and channel layout.
    fn write_audio(&mut self, samples: &[f32]) -> VidfeedResult<()>;

    /// Take every chunk encoded since the last drain.
    fn drain_chunks(&mut self) -> Vec<Vec<u8>>;

    /// Flush the encoder and build the finished resource from `output`
    /// plus whatever the encoder still held.
    fn finish(self: Box<Self>, output: OutputAccumulator) -> VidfeedResult<RenderOutput>;

    /// Drop the encoder without producing output.
    fn abort(self: Box<Self>);

    /// Longest output the container can hold at these settings, if bounded.
    fn max_duration_secs(&self) -> Option<f64> {
        None
    }
}

/// Convert a float sample to signed 16-bit PCM.
pub(crate) fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulator_keeps_order_and_skips_empty() {
        let mut acc = OutputAccumulator::new();
        acc.push(vec![1, 2]);
        acc.push(Vec::new());
        acc.extend([vec![3], vec![4, 5]]);
        assert_eq!(acc.chunk_count(), 3);
        assert_eq!(acc.bytes(), 5);
        assert_eq!(acc.into_bytes(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn pcm_conversion_clamps() {
        assert_eq!(f32_to_i16(0.0), 0);
        assert_eq!(f32_to_i16(2.0), i16::MAX);
        assert_eq!(f32_to_i16(-2.0), -i16::MAX);
    }
}
