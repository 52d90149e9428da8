//! The drawing surface every pass composites onto.

use vidfeed_common::error::{VidfeedError, VidfeedResult};
use vidfeed_feed_model::filter::ColorMatrix;

use crate::source::VideoFrame;

/// A persistent RGBA8 canvas owned by one render job.
#[derive(Clone)]
pub struct Surface {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Surface {
    /// An opaque black surface.
    pub fn new(width: u32, height: u32) -> Self {
        let mut data = vec![0u8; VideoFrame::expected_len(width, height)];
        for px in data.chunks_exact_mut(4) {
            px[3] = 255;
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// RGBA8 pixels, row-major from the top-left corner.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Draw `frame` stretched over the whole surface, running every pixel
    /// through `filter` (matrices applied in order).
    pub fn composite(&mut self, frame: &VideoFrame, filter: &[ColorMatrix]) -> VidfeedResult<()> {
        if !frame.is_well_formed() {
            return Err(VidfeedError::source_decode(
                "",
                format!(
                    "malformed frame at {:.3}s: {}x{} with {} bytes",
                    frame.pts_secs,
                    frame.width,
                    frame.height,
                    frame.data.len()
                ),
            ));
        }

        if frame.width == self.width && frame.height == self.height {
            self.data.copy_from_slice(&frame.data);
        } else {
            self.scale_from(frame);
        }

        if !filter.is_empty() {
            for px in self.data.chunks_exact_mut(4) {
                let mut rgb = [
                    px[0] as f32 / 255.0,
                    px[1] as f32 / 255.0,
                    px[2] as f32 / 255.0,
                ];
                for matrix in filter {
                    rgb = matrix.apply(rgb);
                }
                px[0] = (rgb[0] * 255.0).round() as u8;
                px[1] = (rgb[1] * 255.0).round() as u8;
                px[2] = (rgb[2] * 255.0).round() as u8;
            }
        }

        Ok(())
    }

    /// Nearest-neighbour resample into the surface.
    fn scale_from(&mut self, frame: &VideoFrame) {
        let (sw, sh) = (frame.width as usize, frame.height as usize);
        let (dw, dh) = (self.width as usize, self.height as usize);
        for y in 0..dh {
            let sy = (y * sh / dh).min(sh - 1);
            for x in 0..dw {
                let sx = (x * sw / dw).min(sw - 1);
                let src = (sy * sw + sx) * 4;
                let dst = (y * dw + x) * 4;
                self.data[dst..dst + 4].copy_from_slice(&frame.data[src..src + 4]);
            }
        }
    }
}

impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Surface({}x{})", self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidfeed_feed_model::filter::{FilterExpression, FilterOp};

    fn solid(width: u32, height: u32, rgba: [u8; 4]) -> VideoFrame {
        VideoFrame {
            pts_secs: 0.0,
            width,
            height,
            data: rgba.repeat((width * height) as usize),
        }
    }

    #[test]
    fn new_surface_is_opaque_black() {
        let surface = Surface::new(2, 2);
        assert_eq!(surface.data(), &[0, 0, 0, 255].repeat(4)[..]);
    }

    #[test]
    fn identity_composite_copies_pixels() {
        let mut surface = Surface::new(4, 2);
        surface.composite(&solid(4, 2, [10, 20, 30, 255]), &[]).unwrap();
        assert_eq!(&surface.data()[..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn composite_scales_to_surface() {
        let mut frame = solid(2, 1, [0, 0, 0, 255]);
        frame.data[4..8].copy_from_slice(&[255, 255, 255, 255]);
        let mut surface = Surface::new(4, 2);
        surface.composite(&frame, &[]).unwrap();
        let row: Vec<u8> = surface.data()[..16].iter().step_by(4).copied().collect();
        assert_eq!(row, vec![0, 0, 255, 255]);
    }

    #[test]
    fn filter_is_applied_per_pixel() {
        let filter = FilterExpression::new(vec![FilterOp::Invert(1.0)]).compile();
        let mut surface = Surface::new(1, 1);
        surface.composite(&solid(1, 1, [0, 64, 255, 255]), &filter).unwrap();
        assert_eq!(surface.data(), &[255, 191, 0, 255]);
    }

    #[test]
    fn malformed_frames_are_decode_errors() {
        let mut surface = Surface::new(2, 2);
        let frame = VideoFrame {
            pts_secs: 1.0,
            width: 2,
            height: 2,
            data: vec![0; 3],
        };
        assert!(matches!(
            surface.composite(&frame, &[]),
            Err(VidfeedError::SourceDecode { .. })
        ));
    }
}
