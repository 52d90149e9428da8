//! Uncompressed AVI encoder.
//!
//! Video is stored as 24-bit bottom-up DIB frames (`00db`), audio as 16-bit
//! interleaved PCM (`01wb`). Chunks are emitted as soon as they are written;
//! the RIFF headers and `idx1` index are produced at finish, when the frame
//! counts are known.
//!
//! RIFF sizes are 32-bit, so a file tops out at 4 GiB. Uncompressed
//! 1080x1920 at 30 fps fills that in about 23 seconds; see
//! [`AviEncoder::max_duration_for`].

use vidfeed_common::error::{VidfeedError, VidfeedResult};
use vidfeed_feed_model::render::RenderOutput;

use crate::encoder::{f32_to_i16, EncoderSettings, OutputAccumulator, StreamEncoder};
use crate::surface::Surface;

pub const AVI_MIME: &str = "video/x-msvideo";

const AVIF_HASINDEX: u32 = 0x10;
const AVIIF_KEYFRAME: u32 = 0x10;
const WAVE_FORMAT_PCM: u16 = 1;
const BITS_PER_SAMPLE: u16 = 16;

/// Bytes reserved for `hdrl` and list framing outside `movi`.
const HEADER_ALLOWANCE: u64 = 4096;
/// Chunk header plus its `idx1` entry.
const CHUNK_OVERHEAD: u64 = 8 + 16;
/// Audio writes per second assumed when sizing the limit.
const AUDIO_WRITES_PER_SEC: u64 = 50;

struct IndexEntry {
    fourcc: [u8; 4],
    /// Offset of the chunk header relative to the `movi` fourcc.
    offset: u32,
    size: u32,
}

pub struct AviEncoder {
    settings: EncoderSettings,
    started: bool,
    pending: Vec<u8>,
    movi_len: u64,
    index: Vec<IndexEntry>,
    video_frames: u64,
    audio_frames: u64,
    max_video_chunk: u32,
    max_audio_chunk: u32,
}

impl AviEncoder {
    pub fn new(settings: EncoderSettings) -> VidfeedResult<Self> {
        if settings.width == 0 || settings.height == 0 || settings.fps == 0 {
            return Err(VidfeedError::encoder(format!(
                "invalid encoder settings {}x{}@{}",
                settings.width, settings.height, settings.fps
            )));
        }
        if settings.sample_rate == 0 || settings.channels == 0 {
            return Err(VidfeedError::encoder("audio track needs a rate and channels"));
        }
        Ok(Self {
            settings,
            started: false,
            pending: Vec::new(),
            movi_len: 0,
            index: Vec::new(),
            video_frames: 0,
            audio_frames: 0,
            max_video_chunk: 0,
            max_audio_chunk: 0,
        })
    }

    pub fn video_frames(&self) -> u64 {
        self.video_frames
    }

    /// Seconds of output that fit in one AVI file at `settings`.
    pub fn max_duration_for(settings: &EncoderSettings) -> f64 {
        let stride = (settings.width as u64 * 3 + 3) & !3;
        let frame = stride * settings.height as u64 + CHUNK_OVERHEAD;
        let block_align = settings.channels as u64 * (BITS_PER_SAMPLE / 8) as u64;
        let audio = settings.sample_rate as u64 * block_align + AUDIO_WRITES_PER_SEC * CHUNK_OVERHEAD;
        let per_sec = frame * settings.fps as u64 + audio;
        if per_sec == 0 {
            return f64::INFINITY;
        }
        (u32::MAX as u64 - HEADER_ALLOWANCE) as f64 / per_sec as f64
    }

    pub fn audio_frames(&self) -> u64 {
        self.audio_frames
    }

    fn row_stride(&self) -> usize {
        (self.settings.width as usize * 3 + 3) & !3
    }

    fn frame_size(&self) -> usize {
        self.row_stride() * self.settings.height as usize
    }

    fn block_align(&self) -> u16 {
        self.settings.channels * (BITS_PER_SAMPLE / 8)
    }

    fn ensure_started(&self) -> VidfeedResult<()> {
        if self.started {
            Ok(())
        } else {
            Err(VidfeedError::encoder("write before start"))
        }
    }

    fn emit_chunk(&mut self, fourcc: [u8; 4], payload: &[u8]) -> VidfeedResult<u32> {
        let size = u32::try_from(payload.len())
            .map_err(|_| VidfeedError::encoder("chunk exceeds 4 GiB"))?;
        let offset = u32::try_from(4 + self.movi_len)
            .map_err(|_| VidfeedError::encoder("AVI output exceeds 4 GiB"))?;

        self.pending.extend_from_slice(&fourcc);
        self.pending.extend_from_slice(&size.to_le_bytes());
        self.pending.extend_from_slice(payload);
        let padded = payload.len() % 2 == 1;
        if padded {
            self.pending.push(0);
        }

        self.movi_len += 8 + payload.len() as u64 + padded as u64;
        self.index.push(IndexEntry {
            fourcc,
            offset,
            size,
        });
        Ok(size)
    }

    fn headers(&self) -> Vec<u8> {
        let s = &self.settings;
        let frame_size = self.frame_size() as u32;
        let block_align = self.block_align();
        let byte_rate = s.sample_rate * block_align as u32;
        let total_frames = self.video_frames as u32;

        let mut avih = Vec::with_capacity(56);
        put_u32(&mut avih, 1_000_000 / s.fps);
        put_u32(&mut avih, frame_size * s.fps + byte_rate);
        put_u32(&mut avih, 0);
        put_u32(&mut avih, AVIF_HASINDEX);
        put_u32(&mut avih, total_frames);
        put_u32(&mut avih, 0);
        put_u32(&mut avih, 2);
        put_u32(&mut avih, self.max_video_chunk.max(self.max_audio_chunk));
        put_u32(&mut avih, s.width);
        put_u32(&mut avih, s.height);
        avih.extend_from_slice(&[0u8; 16]);

        let video_strh = stream_header(StreamHeader {
            kind: *b"vids",
            handler: *b"DIB ",
            scale: 1,
            rate: s.fps,
            length: total_frames,
            suggested_buffer: self.max_video_chunk,
            sample_size: 0,
            frame: (s.width as i16, s.height as i16),
        });

        let mut video_strf = Vec::with_capacity(40);
        put_u32(&mut video_strf, 40);
        put_u32(&mut video_strf, s.width);
        put_u32(&mut video_strf, s.height);
        put_u16(&mut video_strf, 1);
        put_u16(&mut video_strf, 24);
        put_u32(&mut video_strf, 0);
        put_u32(&mut video_strf, frame_size);
        video_strf.extend_from_slice(&[0u8; 16]);

        let audio_strh = stream_header(StreamHeader {
            kind: *b"auds",
            handler: [0; 4],
            scale: block_align as u32,
            rate: byte_rate,
            length: self.audio_frames as u32,
            suggested_buffer: self.max_audio_chunk,
            sample_size: block_align as u32,
            frame: (0, 0),
        });

        let mut audio_strf = Vec::with_capacity(16);
        put_u16(&mut audio_strf, WAVE_FORMAT_PCM);
        put_u16(&mut audio_strf, s.channels);
        put_u32(&mut audio_strf, s.sample_rate);
        put_u32(&mut audio_strf, byte_rate);
        put_u16(&mut audio_strf, block_align);
        put_u16(&mut audio_strf, BITS_PER_SAMPLE);

        let mut video_strl = Vec::new();
        put_chunk(&mut video_strl, b"strh", &video_strh);
        put_chunk(&mut video_strl, b"strf", &video_strf);
        let mut audio_strl = Vec::new();
        put_chunk(&mut audio_strl, b"strh", &audio_strh);
        put_chunk(&mut audio_strl, b"strf", &audio_strf);

        let mut hdrl = Vec::new();
        put_chunk(&mut hdrl, b"avih", &avih);
        put_list(&mut hdrl, b"strl", &video_strl);
        put_list(&mut hdrl, b"strl", &audio_strl);

        let mut out = Vec::new();
        put_list(&mut out, b"hdrl", &hdrl);
        out
    }

    fn idx1(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.index.len() * 16);
        out.extend_from_slice(b"idx1");
        put_u32(&mut out, (self.index.len() * 16) as u32);
        for entry in &self.index {
            out.extend_from_slice(&entry.fourcc);
            put_u32(&mut out, AVIIF_KEYFRAME);
            put_u32(&mut out, entry.offset);
            put_u32(&mut out, entry.size);
        }
        out
    }
}

impl StreamEncoder for AviEncoder {
    fn mime_type(&self) -> &str {
        AVI_MIME
    }

    fn settings(&self) -> &EncoderSettings {
        &self.settings
    }

    fn start(&mut self) -> VidfeedResult<()> {
        if self.started {
            return Err(VidfeedError::encoder("encoder already started"));
        }
        self.started = true;
        tracing::debug!(
            width = self.settings.width,
            height = self.settings.height,
            fps = self.settings.fps,
            "AVI encoder started"
        );
        Ok(())
    }

    fn write_video(&mut self, surface: &Surface) -> VidfeedResult<()> {
        self.ensure_started()?;
        if surface.width() != self.settings.width || surface.height() != self.settings.height {
            return Err(VidfeedError::encoder(format!(
                "surface {}x{} does not match encoder {}x{}",
                surface.width(),
                surface.height(),
                self.settings.width,
                self.settings.height
            )));
        }

        let width = self.settings.width as usize;
        let stride = self.row_stride();
        let mut dib = vec![0u8; self.frame_size()];
        for (row, src) in surface.data().chunks_exact(width * 4).enumerate() {
            let dst_row = self.settings.height as usize - 1 - row;
            let dst = &mut dib[dst_row * stride..dst_row * stride + width * 3];
            for (px, out) in src.chunks_exact(4).zip(dst.chunks_exact_mut(3)) {
                out[0] = px[2];
                out[1] = px[1];
                out[2] = px[0];
            }
        }

        let size = self.emit_chunk(*b"00db", &dib)?;
        self.max_video_chunk = self.max_video_chunk.max(size);
        self.video_frames += 1;
        Ok(())
    }

    fn write_audio(&mut self, samples: &[f32]) -> VidfeedResult<()> {
        self.ensure_started()?;
        let channels = self.settings.channels as usize;
        if samples.len() % channels != 0 {
            return Err(VidfeedError::encoder(format!(
                "{} samples is not a whole number of {channels}-channel frames",
                samples.len()
            )));
        }
        if samples.is_empty() {
            return Ok(());
        }

        let mut pcm = Vec::with_capacity(samples.len() * 2);
        for s in samples {
            pcm.extend_from_slice(&f32_to_i16(*s).to_le_bytes());
        }
        let size = self.emit_chunk(*b"01wb", &pcm)?;
        self.max_audio_chunk = self.max_audio_chunk.max(size);
        self.audio_frames += (samples.len() / channels) as u64;
        Ok(())
    }

    fn drain_chunks(&mut self) -> Vec<Vec<u8>> {
        if self.pending.is_empty() {
            Vec::new()
        } else {
            vec![std::mem::take(&mut self.pending)]
        }
    }

    fn finish(mut self: Box<Self>, mut output: OutputAccumulator) -> VidfeedResult<RenderOutput> {
        self.ensure_started()?;
        if self.video_frames == 0 {
            return Err(VidfeedError::encoder("no video frames were encoded"));
        }
        output.extend(self.drain_chunks());
        if output.bytes() as u64 != self.movi_len {
            return Err(VidfeedError::encoder(format!(
                "accumulated {} bytes but encoded {}",
                output.bytes(),
                self.movi_len
            )));
        }

        let hdrl = self.headers();
        let idx1 = self.idx1();
        let movi_list_len = 4 + self.movi_len;
        let riff_len = 4 + hdrl.len() as u64 + 8 + movi_list_len + idx1.len() as u64;
        let riff_len = u32::try_from(riff_len)
            .map_err(|_| VidfeedError::encoder("AVI output exceeds 4 GiB"))?;

        let mut bytes = Vec::with_capacity(riff_len as usize + 8);
        bytes.extend_from_slice(b"RIFF");
        put_u32(&mut bytes, riff_len);
        bytes.extend_from_slice(b"AVI ");
        bytes.extend_from_slice(&hdrl);
        bytes.extend_from_slice(b"LIST");
        put_u32(&mut bytes, movi_list_len as u32);
        bytes.extend_from_slice(b"movi");
        bytes.extend_from_slice(&output.into_bytes());
        bytes.extend_from_slice(&idx1);

        let duration_secs = self.video_frames as f64 / self.settings.fps as f64;
        tracing::info!(
            frames = self.video_frames,
            audio_frames = self.audio_frames,
            bytes = bytes.len(),
            duration_secs,
            "AVI encoder finished"
        );

        Ok(RenderOutput {
            bytes,
            mime_type: AVI_MIME.to_string(),
            duration_secs,
            width: self.settings.width,
            height: self.settings.height,
        })
    }

    fn abort(self: Box<Self>) {
        tracing::debug!(frames = self.video_frames, "AVI encoder aborted");
    }

    fn max_duration_secs(&self) -> Option<f64> {
        Some(Self::max_duration_for(&self.settings))
    }
}

struct StreamHeader {
    kind: [u8; 4],
    handler: [u8; 4],
    scale: u32,
    rate: u32,
    length: u32,
    suggested_buffer: u32,
    sample_size: u32,
    frame: (i16, i16),
}

fn stream_header(h: StreamHeader) -> Vec<u8> {
    let mut out = Vec::with_capacity(56);
    out.extend_from_slice(&h.kind);
    out.extend_from_slice(&h.handler);
    put_u32(&mut out, 0);
    put_u16(&mut out, 0);
    put_u16(&mut out, 0);
    put_u32(&mut out, 0);
    put_u32(&mut out, h.scale);
    put_u32(&mut out, h.rate);
    put_u32(&mut out, 0);
    put_u32(&mut out, h.length);
    put_u32(&mut out, h.suggested_buffer);
    put_u32(&mut out, u32::MAX);
    put_u32(&mut out, h.sample_size);
    out.extend_from_slice(&0i16.to_le_bytes());
    out.extend_from_slice(&0i16.to_le_bytes());
    out.extend_from_slice(&h.frame.0.to_le_bytes());
    out.extend_from_slice(&h.frame.1.to_le_bytes());
    out
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_chunk(out: &mut Vec<u8>, fourcc: &[u8; 4], payload: &[u8]) {
    out.extend_from_slice(fourcc);
    put_u32(out, payload.len() as u32);
    out.extend_from_slice(payload);
    if payload.len() % 2 == 1 {
        out.push(0);
    }
}

fn put_list(out: &mut Vec<u8>, kind: &[u8; 4], body: &[u8]) {
    out.extend_from_slice(b"LIST");
    put_u32(out, 4 + body.len() as u32);
    out.extend_from_slice(kind);
    out.extend_from_slice(body);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::VideoFrame;

    fn settings() -> EncoderSettings {
        EncoderSettings {
            width: 3,
            height: 2,
            fps: 10,
            sample_rate: 8_000,
            channels: 2,
        }
    }

    fn u32_at(bytes: &[u8], at: usize) -> u32 {
        u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
    }

    fn find(bytes: &[u8], needle: &[u8]) -> usize {
        bytes
            .windows(needle.len())
            .position(|w| w == needle)
            .unwrap()
    }

    fn encode(frames: usize) -> RenderOutput {
        let mut encoder = Box::new(AviEncoder::new(settings()).unwrap());
        encoder.start().unwrap();
        let mut surface = Surface::new(3, 2);
        let frame = VideoFrame {
            pts_secs: 0.0,
            width: 3,
            height: 2,
            data: [255, 0, 0, 255].repeat(6),
        };
        surface.composite(&frame, &[]).unwrap();

        let mut acc = OutputAccumulator::new();
        for _ in 0..frames {
            encoder.write_video(&surface).unwrap();
            encoder.write_audio(&[0.5; 1600]).unwrap();
            acc.extend(encoder.drain_chunks());
        }
        encoder.finish(acc).unwrap()
    }

    #[test]
    fn riff_structure_is_consistent() {
        let output = encode(3);
        let bytes = &output.bytes;
        assert_eq!(&bytes[..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"AVI ");
        assert_eq!(u32_at(bytes, 4) as usize, bytes.len() - 8);
        assert_eq!(output.mime_type, AVI_MIME);
        assert!((output.duration_secs - 0.3).abs() < 1e-9);

        let avih = find(bytes, b"avih");
        assert_eq!(u32_at(bytes, avih + 4), 56);
        assert_eq!(u32_at(bytes, avih + 8 + 16), 3);

        let idx = find(bytes, b"idx1");
        assert_eq!(u32_at(bytes, idx + 4), 6 * 16);
    }

    #[test]
    fn index_offsets_point_at_chunks() {
        let output = encode(2);
        let bytes = &output.bytes;
        let movi = find(bytes, b"movi");
        let idx = find(bytes, b"idx1");
        for entry in 0..4 {
            let at = idx + 8 + entry * 16;
            let offset = u32_at(bytes, at + 8) as usize;
            assert_eq!(&bytes[movi + offset..movi + offset + 4], &bytes[at..at + 4]);
            assert_eq!(u32_at(bytes, movi + offset + 4), u32_at(bytes, at + 12));
        }
    }

    #[test]
    fn frames_are_bottom_up_bgr_with_padded_rows() {
        let output = encode(1);
        let bytes = &output.bytes;
        let chunk = find(bytes, b"00db");
        // 3 px * 3 bytes = 9, padded to 12 per row.
        assert_eq!(u32_at(bytes, chunk + 4), 24);
        assert_eq!(&bytes[chunk + 8..chunk + 11], &[0, 0, 255]);
    }

    #[test]
    fn write_before_start_fails() {
        let mut encoder = AviEncoder::new(settings()).unwrap();
        assert!(encoder.write_video(&Surface::new(3, 2)).is_err());
    }

    #[test]
    fn rejects_mismatched_surface_and_partial_frames() {
        let mut encoder = AviEncoder::new(settings()).unwrap();
        encoder.start().unwrap();
        assert!(encoder.write_video(&Surface::new(4, 2)).is_err());
        assert!(encoder.write_audio(&[0.0; 3]).is_err());
    }

    #[test]
    fn portrait_hd_fills_the_file_in_about_23_seconds() {
        let hd = EncoderSettings {
            width: 1080,
            height: 1920,
            fps: 30,
            sample_rate: 48_000,
            channels: 2,
        };
        let limit = AviEncoder::max_duration_for(&hd);
        assert!((22.5..23.5).contains(&limit), "got {limit}");

        let small = EncoderSettings {
            width: 64,
            height: 36,
            ..hd
        };
        assert!(AviEncoder::max_duration_for(&small) > 3_600.0);
        assert_eq!(
            AviEncoder::new(hd).unwrap().max_duration_secs(),
            Some(limit)
        );
    }

    #[test]
    fn finish_without_frames_is_an_error() {
        let mut encoder = Box::new(AviEncoder::new(settings()).unwrap());
        encoder.start().unwrap();
        assert!(encoder.finish(OutputAccumulator::new()).is_err());
    }
}
