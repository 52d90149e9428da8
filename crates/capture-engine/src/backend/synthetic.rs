//! Deterministic in-process media backend.
//!
//! Sources are described entirely by their URI:
//!
//! ```text
//! synthetic://<name>?duration=4&fps=30&width=64&height=36&audio=1&rate=48000&channels=2
//! ```
//!
//! Video frames are a gradient tinted by `name`, audio is a 440 Hz tone.
//! Events are paced against the tokio clock, so a 4 second source takes
//! 4 seconds to play (instantly under a paused test runtime).
//!
//! Failure injection via `fail=`:
//! - `open`: the source cannot be opened or probed
//! - `probe`: only probing fails
//! - `seek`, `play`: the respective step fails
//! - `decode@<t>`: decoding fails at media time `t`
//! - `stall@<t>`: the source stops producing events at media time `t`
//!
//! `report_dims=0` hides the frame size from [`SourceInfo`].
//!
//! Output is uncompressed AVI, which caps a job at 4 GiB; see
//! [`AviEncoder::max_duration_secs`]. Encoder failures are injected per
//! backend with [`SyntheticBackend::fail_encoder_after`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::time::{Duration, Instant};

use vidfeed_common::error::{VidfeedError, VidfeedResult};
use vidfeed_feed_model::render::RenderOutput;

use crate::avi::AviEncoder;
use crate::backend::MediaBackend;
use crate::encoder::{EncoderSettings, OutputAccumulator, StreamEncoder};
use crate::mix_bus::AudioGraphRegistry;
use crate::source::{AudioChunk, MediaSource, SourceEvent, SourceInfo, VideoFrame};
use crate::surface::Surface;

pub const SCHEME: &str = "synthetic://";

/// Audio chunks per second of media.
const AUDIO_CHUNKS_PER_SEC: u32 = 50;
const TONE_HZ: f32 = 440.0;
const TONE_LEVEL: f32 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Failure {
    Open,
    Probe,
    Seek,
    Play,
    Decode(f64),
    Stall(f64),
}

/// Parsed `synthetic://` URI.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticSpec {
    pub name: String,
    pub duration_secs: f64,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    pub audio: bool,
    pub sample_rate: u32,
    pub channels: u16,
    pub report_dims: bool,
    failure: Option<Failure>,
}

impl SyntheticSpec {
    pub fn parse(uri: &str) -> VidfeedResult<Self> {
        let rest = uri
            .strip_prefix(SCHEME)
            .ok_or_else(|| VidfeedError::source_decode(uri, "unsupported URI scheme"))?;
        let (name, query) = rest.split_once('?').unwrap_or((rest, ""));
        let params: HashMap<&str, &str> = query
            .split('&')
            .filter(|p| !p.is_empty())
            .filter_map(|p| p.split_once('='))
            .collect();

        let bad = |key: &str| VidfeedError::source_decode(uri, format!("invalid `{key}` parameter"));
        let num = |key: &str, default: f64| -> VidfeedResult<f64> {
            match params.get(key) {
                Some(v) => v.parse::<f64>().map_err(|_| bad(key)),
                None => Ok(default),
            }
        };

        let duration_secs = num("duration", 5.0)?;
        let fps = num("fps", 30.0)?;
        let width = num("width", 64.0)? as u32;
        let height = num("height", 36.0)? as u32;
        let sample_rate = num("rate", 48_000.0)? as u32;
        let channels = num("channels", 2.0)? as u16;
        if !(duration_secs.is_finite() && duration_secs > 0.0) {
            return Err(bad("duration"));
        }
        if !(fps.is_finite() && fps > 0.0) || width == 0 || height == 0 {
            return Err(bad("fps"));
        }
        if sample_rate < AUDIO_CHUNKS_PER_SEC || channels == 0 {
            return Err(bad("rate"));
        }

        let failure = match params.get("fail") {
            None => None,
            Some(&"open") => Some(Failure::Open),
            Some(&"probe") => Some(Failure::Probe),
            Some(&"seek") => Some(Failure::Seek),
            Some(&"play") => Some(Failure::Play),
            Some(other) => {
                let (kind, at) = other.split_once('@').ok_or_else(|| bad("fail"))?;
                let at = at.parse::<f64>().map_err(|_| bad("fail"))?;
                match kind {
                    "decode" => Some(Failure::Decode(at)),
                    "stall" => Some(Failure::Stall(at)),
                    _ => return Err(bad("fail")),
                }
            }
        };

        Ok(Self {
            name: name.to_string(),
            duration_secs,
            fps,
            width,
            height,
            audio: params.get("audio").map_or(true, |v| *v != "0"),
            sample_rate,
            channels,
            report_dims: params.get("report_dims").map_or(true, |v| *v != "0"),
            failure,
        })
    }

    fn tint(&self) -> u8 {
        self.name
            .bytes()
            .fold(17u8, |acc, b| acc.wrapping_mul(31).wrapping_add(b))
    }

    fn frame(&self, index: u64) -> VideoFrame {
        let (w, h) = (self.width as usize, self.height as usize);
        let tint = self.tint().wrapping_add(index as u8);
        let mut data = Vec::with_capacity(w * h * 4);
        for y in 0..h {
            for x in 0..w {
                data.extend_from_slice(&[(x * 255 / w) as u8, (y * 255 / h) as u8, tint, 255]);
            }
        }
        VideoFrame {
            pts_secs: index as f64 / self.fps,
            width: self.width,
            height: self.height,
            data,
        }
    }

    fn chunk_frames(&self) -> u64 {
        (self.sample_rate / AUDIO_CHUNKS_PER_SEC) as u64
    }

    fn audio_chunk(&self, index: u64) -> AudioChunk {
        let per_chunk = self.chunk_frames();
        let first = index * per_chunk;
        let total = (self.duration_secs * self.sample_rate as f64).round() as u64;
        let frames = per_chunk.min(total.saturating_sub(first));
        let ch = self.channels as usize;
        let mut samples = Vec::with_capacity(frames as usize * ch);
        for n in first..first + frames {
            let t = n as f32 / self.sample_rate as f32;
            let s = (t * TONE_HZ * std::f32::consts::TAU).sin() * TONE_LEVEL;
            samples.extend(std::iter::repeat(s).take(ch));
        }
        AudioChunk {
            pts_secs: first as f64 / self.sample_rate as f64,
            sample_rate: self.sample_rate,
            channels: self.channels,
            samples,
        }
    }

    fn audio_pts(&self, index: u64) -> f64 {
        (index * self.chunk_frames()) as f64 / self.sample_rate as f64
    }
}

/// In-process backend producing [`SyntheticSource`]s and AVI output.
#[derive(Debug, Default)]
pub struct SyntheticBackend {
    graphs: AudioGraphRegistry,
    encoders_created: Arc<AtomicUsize>,
    encoders_aborted: Arc<AtomicUsize>,
    playing: Arc<AtomicUsize>,
    /// Video frames each encoder accepts before failing.
    encoder_fails_after: Option<u64>,
}

impl SyntheticBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every encoder from this backend fail on video frame `frames + 1`.
    pub fn fail_encoder_after(mut self, frames: u64) -> Self {
        self.encoder_fails_after = Some(frames);
        self
    }

    /// Encoders discarded without producing output.
    pub fn encoders_aborted(&self) -> usize {
        self.encoders_aborted.load(Ordering::SeqCst)
    }

    /// Encoders built so far.
    pub fn encoders_created(&self) -> usize {
        self.encoders_created.load(Ordering::SeqCst)
    }

    /// Sources currently playing.
    pub fn playing_sources(&self) -> usize {
        self.playing.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl MediaBackend for SyntheticBackend {
    fn name(&self) -> &str {
        "synthetic"
    }

    async fn open_source(&self, uri: &str) -> VidfeedResult<Box<dyn MediaSource>> {
        let spec = SyntheticSpec::parse(uri)?;
        if spec.failure == Some(Failure::Open) {
            return Err(VidfeedError::source_decode(uri, "source unreachable"));
        }
        tracing::debug!(uri = %uri, duration = spec.duration_secs, "Synthetic source opened");
        Ok(Box::new(SyntheticSource::new(
            uri.to_string(),
            spec,
            Arc::clone(&self.playing),
        )))
    }

    async fn probe_duration(&self, uri: &str) -> VidfeedResult<f64> {
        let spec = SyntheticSpec::parse(uri)?;
        match spec.failure {
            Some(Failure::Open) | Some(Failure::Probe) => {
                Err(VidfeedError::source_decode(uri, "metadata unavailable"))
            }
            _ => Ok(spec.duration_secs),
        }
    }

    fn create_encoder(&self, settings: &EncoderSettings) -> VidfeedResult<Box<dyn StreamEncoder>> {
        let encoder = SyntheticEncoder {
            inner: Box::new(AviEncoder::new(*settings)?),
            fails_after: self.encoder_fails_after,
            video_frames: 0,
            aborted: Arc::clone(&self.encoders_aborted),
        };
        self.encoders_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(encoder))
    }

    fn audio_graphs(&self) -> &AudioGraphRegistry {
        &self.graphs
    }
}

/// A playing synthetic source.
pub struct SyntheticSource {
    uri: String,
    spec: SyntheticSpec,
    position: f64,
    next_video: u64,
    next_audio: u64,
    epoch: Option<Instant>,
    playing: Arc<AtomicUsize>,
}

impl SyntheticSource {
    fn new(uri: String, spec: SyntheticSpec, playing: Arc<AtomicUsize>) -> Self {
        Self {
            uri,
            spec,
            position: 0.0,
            next_video: 0,
            next_audio: 0,
            epoch: None,
            playing,
        }
    }

    fn due_at(&self, epoch: Instant, pts: f64) -> Instant {
        epoch + Duration::from_secs_f64((pts - self.position).max(0.0))
    }
}

#[async_trait::async_trait]
impl MediaSource for SyntheticSource {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn info(&self) -> SourceInfo {
        let dims = self.spec.report_dims;
        SourceInfo {
            width: dims.then_some(self.spec.width),
            height: dims.then_some(self.spec.height),
            frame_rate: Some(self.spec.fps),
            duration_secs: Some(self.spec.duration_secs),
            has_audio: self.spec.audio,
        }
    }

    async fn seek(&mut self, position_secs: f64) -> VidfeedResult<()> {
        if self.spec.failure == Some(Failure::Seek) {
            return Err(VidfeedError::source_decode(&self.uri, "seek failed"));
        }
        if !(position_secs.is_finite() && position_secs >= 0.0) {
            return Err(VidfeedError::source_decode(
                &self.uri,
                format!("cannot seek to {position_secs}"),
            ));
        }
        let position = position_secs.min(self.spec.duration_secs);
        self.position = position;
        self.next_video = (position * self.spec.fps - 1e-9).ceil().max(0.0) as u64;
        let chunk_secs = self.spec.chunk_frames() as f64 / self.spec.sample_rate as f64;
        self.next_audio = (position / chunk_secs - 1e-9).ceil().max(0.0) as u64;
        Ok(())
    }

    async fn play(&mut self) -> VidfeedResult<()> {
        if self.spec.failure == Some(Failure::Play) {
            return Err(VidfeedError::source_decode(&self.uri, "playback refused"));
        }
        if self.epoch.is_none() {
            self.playing.fetch_add(1, Ordering::SeqCst);
        }
        self.epoch = Some(Instant::now());
        Ok(())
    }

    async fn next_event(&mut self) -> VidfeedResult<SourceEvent> {
        let epoch = self
            .epoch
            .ok_or_else(|| VidfeedError::precondition("source is not playing"))?;

        let duration = self.spec.duration_secs;
        let video_pts = self.next_video as f64 / self.spec.fps;
        let audio_pts = if self.spec.audio {
            self.spec.audio_pts(self.next_audio)
        } else {
            f64::INFINITY
        };
        let pts = video_pts.min(audio_pts);

        if pts >= duration - 1e-9 {
            tokio::time::sleep_until(self.due_at(epoch, duration)).await;
            return Ok(SourceEvent::Ended);
        }

        match self.spec.failure {
            Some(Failure::Decode(at)) if pts >= at => {
                tokio::time::sleep_until(self.due_at(epoch, at)).await;
                return Err(VidfeedError::source_decode(
                    &self.uri,
                    format!("corrupt packet at {at:.3}s"),
                ));
            }
            Some(Failure::Stall(at)) if pts >= at => {
                std::future::pending::<()>().await;
            }
            _ => {}
        }

        tokio::time::sleep_until(self.due_at(epoch, pts)).await;
        if video_pts <= audio_pts {
            let frame = self.spec.frame(self.next_video);
            self.next_video += 1;
            Ok(SourceEvent::Video(frame))
        } else {
            let chunk = self.spec.audio_chunk(self.next_audio);
            self.next_audio += 1;
            Ok(SourceEvent::Audio(chunk))
        }
    }

    fn stop(&mut self) {
        if self.epoch.take().is_some() {
            self.playing.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for SyntheticSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// AVI encoder with abort accounting and optional write failure.
struct SyntheticEncoder {
    inner: Box<AviEncoder>,
    fails_after: Option<u64>,
    video_frames: u64,
    aborted: Arc<AtomicUsize>,
}

impl StreamEncoder for SyntheticEncoder {
    fn mime_type(&self) -> &str {
        self.inner.mime_type()
    }

    fn settings(&self) -> &EncoderSettings {
        self.inner.settings()
    }

    fn start(&mut self) -> VidfeedResult<()> {
        self.inner.start()
    }

    fn write_video(&mut self, surface: &Surface) -> VidfeedResult<()> {
        if self.fails_after.is_some_and(|limit| self.video_frames >= limit) {
            return Err(VidfeedError::encoder(format!(
                "write failed after {} video frames",
                self.video_frames
            )));
        }
        self.inner.write_video(surface)?;
        self.video_frames += 1;
        Ok(())
    }

    fn write_audio(&mut self, samples: &[f32]) -> VidfeedResult<()> {
        self.inner.write_audio(samples)
    }

    fn drain_chunks(&mut self) -> Vec<Vec<u8>> {
        self.inner.drain_chunks()
    }

    fn finish(self: Box<Self>, output: OutputAccumulator) -> VidfeedResult<RenderOutput> {
        self.inner.finish(output)
    }

    fn abort(self: Box<Self>) {
        self.aborted.fetch_add(1, Ordering::SeqCst);
        self.inner.abort();
    }

    fn max_duration_secs(&self) -> Option<f64> {
        self.inner.max_duration_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_parameters_and_defaults() {
        let spec = SyntheticSpec::parse("synthetic://clip?duration=4&fps=10&audio=0").unwrap();
        assert_eq!(spec.name, "clip");
        assert_eq!(spec.duration_secs, 4.0);
        assert_eq!(spec.fps, 10.0);
        assert_eq!((spec.width, spec.height), (64, 36));
        assert!(!spec.audio);
        assert!(spec.report_dims);

        let spec = SyntheticSpec::parse("synthetic://x?fail=decode@1.5").unwrap();
        assert_eq!(spec.failure, Some(Failure::Decode(1.5)));
    }

    #[test]
    fn rejects_bad_uris() {
        assert!(SyntheticSpec::parse("https://example.com/a.mp4").is_err());
        assert!(SyntheticSpec::parse("synthetic://x?duration=0").is_err());
        assert!(SyntheticSpec::parse("synthetic://x?fail=explode").is_err());
    }

    #[tokio::test]
    async fn probe_and_open_failures() {
        let backend = SyntheticBackend::new();
        assert_eq!(backend.probe_duration("synthetic://a?duration=6").await.unwrap(), 6.0);
        assert!(backend.probe_duration("synthetic://a?fail=probe").await.is_err());
        assert!(backend.open_source("synthetic://a?fail=probe").await.is_ok());
        assert!(matches!(
            backend.open_source("synthetic://a?fail=open").await,
            Err(VidfeedError::SourceDecode { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn events_are_ordered_and_paced() {
        let backend = SyntheticBackend::new();
        let mut source = backend
            .open_source("synthetic://a?duration=1&fps=10&rate=8000")
            .await
            .unwrap();
        source.seek(0.0).await.unwrap();
        let started = Instant::now();
        source.play().await.unwrap();
        assert_eq!(backend.playing_sources(), 1);

        let (mut video, mut audio, mut last) = (0, 0, 0.0);
        loop {
            match source.next_event().await.unwrap() {
                SourceEvent::Video(f) => {
                    assert!(f.pts_secs >= last);
                    last = f.pts_secs;
                    video += 1;
                }
                SourceEvent::Audio(c) => {
                    assert!(c.pts_secs >= last);
                    last = c.pts_secs;
                    audio += 1;
                }
                SourceEvent::Ended => break,
            }
        }
        assert_eq!((video, audio), (10, 50));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(1) && elapsed < Duration::from_millis(1010));

        source.stop();
        assert_eq!(backend.playing_sources(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn seek_starts_at_the_position() {
        let backend = SyntheticBackend::new();
        let mut source = backend
            .open_source("synthetic://a?duration=12&fps=10&audio=0")
            .await
            .unwrap();
        source.seek(5.0).await.unwrap();
        source.play().await.unwrap();
        match source.next_event().await.unwrap() {
            SourceEvent::Video(f) => assert_eq!(f.pts_secs, 5.0),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn encoders_are_counted() {
        let backend = SyntheticBackend::new();
        let settings = EncoderSettings {
            width: 2,
            height: 2,
            fps: 30,
            sample_rate: 48_000,
            channels: 2,
        };
        backend.create_encoder(&settings).unwrap();
        assert_eq!(backend.encoders_created(), 1);
    }

    #[test]
    fn injected_encoder_failure_hits_the_next_video_frame() {
        let backend = SyntheticBackend::new().fail_encoder_after(2);
        let settings = EncoderSettings {
            width: 2,
            height: 2,
            fps: 30,
            sample_rate: 48_000,
            channels: 2,
        };
        let mut encoder = backend.create_encoder(&settings).unwrap();
        encoder.start().unwrap();
        let surface = Surface::new(2, 2);
        encoder.write_video(&surface).unwrap();
        encoder.write_video(&surface).unwrap();
        let err = encoder.write_video(&surface).unwrap_err();
        assert!(matches!(err, VidfeedError::Encoder { .. }));
        encoder.write_audio(&[0.0; 4]).unwrap();

        encoder.abort();
        assert_eq!(backend.encoders_aborted(), 1);
    }
}
