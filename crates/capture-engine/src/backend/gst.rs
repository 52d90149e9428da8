//! GStreamer-backed sources and Matroska encoder.
//!
//! Sources decode through `uridecodebin` into two app sinks (RGBA video and
//! interleaved F32 audio) that run against the pipeline clock, so samples
//! arrive at playback speed. The encoder pushes surfaces and mixed audio
//! into app sources feeding `x264enc`/`avenc_aac` and a streamable
//! `matroskamux`, whose output is pulled back from an app sink as chunks.

use std::sync::OnceLock;
use std::time::Duration;

use gst::prelude::*;
use gstreamer as gst;
use gstreamer_app as gst_app;

use vidfeed_common::error::{VidfeedError, VidfeedResult};
use vidfeed_feed_model::render::RenderOutput;

use crate::backend::MediaBackend;
use crate::encoder::{EncoderSettings, OutputAccumulator, StreamEncoder};
use crate::mix_bus::AudioGraphRegistry;
use crate::source::{AudioChunk, MediaSource, SourceEvent, SourceInfo, VideoFrame};
use crate::surface::Surface;

pub const MATROSKA_MIME: &str = "video/x-matroska";

const STATE_TIMEOUT_SECS: u64 = 10;
const POLL_INTERVAL: Duration = Duration::from_millis(5);
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

fn init_gstreamer() -> VidfeedResult<()> {
    static GST_INIT: OnceLock<Result<(), String>> = OnceLock::new();
    let init_res = GST_INIT.get_or_init(|| gst::init().map_err(|e| e.to_string()));
    match init_res {
        Ok(()) => Ok(()),
        Err(e) => Err(VidfeedError::unsupported(format!(
            "Failed to initialize GStreamer: {e}"
        ))),
    }
}

/// Accept plain paths as well as URIs.
fn normalize_uri(uri: &str) -> VidfeedResult<String> {
    if uri.contains("://") {
        return Ok(uri.to_string());
    }
    let path = std::fs::canonicalize(uri).map_err(|_| VidfeedError::FileNotFound {
        path: uri.into(),
    })?;
    Ok(format!("file://{}", path.display()))
}

fn launch(uri: &str, description: &str) -> VidfeedResult<gst::Pipeline> {
    gst::parse::launch(description)
        .map_err(|e| VidfeedError::source_decode(uri, format!("failed to build pipeline: {e}")))?
        .downcast::<gst::Pipeline>()
        .map_err(|_| VidfeedError::source_decode(uri, "launch string did not produce a pipeline"))
}

fn app_sink(pipeline: &gst::Pipeline, name: &str) -> VidfeedResult<gst_app::AppSink> {
    pipeline
        .by_name(name)
        .and_then(|e| e.downcast::<gst_app::AppSink>().ok())
        .ok_or_else(|| VidfeedError::encoder(format!("pipeline has no app sink `{name}`")))
}

fn app_src(pipeline: &gst::Pipeline, name: &str) -> VidfeedResult<gst_app::AppSrc> {
    pipeline
        .by_name(name)
        .and_then(|e| e.downcast::<gst_app::AppSrc>().ok())
        .ok_or_else(|| VidfeedError::encoder(format!("pipeline has no app source `{name}`")))
}

/// Move the pipeline to `state` and wait for the transition off the
/// runtime threads.
async fn change_state(pipeline: &gst::Pipeline, uri: &str, state: gst::State) -> VidfeedResult<()> {
    let pipeline = pipeline.clone();
    let task_uri = uri.to_string();
    let uri = uri.to_string();
    tokio::task::spawn_blocking(move || {
        pipeline
            .set_state(state)
            .map_err(|e| VidfeedError::source_decode(&uri, format!("state change to {state:?} failed: {e:?}")))?;
        match pipeline.state(gst::ClockTime::from_seconds(STATE_TIMEOUT_SECS)) {
            (Ok(_), current, _) if current == state => Ok(()),
            (Ok(_), current, _) => {
                tracing::warn!(uri = %uri, ?current, ?state, "Pipeline did not reach state within timeout");
                Ok(())
            }
            (Err(e), _, _) => Err(VidfeedError::source_decode(
                &uri,
                format!("pipeline failed to reach {state:?}: {e:?}"),
            )),
        }
    })
    .await
    .map_err(|e| VidfeedError::source_decode(task_uri, format!("state change task failed: {e}")))?
}

fn bus_error(pipeline: &gst::Pipeline) -> Option<String> {
    let bus = pipeline.bus()?;
    while let Some(msg) = bus.pop_filtered(&[gst::MessageType::Error]) {
        if let gst::MessageView::Error(e) = msg.view() {
            return Some(e.error().to_string());
        }
    }
    None
}

fn clock_secs(t: Option<gst::ClockTime>) -> f64 {
    t.map(|t| t.nseconds() as f64 / 1_000_000_000.0).unwrap_or(0.0)
}

fn secs_clock(secs: f64) -> gst::ClockTime {
    gst::ClockTime::from_nseconds((secs.max(0.0) * 1_000_000_000.0) as u64)
}

/// GStreamer media backend.
#[derive(Debug, Default)]
pub struct GstBackend {
    graphs: AudioGraphRegistry,
}

impl GstBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl MediaBackend for GstBackend {
    fn name(&self) -> &str {
        "gstreamer"
    }

    async fn open_source(&self, uri: &str) -> VidfeedResult<Box<dyn MediaSource>> {
        init_gstreamer()?;
        let source = GstSource::open(uri).await?;
        Ok(Box::new(source))
    }

    async fn probe_duration(&self, uri: &str) -> VidfeedResult<f64> {
        init_gstreamer()?;
        let resolved = normalize_uri(uri)?;
        let pipeline = launch(
            uri,
            &format!("uridecodebin uri=\"{resolved}\" ! fakesink sync=false"),
        )?;
        let result = change_state(&pipeline, uri, gst::State::Paused).await;
        let duration = pipeline.query_duration::<gst::ClockTime>();
        let _ = pipeline.set_state(gst::State::Null);
        result?;
        duration
            .map(|d| clock_secs(Some(d)))
            .filter(|d| *d > 0.0)
            .ok_or_else(|| VidfeedError::source_decode(uri, "duration unavailable"))
    }

    fn create_encoder(&self, settings: &EncoderSettings) -> VidfeedResult<Box<dyn StreamEncoder>> {
        init_gstreamer()?;
        Ok(Box::new(GstEncoder::new(*settings)?))
    }

    fn audio_graphs(&self) -> &AudioGraphRegistry {
        &self.graphs
    }
}

/// Frame size and rate from negotiated raw video caps.
fn video_caps_info(caps: &gst::CapsRef) -> (Option<u32>, Option<u32>, Option<f64>) {
    let Some(s) = caps.structure(0) else {
        return (None, None, None);
    };
    let dim = |key: &str| {
        s.get::<i32>(key)
            .ok()
            .filter(|v| *v > 0)
            .map(|v| v as u32)
    };
    let rate = s
        .get::<gst::Fraction>("framerate")
        .ok()
        .filter(|r| r.numer() > 0 && r.denom() > 0)
        .map(|r| r.numer() as f64 / r.denom() as f64);
    (dim("width"), dim("height"), rate)
}

fn source_info(
    duration_secs: Option<f64>,
    video_caps: Option<&gst::CapsRef>,
    audio_caps: Option<&gst::CapsRef>,
) -> SourceInfo {
    let (width, height, frame_rate) = video_caps.map(video_caps_info).unwrap_or_default();
    SourceInfo {
        width,
        height,
        frame_rate,
        duration_secs,
        has_audio: audio_caps.is_some(),
    }
}

/// A decoding GStreamer pipeline.
pub struct GstSource {
    uri: String,
    pipeline: gst::Pipeline,
    video: gst_app::AppSink,
    audio: gst_app::AppSink,
    info: SourceInfo,
}

impl GstSource {
    async fn open(uri: &str) -> VidfeedResult<Self> {
        let resolved = normalize_uri(uri)?;
        // The audio sink is not async so sources without audio still preroll.
        let description = format!(
            "uridecodebin uri=\"{resolved}\" name=dec \
             dec. ! queue ! videoconvert ! video/x-raw,format=RGBA ! appsink name=vsink sync=true max-buffers=4 \
             dec. ! queue ! audioconvert ! audioresample ! audio/x-raw,format=F32LE,layout=interleaved ! appsink name=asink sync=true async=false max-buffers=32"
        );
        let pipeline = launch(uri, &description)?;
        let video = app_sink(&pipeline, "vsink")?;
        let audio = app_sink(&pipeline, "asink")?;

        if let Err(e) = change_state(&pipeline, uri, gst::State::Paused).await {
            let _ = pipeline.set_state(gst::State::Null);
            return Err(e);
        }
        if let Some(message) = bus_error(&pipeline) {
            let _ = pipeline.set_state(gst::State::Null);
            return Err(VidfeedError::source_decode(uri, message));
        }

        // Prerolled, so both sinks have negotiated caps.
        let duration = pipeline
            .query_duration::<gst::ClockTime>()
            .map(|d| clock_secs(Some(d)));
        let video_caps = video.static_pad("sink").and_then(|pad| pad.current_caps());
        let audio_caps = audio.static_pad("sink").and_then(|pad| pad.current_caps());
        let info = source_info(duration, video_caps.as_deref(), audio_caps.as_deref());
        tracing::debug!(
            uri = %uri,
            ?duration,
            width = ?info.width,
            height = ?info.height,
            has_audio = info.has_audio,
            "GStreamer source opened"
        );

        Ok(Self {
            uri: uri.to_string(),
            pipeline,
            video,
            audio,
            info,
        })
    }

    fn video_frame(&mut self, sample: gst::Sample) -> VidfeedResult<VideoFrame> {
        let (width, height, rate) = sample.caps().map(video_caps_info).unwrap_or_default();
        let (width, height) = (width.unwrap_or(0), height.unwrap_or(0));
        if rate.is_some() {
            self.info.frame_rate = rate;
        }
        let buffer = sample
            .buffer()
            .ok_or_else(|| VidfeedError::source_decode(&self.uri, "video sample without buffer"))?;
        let map = buffer
            .map_readable()
            .map_err(|_| VidfeedError::source_decode(&self.uri, "unreadable video buffer"))?;

        if width > 0 && height > 0 {
            self.info.width = Some(width);
            self.info.height = Some(height);
        }
        Ok(VideoFrame {
            pts_secs: clock_secs(buffer.pts()),
            width,
            height,
            data: map.as_slice().to_vec(),
        })
    }

    fn audio_chunk(&mut self, sample: gst::Sample) -> VidfeedResult<AudioChunk> {
        let structure = sample.caps().and_then(|c| c.structure(0));
        let rate = structure.and_then(|s| s.get::<i32>("rate").ok()).unwrap_or(0);
        let channels = structure.and_then(|s| s.get::<i32>("channels").ok()).unwrap_or(0);
        let buffer = sample
            .buffer()
            .ok_or_else(|| VidfeedError::source_decode(&self.uri, "audio sample without buffer"))?;
        let map = buffer
            .map_readable()
            .map_err(|_| VidfeedError::source_decode(&self.uri, "unreadable audio buffer"))?;

        self.info.has_audio = true;
        Ok(AudioChunk {
            pts_secs: clock_secs(buffer.pts()),
            sample_rate: rate.max(0) as u32,
            channels: channels.max(0) as u16,
            samples: map
                .as_slice()
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
        })
    }
}

#[async_trait::async_trait]
impl MediaSource for GstSource {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn info(&self) -> SourceInfo {
        self.info.clone()
    }

    async fn seek(&mut self, position_secs: f64) -> VidfeedResult<()> {
        self.pipeline
            .seek_simple(
                gst::SeekFlags::FLUSH | gst::SeekFlags::ACCURATE,
                secs_clock(position_secs),
            )
            .map_err(|e| VidfeedError::source_decode(&self.uri, format!("seek failed: {e}")))?;
        change_state(&self.pipeline, &self.uri, gst::State::Paused).await
    }

    async fn play(&mut self) -> VidfeedResult<()> {
        change_state(&self.pipeline, &self.uri, gst::State::Playing).await
    }

    async fn next_event(&mut self) -> VidfeedResult<SourceEvent> {
        loop {
            if let Some(message) = bus_error(&self.pipeline) {
                return Err(VidfeedError::source_decode(&self.uri, message));
            }
            if let Some(sample) = self.video.try_pull_sample(gst::ClockTime::ZERO) {
                return self.video_frame(sample).map(SourceEvent::Video);
            }
            if let Some(sample) = self.audio.try_pull_sample(gst::ClockTime::ZERO) {
                return self.audio_chunk(sample).map(SourceEvent::Audio);
            }
            let audio_done = self.audio.is_eos() || !self.info.has_audio;
            if self.video.is_eos() && audio_done {
                return Ok(SourceEvent::Ended);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    fn stop(&mut self) {
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            tracing::warn!(uri = %self.uri, error = ?e, "Failed to stop source pipeline");
        }
    }
}

impl Drop for GstSource {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

/// H.264/AAC in streamable Matroska.
pub struct GstEncoder {
    settings: EncoderSettings,
    pipeline: gst::Pipeline,
    video: gst_app::AppSrc,
    audio: gst_app::AppSrc,
    out: gst_app::AppSink,
    video_frames: u64,
    audio_frames: u64,
}

impl GstEncoder {
    pub fn new(settings: EncoderSettings) -> VidfeedResult<Self> {
        let EncoderSettings {
            width,
            height,
            fps,
            sample_rate,
            channels,
        } = settings;
        let keyint = fps.saturating_mul(2).max(2);
        let description = format!(
            "appsrc name=vsrc format=time caps=video/x-raw,format=RGBA,width={width},height={height},framerate={fps}/1 \
             ! videoconvert ! x264enc speed-preset=veryfast key-int-max={keyint} ! h264parse ! queue ! mux. \
             appsrc name=asrc format=time caps=audio/x-raw,format=F32LE,layout=interleaved,rate={sample_rate},channels={channels} \
             ! audioconvert ! avenc_aac ! aacparse ! queue ! mux. \
             matroskamux name=mux streamable=true ! appsink name=out sync=false"
        );
        let pipeline = gst::parse::launch(&description)
            .map_err(|e| VidfeedError::encoder(format!("failed to build encoder: {e}")))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| VidfeedError::encoder("launch string did not produce a pipeline"))?;

        Ok(Self {
            video: app_src(&pipeline, "vsrc")?,
            audio: app_src(&pipeline, "asrc")?,
            out: app_sink(&pipeline, "out")?,
            pipeline,
            settings,
            video_frames: 0,
            audio_frames: 0,
        })
    }

    fn push(src: &gst_app::AppSrc, data: Vec<u8>, pts: f64, duration: f64) -> VidfeedResult<()> {
        let mut buffer = gst::Buffer::from_mut_slice(data);
        if let Some(buf) = buffer.get_mut() {
            buf.set_pts(secs_clock(pts));
            buf.set_duration(secs_clock(duration));
        }
        src.push_buffer(buffer)
            .map(|_| ())
            .map_err(|e| VidfeedError::encoder(format!("encoder rejected buffer: {e:?}")))
    }
}

impl StreamEncoder for GstEncoder {
    fn mime_type(&self) -> &str {
        MATROSKA_MIME
    }

    fn settings(&self) -> &EncoderSettings {
        &self.settings
    }

    fn start(&mut self) -> VidfeedResult<()> {
        self.pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| VidfeedError::encoder(format!("failed to start encoder: {e:?}")))?;
        Ok(())
    }

    fn write_video(&mut self, surface: &Surface) -> VidfeedResult<()> {
        let interval = 1.0 / self.settings.fps as f64;
        let pts = self.video_frames as f64 * interval;
        Self::push(&self.video, surface.data().to_vec(), pts, interval)?;
        self.video_frames += 1;
        Ok(())
    }

    fn write_audio(&mut self, samples: &[f32]) -> VidfeedResult<()> {
        if samples.is_empty() {
            return Ok(());
        }
        let channels = self.settings.channels.max(1) as u64;
        let frames = samples.len() as u64 / channels;
        let rate = self.settings.sample_rate as f64;
        let pts = self.audio_frames as f64 / rate;
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self::push(&self.audio, bytes, pts, frames as f64 / rate)?;
        self.audio_frames += frames;
        Ok(())
    }

    fn drain_chunks(&mut self) -> Vec<Vec<u8>> {
        let mut chunks = Vec::new();
        while let Some(sample) = self.out.try_pull_sample(gst::ClockTime::ZERO) {
            if let Some(buffer) = sample.buffer() {
                if let Ok(map) = buffer.map_readable() {
                    chunks.push(map.as_slice().to_vec());
                }
            }
        }
        chunks
    }

    fn finish(mut self: Box<Self>, mut output: OutputAccumulator) -> VidfeedResult<RenderOutput> {
        let _ = self.video.end_of_stream();
        let _ = self.audio.end_of_stream();

        let deadline = std::time::Instant::now() + DRAIN_TIMEOUT;
        while !self.out.is_eos() {
            if std::time::Instant::now() >= deadline {
                tracing::warn!("Encoder drain timed out after 10s");
                break;
            }
            if let Some(message) = bus_error(&self.pipeline) {
                let _ = self.pipeline.set_state(gst::State::Null);
                return Err(VidfeedError::encoder(message));
            }
            match self.out.try_pull_sample(gst::ClockTime::from_mseconds(100)) {
                Some(sample) => {
                    if let Some(buffer) = sample.buffer() {
                        if let Ok(map) = buffer.map_readable() {
                            output.push(map.as_slice().to_vec());
                        }
                    }
                }
                None => continue,
            }
        }
        output.extend(self.drain_chunks());
        let _ = self.pipeline.set_state(gst::State::Null);

        if output.bytes() == 0 {
            return Err(VidfeedError::encoder("encoder produced no data"));
        }
        let duration_secs = self.video_frames as f64 / self.settings.fps as f64;
        tracing::info!(
            frames = self.video_frames,
            chunks = output.chunk_count(),
            bytes = output.bytes(),
            "Matroska encoder finished"
        );
        Ok(RenderOutput {
            bytes: output.into_bytes(),
            mime_type: MATROSKA_MIME.to_string(),
            duration_secs,
            width: self.settings.width,
            height: self.settings.height,
        })
    }

    fn abort(self: Box<Self>) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_paths_become_file_uris() {
        let dir = std::env::temp_dir();
        let uri = normalize_uri(dir.to_str().unwrap()).unwrap();
        assert!(uri.starts_with("file://"));
        assert_eq!(normalize_uri("https://a/b.mp4").unwrap(), "https://a/b.mp4");
        assert!(normalize_uri("/definitely/not/here.mp4").is_err());
    }

    #[test]
    fn prerolled_caps_size_the_source() {
        init_gstreamer().unwrap();
        let video = gst::Caps::builder("video/x-raw")
            .field("format", "RGBA")
            .field("width", 1920i32)
            .field("height", 1080i32)
            .field("framerate", gst::Fraction::new(30000, 1001))
            .build();
        let audio = gst::Caps::builder("audio/x-raw")
            .field("format", "F32LE")
            .field("rate", 48000i32)
            .field("channels", 2i32)
            .build();

        let info = source_info(Some(12.0), Some(&*video), Some(&*audio));
        assert_eq!(info.dimensions(), Some((1920, 1080)));
        assert!((info.frame_rate.unwrap() - 29.97).abs() < 0.01);
        assert!(info.has_audio);
        assert_eq!(info.duration_secs, Some(12.0));
    }

    #[test]
    fn unnegotiated_caps_leave_dimensions_unknown() {
        init_gstreamer().unwrap();
        let partial = gst::Caps::builder("video/x-raw").field("format", "RGBA").build();
        let info = source_info(None, Some(&*partial), None);
        assert_eq!(info.dimensions(), None);
        assert!(!info.has_audio);
        assert_eq!(source_info(None, None, None).dimensions(), None);
    }
}
