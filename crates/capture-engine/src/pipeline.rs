//! One real-time playback pass of a source through the filter into the
//! job's encoder.
//!
//! Passes of the same job share the surface, mix bus, encoder, and
//! [`PassTimeline`], so the output timeline continues where the previous
//! pass stopped.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use vidfeed_common::clock::{secs_to_ns, DriftMeasurement, FrameRateConformer};
use vidfeed_common::error::{VidfeedError, VidfeedResult};
use vidfeed_feed_model::filter::ColorMatrix;

use crate::encoder::{OutputAccumulator, StreamEncoder};
use crate::mix_bus::MixBus;
use crate::source::{AudioChunk, MediaSource, SourceEvent, VideoFrame};
use crate::surface::Surface;

/// Audio drift tolerated before inserting silence or dropping samples.
const AUDIO_SLACK_SECS: f64 = 0.005;

/// Drift between media time and wall time worth a warning.
const DRIFT_WARN_MS: f64 = 250.0;

/// Largest silence chunk written in one go.
const SILENCE_CHUNK_SECS: u32 = 1;

/// The part of a source a pass plays.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassWindow {
    pub start: f64,
    /// `None` plays until the source ends.
    pub end: Option<f64>,
}

impl PassWindow {
    pub fn full() -> Self {
        Self {
            start: 0.0,
            end: None,
        }
    }

    pub fn between(start: f64, end: f64) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    fn reached_end(&self, pts: f64) -> bool {
        matches!(self.end, Some(end) if pts >= end)
    }
}

/// What to do with an incoming audio chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioPlan {
    /// Silence frames to write first.
    pub pad_frames: u64,
    /// Leading chunk frames to drop.
    pub skip_frames: u64,
    /// Chunk frames to write after the skip.
    pub take_frames: u64,
}

/// Output timeline shared by every pass of a job.
#[derive(Debug)]
pub struct PassTimeline {
    video: FrameRateConformer,
    audio_frames: u64,
    sample_rate: u32,
    channels: u16,
    offset_secs: f64,
}

impl PassTimeline {
    pub fn new(fps: u32, sample_rate: u32, channels: u16) -> Self {
        Self {
            video: FrameRateConformer::new(fps),
            audio_frames: 0,
            sample_rate: sample_rate.max(1),
            channels: channels.max(1),
            offset_secs: 0.0,
        }
    }

    /// Output time at which the current pass begins.
    pub fn offset_secs(&self) -> f64 {
        self.offset_secs
    }

    pub fn video_frames(&self) -> u64 {
        self.video.frames_written()
    }

    pub fn audio_frames(&self) -> u64 {
        self.audio_frames
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Output copies owed for a frame at `out_pts`.
    pub fn video_copies(&mut self, out_pts: f64) -> u64 {
        self.video.frames_due(out_pts)
    }

    /// Place `frames` of audio starting at `out_pts`, never writing past
    /// `limit_secs` on the output timeline.
    pub fn plan_audio(&mut self, out_pts: f64, frames: u64, limit_secs: Option<f64>) -> AudioPlan {
        let rate = self.sample_rate as f64;
        let expected = self.audio_frames as f64 / rate;
        let drift = out_pts - expected;

        let mut plan = AudioPlan {
            pad_frames: 0,
            skip_frames: 0,
            take_frames: frames,
        };
        if drift > AUDIO_SLACK_SECS {
            plan.pad_frames = (drift * rate).round() as u64;
        } else if drift < -AUDIO_SLACK_SECS {
            plan.skip_frames = ((-drift * rate).round() as u64).min(frames);
            plan.take_frames = frames - plan.skip_frames;
        }

        if let Some(limit) = limit_secs {
            let limit_frames = (limit * rate).round() as u64;
            let room = limit_frames.saturating_sub(self.audio_frames);
            plan.pad_frames = plan.pad_frames.min(room);
            plan.take_frames = plan.take_frames.min(room - plan.pad_frames);
        }

        self.audio_frames += plan.pad_frames + plan.take_frames;
        plan
    }

    /// Close a pass that covered `pass_secs` of media. Returns the video
    /// frames and audio frames needed to pad the output up to the new
    /// offset.
    pub fn close_pass(&mut self, pass_secs: f64) -> (u64, u64) {
        self.offset_secs += pass_secs.max(0.0);
        let video_pad = self.video.pad_to(self.offset_secs);
        let target = (self.offset_secs * self.sample_rate as f64).round() as u64;
        let audio_pad = target.saturating_sub(self.audio_frames);
        self.audio_frames += audio_pad;
        (video_pad, audio_pad)
    }
}

/// Everything a pass writes into, owned by the render job.
pub struct PassContext<'a> {
    pub encoder: &'a mut dyn StreamEncoder,
    pub output: &'a mut OutputAccumulator,
    pub mix_bus: &'a mut MixBus,
    pub surface: &'a mut Surface,
    pub timeline: &'a mut PassTimeline,
    pub cancel: &'a mut watch::Receiver<bool>,
    /// Fail when no source event arrives for this long.
    pub stall_timeout: Option<Duration>,
}

/// Outcome of one pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassReport {
    pub frames_composited: u64,
    /// Output frames written, including padding.
    pub frames_written: u64,
    pub audio_chunks: u64,
    /// Media time the pass covered.
    pub media_elapsed_secs: f64,
    pub wall_secs: f64,
}

/// Play `window` of `source` through `filter` into the job's encoder.
///
/// `on_progress` receives the media time elapsed since `window.start` after
/// every composited frame. The source is stopped and the mix bus
/// disconnected on every exit path.
pub async fn run_pass(
    source: &mut dyn MediaSource,
    filter: &[ColorMatrix],
    window: PassWindow,
    ctx: PassContext<'_>,
    on_progress: &mut (dyn FnMut(f64) + Send),
) -> VidfeedResult<PassReport> {
    let uri = source.uri().to_string();
    let started = Instant::now();
    ctx.mix_bus.connect(&uri);

    tracing::info!(
        uri = %uri,
        start = window.start,
        end = ?window.end,
        offset = ctx.timeline.offset_secs(),
        "Pass started"
    );

    let PassContext {
        encoder,
        output,
        mix_bus,
        surface,
        timeline,
        cancel,
        stall_timeout,
    } = ctx;

    let mut writer = PassWriter {
        encoder,
        output,
        mix_bus,
        surface,
        timeline,
        filter,
        window,
        uri: &uri,
        report: PassReport::default(),
        media_end: window.start,
    };

    let result = play_window(source, &mut writer, cancel, stall_timeout, on_progress).await;
    source.stop();
    writer.mix_bus.disconnect();

    let reached_end = result?;
    let pass_secs = pass_length(&window, reached_end, writer.media_end, source.info().duration_secs);
    writer.close(pass_secs)?;

    let mut report = writer.report;
    report.media_elapsed_secs = pass_secs;
    report.wall_secs = started.elapsed().as_secs_f64();

    let drift = DriftMeasurement {
        reference_ns: secs_to_ns(pass_secs),
        measured_ns: secs_to_ns(report.wall_secs),
    };
    if drift.exceeds_threshold_ms(DRIFT_WARN_MS) {
        tracing::warn!(
            uri = %uri,
            drift_ms = drift.drift_ms(),
            "Pass wall time drifted from media time"
        );
    }
    tracing::info!(
        uri = %uri,
        media_secs = pass_secs,
        wall_secs = report.wall_secs,
        frames = report.frames_written,
        "Pass finished"
    );

    Ok(report)
}

/// Seek, play, and consume events until the window is covered. Returns true
/// when the window end was reached, false when the source ended first.
async fn play_window(
    source: &mut dyn MediaSource,
    writer: &mut PassWriter<'_>,
    cancel: &mut watch::Receiver<bool>,
    stall_timeout: Option<Duration>,
    on_progress: &mut (dyn FnMut(f64) + Send),
) -> VidfeedResult<bool> {
    let uri = writer.uri.to_string();
    let start = writer.window.start;

    guarded(cancel, stall_timeout, &uri, "seek", source.seek(start)).await?;
    guarded(cancel, stall_timeout, &uri, "play", source.play()).await?;

    loop {
        let event = guarded(cancel, stall_timeout, &uri, "decode", source.next_event()).await?;
        match event {
            SourceEvent::Video(frame) => {
                if writer.window.reached_end(frame.pts_secs) {
                    return Ok(true);
                }
                if frame.pts_secs + 1e-6 < start {
                    continue;
                }
                writer.video(&frame)?;
                on_progress((frame.pts_secs - start).max(0.0));
            }
            SourceEvent::Audio(chunk) => {
                if writer.window.reached_end(chunk.pts_secs) {
                    return Ok(true);
                }
                writer.audio(&chunk)?;
            }
            SourceEvent::Ended => return Ok(false),
        }
    }
}

fn pass_length(window: &PassWindow, reached_end: bool, media_end: f64, duration: Option<f64>) -> f64 {
    let end = match (reached_end, window.end) {
        (true, Some(end)) => end,
        _ => {
            let known = duration.filter(|d| d.is_finite() && *d > 0.0);
            let natural = known.map_or(media_end, |d| d.max(media_end));
            window.end.map_or(natural, |end| natural.min(end))
        }
    };
    (end - window.start).max(0.0)
}

struct PassWriter<'a> {
    encoder: &'a mut dyn StreamEncoder,
    output: &'a mut OutputAccumulator,
    mix_bus: &'a mut MixBus,
    surface: &'a mut Surface,
    timeline: &'a mut PassTimeline,
    filter: &'a [ColorMatrix],
    window: PassWindow,
    uri: &'a str,
    report: PassReport,
    /// Furthest source time seen so far.
    media_end: f64,
}

impl PassWriter<'_> {
    fn out_pts(&self, source_pts: f64) -> f64 {
        self.timeline.offset_secs() + (source_pts - self.window.start).max(0.0)
    }

    fn out_limit(&self) -> Option<f64> {
        self.window
            .end
            .map(|end| self.timeline.offset_secs() + (end - self.window.start))
    }

    fn video(&mut self, frame: &VideoFrame) -> VidfeedResult<()> {
        self.surface
            .composite(frame, self.filter)
            .map_err(|e| with_uri(e, self.uri))?;
        self.report.frames_composited += 1;

        let out_pts = self.out_pts(frame.pts_secs);
        let copies = self.timeline.video_copies(out_pts);
        for _ in 0..copies {
            self.encoder.write_video(self.surface)?;
        }
        self.report.frames_written += copies;
        self.media_end = self.media_end.max(frame.pts_secs);
        self.drain();
        Ok(())
    }

    fn audio(&mut self, chunk: &AudioChunk) -> VidfeedResult<()> {
        let chunk_end = chunk.pts_secs + chunk.duration_secs();
        if chunk_end <= self.window.start {
            return Ok(());
        }
        self.media_end = self.media_end.max(chunk_end);

        let mixed = self.mix_bus.mix(chunk);
        let channels = self.timeline.channels() as usize;
        let total = mixed.len() / channels;
        let lead = preroll_frames(chunk.pts_secs, chunk.duration_secs(), self.window.start, total);
        let frames = (total - lead) as u64;
        if frames == 0 {
            return Ok(());
        }
        let kept = &mixed[lead * channels..];

        let out_pts = self.out_pts(chunk.pts_secs.max(self.window.start));
        let limit = self.out_limit();
        let plan = self.timeline.plan_audio(out_pts, frames, limit);
        self.write_silence(plan.pad_frames)?;
        let from = plan.skip_frames as usize * channels;
        let to = from + plan.take_frames as usize * channels;
        if to > from {
            self.encoder.write_audio(&kept[from..to])?;
        }
        self.report.audio_chunks += 1;
        self.drain();
        Ok(())
    }

    fn close(&mut self, pass_secs: f64) -> VidfeedResult<()> {
        let (video_pad, audio_pad) = self.timeline.close_pass(pass_secs);
        for _ in 0..video_pad {
            self.encoder.write_video(self.surface)?;
        }
        self.report.frames_written += video_pad;
        self.write_silence(audio_pad)?;
        self.drain();
        if video_pad > 0 || audio_pad > 0 {
            tracing::debug!(uri = %self.uri, video_pad, audio_pad, "Padded pass tail");
        }
        Ok(())
    }

    fn write_silence(&mut self, frames: u64) -> VidfeedResult<()> {
        let channels = self.timeline.channels() as usize;
        let step = (self.mix_bus.settings().sample_rate * SILENCE_CHUNK_SECS).max(1) as u64;
        let mut remaining = frames;
        while remaining > 0 {
            let n = remaining.min(step);
            self.encoder.write_audio(&vec![0.0; n as usize * channels])?;
            remaining -= n;
        }
        Ok(())
    }

    fn drain(&mut self) {
        self.output.extend(self.encoder.drain_chunks());
    }
}

/// Mixed frames of a chunk that fall before `window_start`.
fn preroll_frames(chunk_pts: f64, chunk_secs: f64, window_start: f64, frames: usize) -> usize {
    let lead = window_start - chunk_pts;
    if lead <= 0.0 || chunk_secs <= 0.0 {
        return 0;
    }
    let share = (lead / chunk_secs).min(1.0);
    ((share * frames as f64).round() as usize).min(frames)
}

fn with_uri(err: VidfeedError, uri: &str) -> VidfeedError {
    match err {
        VidfeedError::SourceDecode { message, .. } => VidfeedError::source_decode(uri, message),
        other => other,
    }
}

/// Await `fut` under the stall watchdog, aborting with
/// [`VidfeedError::Cancelled`] as soon as the cancel flag is raised.
async fn guarded<T, F>(
    cancel: &mut watch::Receiver<bool>,
    stall_timeout: Option<Duration>,
    uri: &str,
    stage: &str,
    fut: F,
) -> VidfeedResult<T>
where
    F: Future<Output = VidfeedResult<T>>,
{
    let watched = async {
        match stall_timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await.unwrap_or_else(|_| {
                Err(VidfeedError::source_decode(
                    uri,
                    format!("{stage} stalled for {:.1}s", limit.as_secs_f64()),
                ))
            }),
            None => fut.await,
        }
    };
    cancellable(cancel, watched).await
}

/// Race `fut` against the cancel flag. A dropped sender means nobody can
/// cancel any more, so the future simply runs to completion.
pub async fn cancellable<T, F>(cancel: &mut watch::Receiver<bool>, fut: F) -> VidfeedResult<T>
where
    F: Future<Output = VidfeedResult<T>>,
{
    if *cancel.borrow() {
        return Err(VidfeedError::Cancelled);
    }
    tokio::pin!(fut);
    loop {
        tokio::select! {
            biased;
            changed = cancel.changed() => match changed {
                Ok(()) => {
                    if *cancel.borrow() {
                        return Err(VidfeedError::Cancelled);
                    }
                }
                Err(_) => return fut.await,
            },
            result = &mut fut => return result,
        }
    }
}
