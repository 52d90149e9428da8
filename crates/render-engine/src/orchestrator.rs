//! Render job lifecycle.
//!
//! ```text
//! Idle ──start──► Running ──► Completed
//!                    │    └──► Failed
//!                    └─cancel─► Idle
//! ```
//!
//! At most one job runs at a time. A job owns one encoder, one surface, and
//! one fresh mix bus for its whole lifetime; every pass of a merge writes
//! into the same encoder so the output is a single continuous stream.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

use vidfeed_capture_engine::backend::MediaBackend;
use vidfeed_capture_engine::encoder::{EncoderSettings, OutputAccumulator, StreamEncoder};
use vidfeed_capture_engine::mix_bus::{MixBus, MixBusSettings};
use vidfeed_capture_engine::pipeline::{cancellable, run_pass, PassContext, PassTimeline, PassWindow};
use vidfeed_capture_engine::surface::Surface;
use vidfeed_common::config::RenderConfig;
use vidfeed_common::error::{VidfeedError, VidfeedResult};
use vidfeed_editing_core::progress::ProgressTracker;
use vidfeed_editing_core::sequencer::DurationProbe;
use vidfeed_feed_model::clip::Clip;
use vidfeed_feed_model::filter::FilterSpec;
use vidfeed_feed_model::render::{RenderMode, RenderOutput, RenderSnapshot, RenderStatus};
use vidfeed_feed_model::trim::TrimRange;

/// Observer invoked with every published snapshot of a job.
pub type ProgressCallback = Box<dyn Fn(&RenderSnapshot) + Send + Sync>;

/// What a job renders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum RenderInput {
    /// One window of a single source.
    Trim {
        source_uri: String,
        range: TrimRange,
        /// Duration the range was selected against.
        source_duration: f64,
    },
    /// Every clip in order, concatenated.
    Merge { clips: Vec<Clip> },
}

impl RenderInput {
    pub fn mode(&self) -> RenderMode {
        match self {
            RenderInput::Trim { .. } => RenderMode::Trim,
            RenderInput::Merge { .. } => RenderMode::Merge,
        }
    }
}

/// A request to start a render job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderRequest {
    /// Identifier the job will run under.
    pub job_id: Uuid,
    pub input: RenderInput,
    pub filter: FilterSpec,
}

impl RenderRequest {
    pub fn new(input: RenderInput, filter: FilterSpec) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            input,
            filter,
        }
    }

    pub fn trim(source_uri: impl Into<String>, range: TrimRange, source_duration: f64, filter: FilterSpec) -> Self {
        Self::new(
            RenderInput::Trim {
                source_uri: source_uri.into(),
                range,
                source_duration,
            },
            filter,
        )
    }

    pub fn merge(clips: Vec<Clip>, filter: FilterSpec) -> Self {
        Self::new(RenderInput::Merge { clips }, filter)
    }

    /// Reject requests that can never run. Checked before any resource is
    /// acquired.
    pub fn validate(&self) -> VidfeedResult<()> {
        match &self.input {
            RenderInput::Trim {
                source_uri,
                range,
                source_duration,
            } => {
                if source_uri.is_empty() {
                    return Err(VidfeedError::precondition("trim requires a source"));
                }
                if !TrimRange::is_valid(range.start, range.end, *source_duration) {
                    return Err(VidfeedError::precondition(format!(
                        "invalid trim range {:.3}..{:.3} for a {:.3}s source",
                        range.start, range.end, source_duration
                    )));
                }
            }
            RenderInput::Merge { clips } => {
                if clips.is_empty() {
                    return Err(VidfeedError::precondition("merge requires at least one clip"));
                }
            }
        }
        Ok(())
    }
}

/// One planned pass of a job.
#[derive(Debug, Clone)]
struct PassPlan {
    uri: String,
    window: PassWindow,
    /// Media time the pass is expected to cover, if known.
    expected_secs: Option<f64>,
}

fn plan_passes(input: &RenderInput) -> Vec<PassPlan> {
    match input {
        RenderInput::Trim {
            source_uri, range, ..
        } => vec![PassPlan {
            uri: source_uri.clone(),
            window: PassWindow::between(range.start, range.end),
            expected_secs: Some(range.len()),
        }],
        RenderInput::Merge { clips } => clips
            .iter()
            .map(|clip| PassPlan {
                uri: clip.source_uri.clone(),
                window: PassWindow::full(),
                expected_secs: clip.duration_secs.filter(|d| d.is_finite() && *d > 0.0),
            })
            .collect(),
    }
}

/// Encoder and mix bus of one job. Dropping it without [`finish`] aborts
/// the encoder and releases the audio graph.
///
/// [`finish`]: RenderResources::finish
struct RenderResources {
    encoder: Option<Box<dyn StreamEncoder>>,
    mix_bus: MixBus,
}

impl RenderResources {
    fn acquire(
        backend: &dyn MediaBackend,
        settings: EncoderSettings,
        bus: MixBusSettings,
    ) -> VidfeedResult<Self> {
        let mut encoder = backend.create_encoder(&settings)?;
        if let Err(e) = encoder.start() {
            encoder.abort();
            return Err(e);
        }
        Ok(Self {
            encoder: Some(encoder),
            mix_bus: backend.create_mix_bus(bus),
        })
    }

    fn finish(mut self, output: OutputAccumulator) -> VidfeedResult<RenderOutput> {
        let encoder = self
            .encoder
            .take()
            .ok_or_else(|| VidfeedError::encoder("encoder already finished"))?;
        let result = encoder.finish(output);
        self.mix_bus.release();
        result
    }
}

impl Drop for RenderResources {
    fn drop(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            encoder.abort();
        }
        self.mix_bus.release();
    }
}

struct ActiveJob {
    id: Uuid,
    cancel: watch::Sender<bool>,
}

/// Resets the orchestrator if a job future is dropped before it settles.
struct JobGuard<'a> {
    orchestrator: &'a RenderOrchestrator,
    job_id: Uuid,
    settled: bool,
}

impl Drop for JobGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!(job = %self.job_id, "Render job dropped while running");
            self.orchestrator.settle(self.job_id, |s| {
                s.status = RenderStatus::Idle;
                s.progress_percent = 0.0;
                s.error = None;
            });
        }
    }
}

/// Runs render jobs against a media backend and publishes their state.
pub struct RenderOrchestrator {
    backend: Arc<dyn MediaBackend>,
    config: RenderConfig,
    snapshot_tx: watch::Sender<RenderSnapshot>,
    active: Mutex<Option<ActiveJob>>,
}

impl RenderOrchestrator {
    pub fn new(backend: Arc<dyn MediaBackend>, config: RenderConfig) -> VidfeedResult<Self> {
        config.validate()?;
        let (snapshot_tx, _) = watch::channel(RenderSnapshot::default());
        Ok(Self {
            backend,
            config,
            snapshot_tx,
            active: Mutex::new(None),
        })
    }

    pub fn backend(&self) -> &Arc<dyn MediaBackend> {
        &self.backend
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Current state.
    pub fn snapshot(&self) -> RenderSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Stream of state changes.
    pub fn subscribe(&self) -> watch::Receiver<RenderSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.active().is_some()
    }

    /// Render `request` to completion.
    pub async fn start(&self, request: RenderRequest) -> VidfeedResult<RenderOutput> {
        self.start_with_progress(request, None).await
    }

    /// Render `request`, invoking `progress` with every published snapshot.
    ///
    /// Fails with [`VidfeedError::Precondition`] before touching any resource
    /// when the request is invalid or another job is running. Resolves with
    /// [`VidfeedError::Cancelled`] when the job is cancelled.
    pub async fn start_with_progress(
        &self,
        request: RenderRequest,
        progress: Option<ProgressCallback>,
    ) -> VidfeedResult<RenderOutput> {
        request.validate()?;
        let job_id = request.job_id;
        let mode = request.input.mode();
        let mut cancel_rx = self.begin(job_id, mode)?;
        let mut guard = JobGuard {
            orchestrator: self,
            job_id,
            settled: false,
        };
        let callback = progress.as_deref();
        if let Some(cb) = callback {
            cb(&self.snapshot());
        }

        let result = self.run_job(&request, &mut cancel_rx, callback).await;
        guard.settled = true;

        match result {
            Ok(output) => {
                let snapshot = self.settle(job_id, |s| {
                    s.status = RenderStatus::Completed;
                    s.progress_percent = 100.0;
                    s.error = None;
                });
                tracing::info!(
                    job = %job_id,
                    mode = ?mode,
                    bytes = output.bytes.len(),
                    duration_secs = output.duration_secs,
                    "Render completed"
                );
                notify(callback, &snapshot);
                Ok(output)
            }
            Err(VidfeedError::Cancelled) => {
                let snapshot = self.settle(job_id, |s| {
                    s.status = RenderStatus::Idle;
                    s.progress_percent = 0.0;
                    s.error = None;
                });
                tracing::info!(job = %job_id, "Render cancelled");
                notify(callback, &snapshot);
                Err(VidfeedError::Cancelled)
            }
            Err(e) => {
                let message = e.to_string();
                let snapshot = self.settle(job_id, |s| {
                    s.status = RenderStatus::Failed;
                    s.error = Some(message.clone());
                });
                tracing::error!(job = %job_id, error = %e, "Render failed");
                notify(callback, &snapshot);
                Err(e)
            }
        }
    }

    /// Cancel the running job, if any. Returns true when a job was signalled.
    pub fn cancel(&self) -> bool {
        match self.active().as_ref() {
            Some(job) => {
                tracing::info!(job = %job.id, "Cancelling render");
                let _ = job.cancel.send(true);
                true
            }
            None => false,
        }
    }

    /// Cancel the running job only if it is `job_id`.
    pub fn cancel_job(&self, job_id: Uuid) -> bool {
        match self.active().as_ref() {
            Some(job) if job.id == job_id => {
                tracing::info!(job = %job.id, "Cancelling render");
                let _ = job.cancel.send(true);
                true
            }
            _ => false,
        }
    }

    /// Return a finished or failed orchestrator to `Idle`.
    pub fn reset(&self) -> bool {
        if self.is_running() {
            return false;
        }
        self.snapshot_tx.send_if_modified(|s| {
            if s.status.is_terminal() {
                s.status = RenderStatus::Idle;
                s.progress_percent = 0.0;
                s.error = None;
                true
            } else {
                false
            }
        })
    }

    fn active(&self) -> MutexGuard<'_, Option<ActiveJob>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claim the orchestrator for a new job. Synchronous so the Running
    /// check and the claim cannot interleave with another `start`.
    fn begin(&self, job_id: Uuid, mode: RenderMode) -> VidfeedResult<watch::Receiver<bool>> {
        let mut active = self.active();
        if let Some(job) = active.as_ref() {
            return Err(VidfeedError::precondition(format!(
                "render {} is already running",
                job.id
            )));
        }
        let (cancel, cancel_rx) = watch::channel(false);
        *active = Some(ActiveJob { id: job_id, cancel });
        self.snapshot_tx.send_replace(RenderSnapshot {
            job_id: Some(job_id),
            mode: Some(mode),
            status: RenderStatus::Running,
            progress_percent: 0.0,
            error: None,
        });
        Ok(cancel_rx)
    }

    /// Publish the final state of `job_id` and release the claim.
    fn settle(&self, job_id: Uuid, update: impl FnOnce(&mut RenderSnapshot)) -> RenderSnapshot {
        let mut active = self.active();
        if active.as_ref().map(|j| j.id) == Some(job_id) {
            *active = None;
        }
        self.snapshot_tx.send_modify(|s| {
            if s.job_id == Some(job_id) {
                update(s);
            }
        });
        self.snapshot()
    }

    fn publish_progress(&self, job_id: Uuid, percent: f64, callback: Option<&(dyn Fn(&RenderSnapshot) + Send + Sync)>) {
        let changed = self.snapshot_tx.send_if_modified(|s| {
            if s.job_id == Some(job_id) && s.status == RenderStatus::Running && s.progress_percent != percent {
                s.progress_percent = percent;
                true
            } else {
                false
            }
        });
        if changed {
            notify(callback, &self.snapshot());
        }
    }

    async fn run_job(
        &self,
        request: &RenderRequest,
        cancel: &mut watch::Receiver<bool>,
        callback: Option<&(dyn Fn(&RenderSnapshot) + Send + Sync)>,
    ) -> VidfeedResult<RenderOutput> {
        let job_id = request.job_id;
        let mode = request.input.mode();
        let passes = plan_passes(&request.input);
        let total_expected: f64 = passes.iter().filter_map(|p| p.expected_secs).sum();
        let filter = request.filter.expression.compile();
        let cfg = &self.config;

        tracing::info!(
            job = %job_id,
            mode = ?mode,
            passes = passes.len(),
            filter = %request.filter.name,
            total_secs = total_expected,
            backend = self.backend.name(),
            "Render started"
        );

        let first_uri = passes
            .first()
            .map(|p| p.uri.clone())
            .ok_or_else(|| VidfeedError::precondition("nothing to render"))?;
        let first = cancellable(cancel, self.backend.open_source(&first_uri)).await?;
        let (width, height) = first
            .info()
            .dimensions()
            .unwrap_or((cfg.fallback_width, cfg.fallback_height));
        tracing::debug!(job = %job_id, width, height, "Surface sized");

        let settings = EncoderSettings {
            width,
            height,
            fps: cfg.output_fps,
            sample_rate: cfg.audio_sample_rate,
            channels: cfg.audio_channels,
        };
        let bus = MixBusSettings {
            sample_rate: cfg.audio_sample_rate,
            channels: cfg.audio_channels,
            gain: 1.0,
        };
        let mut resources = RenderResources::acquire(self.backend.as_ref(), settings, bus)?;
        let capacity = resources.encoder.as_deref().and_then(|e| e.max_duration_secs());
        if let Some(max) = capacity.filter(|max| total_expected > *max) {
            tracing::warn!(job = %job_id, total_secs = total_expected, max_secs = max, "Output too long for the container");
            return Err(VidfeedError::encoder(format!(
                "{total_expected:.1}s of {width}x{height} output exceeds the {max:.1}s the container can hold"
            )));
        }
        let mut surface = Surface::new(width, height);
        let mut timeline = PassTimeline::new(cfg.output_fps, cfg.audio_sample_rate, cfg.audio_channels);
        let mut output = OutputAccumulator::new();
        let mut tracker = ProgressTracker::new(mode, total_expected);
        let stall_timeout = cfg.stall_timeout_secs.map(Duration::from_secs_f64);

        let mut pending = Some(first);
        for (index, pass) in passes.iter().enumerate() {
            let mut source = match pending.take() {
                Some(source) => source,
                None => cancellable(cancel, self.backend.open_source(&pass.uri)).await?,
            };
            tracing::debug!(job = %job_id, pass = index, uri = %pass.uri, "Pass opening");

            let RenderResources { encoder, mix_bus } = &mut resources;
            let encoder = encoder
                .as_deref_mut()
                .ok_or_else(|| VidfeedError::encoder("encoder already finished"))?;
            let ctx = PassContext {
                encoder,
                output: &mut output,
                mix_bus,
                surface: &mut surface,
                timeline: &mut timeline,
                cancel: &mut *cancel,
                stall_timeout,
            };

            let report = {
                let tracker = &mut tracker;
                let mut on_progress = |elapsed: f64| {
                    let percent = tracker.tick(elapsed);
                    self.publish_progress(job_id, percent, callback);
                };
                run_pass(&mut *source, &filter, pass.window, ctx, &mut on_progress).await?
            };

            let covered = pass.expected_secs.unwrap_or(report.media_elapsed_secs);
            let percent = tracker.finish_pass(covered);
            self.publish_progress(job_id, percent, callback);
            tracing::info!(
                job = %job_id,
                pass = index,
                frames = report.frames_written,
                media_secs = report.media_elapsed_secs,
                percent,
                "Pass complete"
            );
        }

        resources.finish(output)
    }
}

fn notify(callback: Option<&(dyn Fn(&RenderSnapshot) + Send + Sync)>, snapshot: &RenderSnapshot) {
    if let Some(cb) = callback {
        cb(snapshot);
    }
}

#[async_trait::async_trait]
impl DurationProbe for RenderOrchestrator {
    async fn probe_duration(&self, uri: &str) -> VidfeedResult<f64> {
        self.backend.probe_duration(uri).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidfeed_capture_engine::backend::SyntheticBackend;
    use vidfeed_editing_core::filters;

    fn orchestrator() -> RenderOrchestrator {
        RenderOrchestrator::new(Arc::new(SyntheticBackend::new()), RenderConfig::default()).unwrap()
    }

    #[test]
    fn validate_rejects_bad_requests() {
        let filter = filters::identity().clone();
        let bad_trim = RenderRequest::trim("synthetic://a", TrimRange { start: 5.0, end: 3.0 }, 12.0, filter.clone());
        assert!(matches!(bad_trim.validate(), Err(VidfeedError::Precondition { .. })));

        let past_end = RenderRequest::trim("synthetic://a", TrimRange { start: 0.0, end: 13.0 }, 12.0, filter.clone());
        assert!(past_end.validate().is_err());

        let empty_merge = RenderRequest::merge(Vec::new(), filter);
        assert!(matches!(empty_merge.validate(), Err(VidfeedError::Precondition { .. })));
    }

    #[test]
    fn plans_one_pass_per_clip() {
        let clips = vec![
            Clip::new("synthetic://a", "A").with_duration(4.0),
            Clip::new("synthetic://b", "B"),
        ];
        let passes = plan_passes(&RenderInput::Merge { clips });
        assert_eq!(passes.len(), 2);
        assert_eq!(passes[0].expected_secs, Some(4.0));
        assert_eq!(passes[1].expected_secs, None);
        assert_eq!(passes[1].window, PassWindow::full());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = RenderConfig {
            output_fps: 0,
            ..RenderConfig::default()
        };
        assert!(RenderOrchestrator::new(Arc::new(SyntheticBackend::new()), config).is_err());
    }

    #[test]
    fn begin_claims_and_settle_releases() {
        let orch = orchestrator();
        let id = Uuid::new_v4();
        let _rx = orch.begin(id, RenderMode::Trim).unwrap();
        assert_eq!(orch.snapshot().status, RenderStatus::Running);
        assert!(matches!(
            orch.begin(Uuid::new_v4(), RenderMode::Merge),
            Err(VidfeedError::Precondition { .. })
        ));

        orch.settle(id, |s| s.status = RenderStatus::Failed);
        assert!(!orch.is_running());
        assert!(orch.reset());
        assert_eq!(orch.snapshot().status, RenderStatus::Idle);
    }

    #[test]
    fn cancel_without_job_is_a_no_op() {
        let orch = orchestrator();
        assert!(!orch.cancel());
        assert!(!orch.cancel_job(Uuid::new_v4()));
    }

    #[test]
    fn request_round_trips_through_json() {
        let request = RenderRequest::trim(
            "synthetic://a",
            TrimRange { start: 1.0, end: 2.0 },
            3.0,
            filters::get_filter("noir").unwrap().clone(),
        );
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"mode\":\"trim\""));
        let back: RenderRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, request);
    }
}
