//! Editing state for one subject video.

use std::future::Future;
use std::sync::Arc;

use uuid::Uuid;

use vidfeed_common::error::{VidfeedError, VidfeedResult};
use vidfeed_editing_core::filters;
use vidfeed_editing_core::sequencer::ClipSequencer;
use vidfeed_editing_core::trim::TrimSelector;
use vidfeed_feed_model::clip::Clip;
use vidfeed_feed_model::filter::FilterSpec;
use vidfeed_feed_model::render::{RenderMode, RenderOutput};

use crate::orchestrator::{ProgressCallback, RenderOrchestrator, RenderRequest};

/// An open editor: the subject video, its trim window, the merge sequence
/// seeded with the subject, and the selected filter.
///
/// Dropping the session cancels the render it last started, if that render
/// is still running.
pub struct EditorSession {
    subject: Clip,
    sequencer: ClipSequencer,
    trim: TrimSelector,
    active_filter: FilterSpec,
    orchestrator: Arc<RenderOrchestrator>,
    last_job: Option<Uuid>,
}

impl EditorSession {
    pub fn open(
        orchestrator: Arc<RenderOrchestrator>,
        source_uri: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        let mut sequencer = ClipSequencer::new();
        let subject = sequencer.append(source_uri, display_name);
        tracing::debug!(uri = %subject.source_uri, "Editor session opened");
        Self {
            subject,
            sequencer,
            trim: TrimSelector::default(),
            active_filter: filters::identity().clone(),
            orchestrator,
            last_job: None,
        }
    }

    /// Probe the subject and every clip of unknown duration.
    ///
    /// The trim selector is reset to the subject's full length. A subject
    /// that cannot be probed is an error; other clips just stay unprobed.
    pub async fn probe(&mut self) -> VidfeedResult<f64> {
        let duration = self
            .orchestrator
            .backend()
            .probe_duration(&self.subject.source_uri)
            .await?;
        self.subject.duration_secs = Some(duration);
        self.trim.reset(duration);
        self.sequencer.set_duration(self.subject.id, duration);
        let resolved = self.sequencer.probe_durations(self.orchestrator.as_ref()).await;
        tracing::debug!(duration, resolved, "Session probed");
        Ok(duration)
    }

    pub fn subject(&self) -> &Clip {
        &self.subject
    }

    pub fn sequencer(&self) -> &ClipSequencer {
        &self.sequencer
    }

    pub fn sequencer_mut(&mut self) -> &mut ClipSequencer {
        &mut self.sequencer
    }

    pub fn trim(&self) -> &TrimSelector {
        &self.trim
    }

    pub fn trim_mut(&mut self) -> &mut TrimSelector {
        &mut self.trim
    }

    pub fn active_filter(&self) -> &FilterSpec {
        &self.active_filter
    }

    /// Select a catalog filter by name. Unknown names select the identity.
    pub fn select_filter(&mut self, name: &str) -> &FilterSpec {
        self.active_filter = filters::get_or_identity(name).clone();
        &self.active_filter
    }

    /// Queue another clip for merging.
    pub fn add_clip(&mut self, source_uri: impl Into<String>, display_name: impl Into<String>) -> Clip {
        self.sequencer.append(source_uri, display_name)
    }

    pub fn orchestrator(&self) -> &Arc<RenderOrchestrator> {
        &self.orchestrator
    }

    /// Identifier of the last render this session started.
    pub fn last_job(&self) -> Option<Uuid> {
        self.last_job
    }

    /// Build the request for `mode` from the current editing state.
    pub fn request(&self, mode: RenderMode) -> VidfeedResult<RenderRequest> {
        match mode {
            RenderMode::Trim => {
                let range = self.trim.range().ok_or_else(|| {
                    VidfeedError::precondition("subject has not been probed")
                })?;
                Ok(RenderRequest::trim(
                    self.subject.source_uri.clone(),
                    range,
                    self.trim.duration(),
                    self.active_filter.clone(),
                ))
            }
            RenderMode::Merge => Ok(RenderRequest::merge(
                self.sequencer.clips().to_vec(),
                self.active_filter.clone(),
            )),
        }
    }

    /// Start a render of the current state.
    ///
    /// The request is captured now, so later edits do not affect the
    /// returned job.
    pub fn render(
        &mut self,
        mode: RenderMode,
    ) -> VidfeedResult<impl Future<Output = VidfeedResult<RenderOutput>> + Send + 'static> {
        self.render_with_progress(mode, None)
    }

    pub fn render_with_progress(
        &mut self,
        mode: RenderMode,
        progress: Option<ProgressCallback>,
    ) -> VidfeedResult<impl Future<Output = VidfeedResult<RenderOutput>> + Send + 'static> {
        let request = self.request(mode)?;
        self.last_job = Some(request.job_id);
        let orchestrator = Arc::clone(&self.orchestrator);
        Ok(async move { orchestrator.start_with_progress(request, progress).await })
    }

    /// Cancel the session's running render, if any.
    pub fn cancel(&self) -> bool {
        self.last_job
            .map(|id| self.orchestrator.cancel_job(id))
            .unwrap_or(false)
    }

    pub fn close(self) {}
}

impl Drop for EditorSession {
    fn drop(&mut self) {
        if self.cancel() {
            tracing::info!(uri = %self.subject.source_uri, "Session closed during render");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidfeed_capture_engine::backend::SyntheticBackend;
    use vidfeed_common::config::RenderConfig;

    fn session(uri: &str) -> EditorSession {
        let orch = RenderOrchestrator::new(Arc::new(SyntheticBackend::new()), RenderConfig::default()).unwrap();
        EditorSession::open(Arc::new(orch), uri, "Subject")
    }

    #[test]
    fn opens_with_identity_and_subject_clip() {
        let s = session("synthetic://subject?duration=12");
        assert!(s.active_filter().expression.is_identity());
        assert_eq!(s.sequencer().len(), 1);
        assert_eq!(s.sequencer().clips()[0].id, s.subject().id);
    }

    #[test]
    fn unknown_filter_falls_back_to_identity() {
        let mut s = session("synthetic://subject");
        assert_eq!(s.select_filter("noir").name, "noir");
        assert_eq!(s.select_filter("nope").name, filters::identity().name);
    }

    #[test]
    fn trim_request_needs_a_probe() {
        let s = session("synthetic://subject");
        assert!(matches!(
            s.request(RenderMode::Trim),
            Err(VidfeedError::Precondition { .. })
        ));
    }

    #[tokio::test]
    async fn probe_resets_trim_and_sequence() {
        let mut s = session("synthetic://subject?duration=12");
        s.add_clip("synthetic://other?duration=3", "Other");
        assert_eq!(s.probe().await.unwrap(), 12.0);
        assert_eq!(s.trim().end(), 12.0);
        assert!(s.sequencer().pending_probes().is_empty());
        assert_eq!(s.sequencer().total_duration_secs(), 15.0);

        assert!(s.trim_mut().set_start(5.0));
        let request = s.request(RenderMode::Trim).unwrap();
        assert_eq!(request.input.mode(), RenderMode::Trim);
        request.validate().unwrap();
    }

    #[tokio::test]
    async fn unreachable_subject_fails_probe() {
        let mut s = session("synthetic://subject?fail=open");
        assert!(s.probe().await.is_err());
        assert!(s.trim().range().is_none());
    }
}
