use std::sync::Arc;

use vidfeed_common::error::VidfeedResult;

use crate::encoder::{EncoderSettings, StreamEncoder};
use crate::mix_bus::{AudioGraphRegistry, MixBus, MixBusSettings};
use crate::source::MediaSource;

/// Abstract interface over a media stack: decoding sources, encoders, and
/// audio graphs.
#[async_trait::async_trait]
pub trait MediaBackend: Send + Sync {
    /// Short identifier for logs.
    fn name(&self) -> &str;

    /// Open a source for playback. Unreachable or undecodable URIs fail with
    /// a source decode error.
    async fn open_source(&self, uri: &str) -> VidfeedResult<Box<dyn MediaSource>>;

    /// Resolve the duration of a source without playing it.
    async fn probe_duration(&self, uri: &str) -> VidfeedResult<f64>;

    /// Build a fresh encoder. Callers start it themselves.
    fn create_encoder(&self, settings: &EncoderSettings) -> VidfeedResult<Box<dyn StreamEncoder>>;

    /// Registry tracking the audio graphs created through this backend.
    fn audio_graphs(&self) -> &AudioGraphRegistry;

    /// Create the per-job mix bus.
    fn create_mix_bus(&self, settings: MixBusSettings) -> MixBus {
        MixBus::new(settings, self.audio_graphs())
    }
}

#[cfg(feature = "gst")]
pub mod gst;
pub mod synthetic;

#[cfg(feature = "gst")]
pub use self::gst::GstBackend;
pub use synthetic::SyntheticBackend;

/// Get the default backend for this build.
pub fn default_backend() -> Arc<dyn MediaBackend> {
    #[cfg(feature = "gst")]
    {
        Arc::new(GstBackend::new())
    }
    #[cfg(not(feature = "gst"))]
    {
        Arc::new(SyntheticBackend::new())
    }
}
