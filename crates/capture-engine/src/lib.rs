//! VidFeed Capture Engine
//!
//! Real-time re-encoding passes. A render job owns one surface, one mix bus,
//! and one encoder; each pass plays a source at 1x speed, composites every
//! decoded frame through the active filter onto the surface, and feeds the
//! surface and the mixed audio into the encoder.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                    run_pass                      │
//! │  ┌─────────────┐   frames   ┌─────────────────┐  │
//! │  │ MediaSource ├───────────►│ Surface + Filter│  │
//! │  └──────┬──────┘            └────────┬────────┘  │
//! │         │ audio                      │ video     │
//! │         ▼                            ▼           │
//! │  ┌─────────────┐  samples   ┌─────────────────┐  │
//! │  │   MixBus    ├───────────►│  StreamEncoder  │  │
//! │  └─────────────┘            └────────┬────────┘  │
//! │                                      │ chunks    │
//! │                             ┌────────▼────────┐  │
//! │                             │OutputAccumulator│  │
//! │                             └─────────────────┘  │
//! └──────────────────────────────────────────────────┘
//! ```

pub mod avi;
pub mod backend;
pub mod encoder;
pub mod mix_bus;
pub mod pipeline;
pub mod source;
pub mod surface;

pub use backend::{default_backend, MediaBackend, SyntheticBackend};
pub use encoder::{EncoderSettings, OutputAccumulator, StreamEncoder};
pub use mix_bus::{AudioGraphRegistry, MixBus, MixBusSettings};
pub use pipeline::{run_pass, PassContext, PassReport, PassTimeline, PassWindow};
pub use source::{AudioChunk, MediaSource, SourceEvent, SourceInfo, VideoFrame};
pub use surface::Surface;
