//! VidFeed Render Engine
//!
//! Turns editing decisions into a finished media resource by driving the
//! capture pipeline through one or more real-time passes.
//!
//! # Job Architecture
//!
//! ```text
//! EditorSession ──► RenderRequest ──► RenderOrchestrator
//!  (trim window,     (mode, input,          │
//!   clip order,       filter)               ├── open first source ─► size surface
//!   filter)                                 ├── RenderResources (encoder + mix bus)
//!                                           │
//!                                           ├── pass 1 ─┐
//!                                           ├── pass 2 ─┼─► one continuous stream
//!                                           └── pass N ─┘
//!                                                   │
//!                               watch<RenderSnapshot> + ProgressCallback
//!                                                   │
//!                                                   ▼
//!                                             RenderOutput
//! ```

pub mod orchestrator;
pub mod session;

pub use orchestrator::{ProgressCallback, RenderInput, RenderOrchestrator, RenderRequest};
pub use session::EditorSession;
