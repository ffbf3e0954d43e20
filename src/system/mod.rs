//! Pipeline orchestration: events, shared state and the acquisition loop.
//!
//! This module contains the `EventDispatcher` that owns the pipeline state
//! and routes localizer events to handlers, the localizer interface, the
//! messages exchanged with its worker thread, and the top-level
//! `ReconstructionSystem`.

pub mod events;
pub mod localization;
pub mod messages;
mod pipeline;
pub mod shared_state;

pub use events::{
    DispatchReport, EventDispatcher, EventKind, FrameHandler, HandlerFault, KeyFrameHandler,
    LoopClosureHandler,
};
pub use localization::{Localizer, TrajectorySource};
pub use messages::WorkerMsg;
pub use pipeline::{ReconstructionSystem, SessionSummary};
pub use shared_state::{PipelineState, PipelineStats};
