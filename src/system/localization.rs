//! Interface to the upstream visual-inertial localizer.
//!
//! The localizer owns pose estimation, KeyFrame selection and loop closure.
//! Once attached to an [`EventDispatcher`] it raises FrameAvailable for each
//! localized frame on the caller's thread, and may raise KeyFrameAvailable
//! and LoopClosureDetected from its own worker thread.

use std::sync::Arc;

use crate::error::Result;
use crate::geometry::SE3;
use crate::imu::ImuSample;
use crate::sensor::{CameraFrame, KeyFrameId};

use super::events::EventDispatcher;

/// Read access to the optimized KeyFrame trajectory.
pub trait TrajectorySource: Send + Sync {
    /// Parallel sequences of KeyFrame ids and their world-from-sensor poses.
    ///
    /// Implementations must not raise events while answering; the caller
    /// may be holding the dispatcher lock.
    fn query_mapped_trajectory(&self) -> (Vec<KeyFrameId>, Vec<SE3>);
}

/// Upstream localization system.
pub trait Localizer {
    /// Route this localizer's events through `dispatcher` and start any
    /// worker threads.
    fn attach(&mut self, dispatcher: Arc<EventDispatcher>) -> Result<()>;

    /// Queue inertial samples up to the next frame's timestamp.
    fn push_inertial_samples(&mut self, samples: &[ImuSample]);

    /// Localize a capture and raise the resulting events.
    fn push_frame(&mut self, frame: CameraFrame) -> Result<()>;

    /// Handle for querying the trajectory from handlers.
    fn trajectory(&self) -> Arc<dyn TrajectorySource>;

    /// Block until every event raised so far has been dispatched.
    fn flush(&mut self) -> Result<()>;

    /// Stop worker threads. No events are raised afterwards.
    fn shutdown(&mut self) -> Result<()>;
}
