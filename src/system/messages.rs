//! Inter-thread message types.
//!
//! Sent from the acquisition thread to the localizer's worker thread, which
//! raises KeyFrameAvailable and LoopClosureDetected on its side.

use crossbeam_channel::Sender;

use crate::sensor::{Frame, KeyFrameRef};

/// Work item for the localizer worker.
pub enum WorkerMsg {
    /// A frame was promoted; map it and announce the KeyFrame.
    NewKeyFrame {
        frame: Box<Frame>,
        keyframe: KeyFrameRef,
    },

    /// Re-optimize the trajectory and announce the loop closure.
    LoopClosure,

    /// Reply on the sender once everything queued before has been handled.
    Flush(Sender<()>),

    /// Exit the worker loop.
    Shutdown,
}
