//! Pose-tagged frames handed to event handlers.

use crate::geometry::SE3;

use super::camera::CameraFrame;
use super::image::{ColorBuffer, DepthBuffer};
use super::types::{FrameId, KeyFrameId};

/// The KeyFrame a frame was promoted to, as reported by localization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyFrameRef {
    pub id: KeyFrameId,
    /// World-from-sensor pose at promotion time; may be corrected later.
    pub pose: SE3,
}

/// A localized frame.
///
/// Created once per acquisition tick and immutable afterwards; handlers only
/// borrow it for the duration of a dispatch.
#[derive(Debug, Clone)]
pub struct Frame {
    pub id: FrameId,
    pub timestamp_ns: u64,
    /// World-from-sensor pose `T_ws`.
    pub pose: SE3,
    pub color: ColorBuffer,
    pub depth: DepthBuffer,
    pub keyframe: Option<KeyFrameRef>,
}

impl Frame {
    /// Attach a localization pose to a raw capture.
    pub fn localized(capture: CameraFrame, pose: SE3) -> Self {
        Self {
            id: capture.id,
            timestamp_ns: capture.timestamp_ns,
            pose,
            color: capture.color,
            depth: capture.depth,
            keyframe: None,
        }
    }

    /// Mark this frame as promoted to a KeyFrame.
    pub fn with_keyframe(mut self, id: KeyFrameId) -> Self {
        self.keyframe = Some(KeyFrameRef {
            id,
            pose: self.pose,
        });
        self
    }

    /// Sensor-from-world extrinsic used for integration.
    pub fn sensor_from_world(&self) -> SE3 {
        self.pose.inverse()
    }
}
