//! Camera-follow view and the integration toggle.

use std::sync::Arc;

use tracing::info;

use crate::error::Result;
use crate::fusion::throttle::GateSnapshot;
use crate::sensor::Frame;
use crate::system::events::FrameHandler;
use crate::system::shared_state::PipelineState;

use super::consumer::VisualizationConsumer;

/// FrameAvailable handler that keeps the viewer on the camera and flips
/// fusion on a click.
///
/// Runs on every frame regardless of the gate.
pub struct ViewHandler {
    consumer: Arc<dyn VisualizationConsumer>,
}

impl ViewHandler {
    pub fn new(consumer: Arc<dyn VisualizationConsumer>) -> Self {
        Self { consumer }
    }
}

impl FrameHandler for ViewHandler {
    fn on_frame(&mut self, state: &mut PipelineState, _gate: GateSnapshot, frame: &Frame) -> Result<()> {
        self.consumer.set_view_transform(&frame.sensor_from_world());

        if self.consumer.consume_click_event() {
            if state.toggle_fusion() {
                info!("----INTEGRATION ENABLED----");
            } else {
                info!("----INTEGRATION DISABLED----");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    use crate::fusion::tsdf::{SegmentedTsdfVolume, VolumeConfig};
    use crate::geometry::SE3;
    use crate::sensor::{CameraFrame, ChannelOrder, ColorBuffer, DepthBuffer, FrameId};
    use crate::viz::consumer::RecordingConsumer;

    fn frame(pose: SE3) -> Frame {
        let capture = CameraFrame {
            id: FrameId(1),
            timestamp_ns: 0,
            color: ColorBuffer::filled(2, 2, ChannelOrder::Rgb, [0, 0, 0]),
            depth: DepthBuffer::filled(2, 2, 0),
        };
        Frame::localized(capture, pose)
    }

    #[test]
    fn test_view_follows_inverse_pose() {
        let consumer = Arc::new(RecordingConsumer::new());
        let mut handler = ViewHandler::new(consumer.clone());
        let mut state = PipelineState::new(
            Box::new(SegmentedTsdfVolume::new(VolumeConfig::default())),
            true,
        );
        let pose = SE3::from_translation(Vector3::new(1.0, 2.0, 3.0));

        handler
            .on_frame(&mut state, GateSnapshot { tick: 1, enabled: true }, &frame(pose))
            .unwrap();

        let view = consumer.view_transform().unwrap();
        assert_relative_eq!(view.translation, Vector3::new(-1.0, -2.0, -3.0), epsilon = 1e-12);
        assert!(state.fusion_enabled());
    }

    #[test]
    fn test_click_toggles_fusion() {
        let consumer = Arc::new(RecordingConsumer::new());
        let mut handler = ViewHandler::new(consumer.clone());
        let mut state = PipelineState::new(
            Box::new(SegmentedTsdfVolume::new(VolumeConfig::default())),
            true,
        );
        let gate = GateSnapshot { tick: 1, enabled: true };

        consumer.queue_click();
        handler.on_frame(&mut state, gate, &frame(SE3::identity())).unwrap();
        assert!(!state.fusion_enabled());
        // Latched value for the current tick is untouched.
        assert!(state.gate().enabled);

        consumer.queue_click();
        handler.on_frame(&mut state, gate, &frame(SE3::identity())).unwrap();
        assert!(state.fusion_enabled());
    }
}
