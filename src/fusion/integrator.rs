//! Volume integrator handlers.
//!
//! `VolumeIntegrator` fuses gated frames into the active segment and
//! `ActiveKeyFrameHandler` keeps the active segment in step with the
//! localizer's KeyFrames.

use tracing::debug;

use crate::error::Result;
use crate::fusion::throttle::{GateSnapshot, ThrottleConfig};
use crate::fusion::volume::IntegrateStatus;
use crate::sensor::{to_volume_images, DepthConversion, Frame, KeyFrameRef, PinholeIntrinsics, RgbdImage};
use crate::system::events::{FrameHandler, KeyFrameHandler};
use crate::system::shared_state::PipelineState;

/// FrameAvailable handler fusing every gated frame.
pub struct VolumeIntegrator {
    intrinsics: PinholeIntrinsics,
    throttle: ThrottleConfig,
    conversion: DepthConversion,
}

impl VolumeIntegrator {
    pub fn new(intrinsics: PinholeIntrinsics, throttle: ThrottleConfig, conversion: DepthConversion) -> Self {
        Self {
            intrinsics,
            throttle,
            conversion,
        }
    }

    /// Bridge the frame's buffers and fuse them, bypassing the gate.
    pub fn integrate_frame(&self, state: &mut PipelineState, frame: &Frame) -> Result<IntegrateStatus> {
        let (color, depth) = to_volume_images(&frame.color, &frame.depth)?;
        let rgbd = RgbdImage::from_color_and_depth(color, &depth, self.conversion)?;
        let status = state
            .volume
            .integrate(&rgbd, &self.intrinsics, &frame.sensor_from_world())?;

        match status {
            IntegrateStatus::Fused { .. } => state.stats.frames_fused += 1,
            IntegrateStatus::NoActiveSegment => {
                state.stats.frames_without_segment += 1;
                debug!("Frame {} arrived before any KeyFrame, not fused", frame.id);
            }
        }
        Ok(status)
    }
}

impl FrameHandler for VolumeIntegrator {
    fn on_frame(&mut self, state: &mut PipelineState, gate: GateSnapshot, frame: &Frame) -> Result<()> {
        if !gate.fuse(&self.throttle) {
            return Ok(());
        }
        debug!("Integrating frame number: {}", frame.id);
        self.integrate_frame(state, frame)?;
        Ok(())
    }
}

/// KeyFrameAvailable handler switching the active segment.
///
/// Not gated: segments must follow every KeyFrame even while fusion is
/// paused, otherwise later fusions would land in a stale segment.
#[derive(Debug, Default)]
pub struct ActiveKeyFrameHandler;

impl KeyFrameHandler for ActiveKeyFrameHandler {
    fn on_keyframe(
        &mut self,
        state: &mut PipelineState,
        _gate: GateSnapshot,
        _frame: &Frame,
        keyframe: &KeyFrameRef,
    ) -> Result<()> {
        state.volume.set_active_keyframe(&keyframe.pose, keyframe.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::tsdf::{SegmentedTsdfVolume, VolumeConfig};
    use crate::geometry::SE3;
    use crate::sensor::{
        CameraFrame, ChannelOrder, ColorBuffer, DepthBuffer, FrameId, KeyFrameId, SENSOR_HEIGHT,
        SENSOR_WIDTH,
    };

    fn intrinsics() -> PinholeIntrinsics {
        PinholeIntrinsics::from_color_intrinsics([525.0, 525.0, 319.5, 239.5], SENSOR_WIDTH, SENSOR_HEIGHT)
            .unwrap()
    }

    fn state() -> PipelineState {
        PipelineState::new(
            Box::new(SegmentedTsdfVolume::new(VolumeConfig::default())),
            true,
        )
    }

    fn frame(depth_mm: u16) -> Frame {
        let capture = CameraFrame {
            id: FrameId(9),
            timestamp_ns: 0,
            color: ColorBuffer::filled(SENSOR_WIDTH, SENSOR_HEIGHT, ChannelOrder::Bgr, [10, 20, 30]),
            depth: DepthBuffer::filled(SENSOR_WIDTH, SENSOR_HEIGHT, depth_mm),
        };
        Frame::localized(capture, SE3::identity())
    }

    fn integrator() -> VolumeIntegrator {
        VolumeIntegrator::new(intrinsics(), ThrottleConfig::default(), DepthConversion::default())
    }

    #[test]
    fn test_gate_closed_is_noop() {
        let mut state = state();
        ActiveKeyFrameHandler
            .on_keyframe(
                &mut state,
                GateSnapshot { tick: 1, enabled: true },
                &frame(0),
                &KeyFrameRef { id: KeyFrameId(0), pose: SE3::identity() },
            )
            .unwrap();

        let mut integrator = integrator();
        // Tick 2 is off-stride, tick 3 is on-stride but disabled.
        for gate in [
            GateSnapshot { tick: 2, enabled: true },
            GateSnapshot { tick: 3, enabled: false },
        ] {
            integrator.on_frame(&mut state, gate, &frame(2000)).unwrap();
        }
        assert_eq!(state.stats.frames_fused, 0);
        assert!(state.volume.extract_full_mesh().is_empty());

        integrator
            .on_frame(&mut state, GateSnapshot { tick: 3, enabled: true }, &frame(2000))
            .unwrap();
        assert_eq!(state.stats.frames_fused, 1);
    }

    #[test]
    fn test_before_first_keyframe() {
        let mut state = state();
        let status = integrator().integrate_frame(&mut state, &frame(2000)).unwrap();

        assert_eq!(status, IntegrateStatus::NoActiveSegment);
        assert_eq!(state.stats.frames_without_segment, 1);
        assert_eq!(state.volume.num_segments(), 0);
    }

    #[test]
    fn test_wrong_resolution_fails() {
        let mut state = state();
        let mut bad = frame(2000);
        bad.depth = DepthBuffer::filled(320, 240, 2000);

        assert!(integrator()
            .on_frame(&mut state, GateSnapshot { tick: 3, enabled: true }, &bad)
            .is_err());
    }

    #[test]
    fn test_keyframe_handler_ignores_gate() {
        let mut state = state();
        ActiveKeyFrameHandler
            .on_keyframe(
                &mut state,
                GateSnapshot { tick: 1, enabled: false },
                &frame(0),
                &KeyFrameRef { id: KeyFrameId(4), pose: SE3::identity() },
            )
            .unwrap();
        assert_eq!(state.volume.active_keyframe(), Some(KeyFrameId(4)));
    }
}
