//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use rust_recon3d::fusion::{SegmentedTsdfVolume, VolumeConfig};
use rust_recon3d::geometry::SE3;
use rust_recon3d::sensor::{
    CameraFrame, ChannelOrder, ColorBuffer, DepthBuffer, Frame, FrameId, KeyFrameId, KeyFrameRef,
};
use rust_recon3d::system::{EventDispatcher, PipelineState};

pub fn dispatcher() -> Arc<EventDispatcher> {
    Arc::new(EventDispatcher::new(PipelineState::new(
        Box::new(SegmentedTsdfVolume::new(VolumeConfig::default())),
        true,
    )))
}

/// Tiny frame for events that never touch pixels.
pub fn blank_frame(index: u64) -> Frame {
    let capture = CameraFrame {
        id: FrameId(index),
        timestamp_ns: index,
        color: ColorBuffer::filled(2, 2, ChannelOrder::Rgb, [0, 0, 0]),
        depth: DepthBuffer::filled(2, 2, 0),
    };
    Frame::localized(capture, SE3::identity())
}

pub fn keyframe(id: u64, pose: SE3) -> KeyFrameRef {
    KeyFrameRef {
        id: KeyFrameId(id),
        pose,
    }
}
