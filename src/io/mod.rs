//! File outputs: mesh export and KeyFrame recording.

pub mod keyframe_recorder;
pub mod ply;

pub use keyframe_recorder::{
    load_pose_table, KeyFrameRecorder, KeyFrameSaveHandler, RecorderConfig, POSE_TABLE,
};
pub use ply::write_ply;
