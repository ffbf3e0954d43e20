//! Volumetric fusion: gating, integration and the segmented TSDF model.

pub mod integrator;
pub mod throttle;
pub mod tsdf;
pub mod volume;

pub use integrator::{ActiveKeyFrameHandler, VolumeIntegrator};
pub use throttle::{should_extract, should_fuse, GateSnapshot, ThrottleConfig};
pub use tsdf::{SegmentedTsdfVolume, VolumeConfig};
pub use volume::{IntegrateStatus, MeshEntry, TriangleMesh, VolumetricEngine};
