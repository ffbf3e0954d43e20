//! Volumetric engine interface and the mesh types it produces.

use std::sync::Arc;

use nalgebra::Vector3;

use crate::error::Result;
use crate::geometry::SE3;
use crate::loop_closing::TrajectoryCorrectionMap;
use crate::sensor::{KeyFrameId, PinholeIntrinsics, RgbdImage};

/// Triangle mesh with per-vertex colors in [0, 1].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriangleMesh {
    pub vertices: Vec<Vector3<f64>>,
    pub colors: Vec<Vector3<f64>>,
    pub triangles: Vec<[u32; 3]>,
}

impl TriangleMesh {
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_triangles(&self) -> usize {
        self.triangles.len()
    }

    /// Copy of this mesh with every vertex mapped through `pose`.
    pub fn transformed(&self, pose: &SE3) -> Self {
        Self {
            vertices: self.vertices.iter().map(|v| pose.transform_point(v)).collect(),
            colors: self.colors.clone(),
            triangles: self.triangles.clone(),
        }
    }

    /// Append `other`, re-indexing its triangles.
    pub fn append(&mut self, other: &TriangleMesh) {
        let offset = self.vertices.len() as u32;
        self.vertices.extend_from_slice(&other.vertices);
        self.colors.extend_from_slice(&other.colors);
        self.triangles.extend(
            other
                .triangles
                .iter()
                .map(|t| [t[0] + offset, t[1] + offset, t[2] + offset]),
        );
    }
}

/// One segment's mesh (in the segment frame) paired with its current
/// world-from-segment transform.
#[derive(Debug, Clone)]
pub struct MeshEntry {
    pub keyframe_id: KeyFrameId,
    pub mesh: Arc<TriangleMesh>,
    pub transform: SE3,
}

/// Where an integrate call wrote its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrateStatus {
    /// Fused into the segment at this index.
    Fused { segment: usize },
    /// No KeyFrame has been announced yet, nothing to anchor the data to.
    NoActiveSegment,
}

/// Segmented volumetric model.
///
/// Segments are append-only and ordered by creation. Exactly one segment is
/// active once any KeyFrame has been announced, and only it receives fused
/// data. Implementations must be `Send` because the model lives inside the
/// pipeline state shared between the acquisition and localization threads.
pub trait VolumetricEngine: Send {
    /// Fuse one RGB-D observation into the active segment.
    ///
    /// `sensor_from_world` is the inverse of the frame pose.
    fn integrate(
        &mut self,
        image: &RgbdImage,
        intrinsics: &PinholeIntrinsics,
        sensor_from_world: &SE3,
    ) -> Result<IntegrateStatus>;

    /// Append a segment anchored at `pose` for a new `keyframe_id` and make
    /// it active. A known id leaves the newest segment active, so earlier
    /// segments never receive data again.
    fn set_active_keyframe(&mut self, pose: &SE3, keyframe_id: KeyFrameId);

    /// Move every segment whose KeyFrame appears in `corrections`.
    ///
    /// Returns the number of segments updated.
    fn apply_corrections(&mut self, corrections: &TrajectoryCorrectionMap) -> usize;

    /// Meshes and transforms of all segments in creation order.
    fn list_segment_meshes(&mut self) -> Vec<MeshEntry>;

    /// Single mesh of the whole model in world coordinates.
    fn extract_full_mesh(&mut self) -> TriangleMesh;

    /// Number of segments.
    fn num_segments(&self) -> usize;

    /// KeyFrame anchoring the active segment.
    fn active_keyframe(&self) -> Option<KeyFrameId>;
}
