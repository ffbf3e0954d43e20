//! KeyFrame-anchored TSDF segments.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{ReconError, Result};
use crate::fusion::volume::{IntegrateStatus, MeshEntry, TriangleMesh, VolumetricEngine};
use crate::geometry::SE3;
use crate::loop_closing::TrajectoryCorrectionMap;
use crate::sensor::{KeyFrameId, PinholeIntrinsics, RgbdImage};

use super::grid::TsdfGrid;
use super::surface_nets::extract_mesh;
use super::VolumeConfig;

/// One sub-volume anchored at a KeyFrame.
#[derive(Debug, Clone)]
pub struct Segment {
    pub keyframe_id: KeyFrameId,
    /// World-from-segment transform; replaced by loop-closure corrections.
    pub pose: SE3,
    pub grid: TsdfGrid,
    cached_mesh: Option<Arc<TriangleMesh>>,
}

impl Segment {
    fn new(keyframe_id: KeyFrameId, pose: SE3, config: &VolumeConfig) -> Self {
        Self {
            keyframe_id,
            pose,
            grid: TsdfGrid::new(config),
            cached_mesh: None,
        }
    }

    /// Segment-frame mesh, extracted lazily and cached until the next
    /// integration into this segment.
    pub fn mesh(&mut self) -> Arc<TriangleMesh> {
        if let Some(mesh) = &self.cached_mesh {
            return Arc::clone(mesh);
        }
        let mesh = Arc::new(extract_mesh(&self.grid));
        self.cached_mesh = Some(Arc::clone(&mesh));
        mesh
    }
}

/// Append-only list of TSDF segments with one active segment.
#[derive(Debug, Clone)]
pub struct SegmentedTsdfVolume {
    config: VolumeConfig,
    segments: Vec<Segment>,
    active: Option<usize>,
}

impl SegmentedTsdfVolume {
    pub fn new(config: VolumeConfig) -> Self {
        Self {
            config,
            segments: Vec::new(),
            active: None,
        }
    }

    pub fn config(&self) -> &VolumeConfig {
        &self.config
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active
    }
}

impl VolumetricEngine for SegmentedTsdfVolume {
    fn integrate(
        &mut self,
        image: &RgbdImage,
        intrinsics: &PinholeIntrinsics,
        sensor_from_world: &SE3,
    ) -> Result<IntegrateStatus> {
        if image.width != intrinsics.width || image.height != intrinsics.height {
            return Err(ReconError::ResolutionMismatch {
                expected_width: intrinsics.width,
                expected_height: intrinsics.height,
                width: image.width,
                height: image.height,
            });
        }
        let Some(index) = self.active else {
            return Ok(IntegrateStatus::NoActiveSegment);
        };

        let segment = &mut self.segments[index];
        let camera_from_segment = sensor_from_world.compose(&segment.pose);
        let updates = segment.grid.integrate(image, intrinsics, &camera_from_segment);
        segment.cached_mesh = None;

        debug!(
            "Fused {} voxel updates into segment {} ({})",
            updates, index, segment.keyframe_id
        );
        Ok(IntegrateStatus::Fused { segment: index })
    }

    fn set_active_keyframe(&mut self, pose: &SE3, keyframe_id: KeyFrameId) {
        if let Some(index) = self
            .segments
            .iter()
            .position(|s| s.keyframe_id == keyframe_id)
        {
            // Only the newest segment may receive data; older ones are frozen.
            let last = self.segments.len() - 1;
            if index != last {
                warn!(
                    "Segment {} for {} is frozen, keeping segment {} active",
                    index, keyframe_id, last
                );
            }
            self.active = Some(last);
            return;
        }

        self.segments
            .push(Segment::new(keyframe_id, *pose, &self.config));
        self.active = Some(self.segments.len() - 1);
        debug!(
            "New segment {} anchored at {}",
            self.segments.len() - 1,
            keyframe_id
        );
    }

    fn apply_corrections(&mut self, corrections: &TrajectoryCorrectionMap) -> usize {
        let mut updated = 0;
        for segment in &mut self.segments {
            if let Some(pose) = corrections.get(segment.keyframe_id) {
                segment.pose = *pose;
                updated += 1;
            }
        }
        updated
    }

    fn list_segment_meshes(&mut self) -> Vec<MeshEntry> {
        self.segments
            .iter_mut()
            .map(|segment| MeshEntry {
                keyframe_id: segment.keyframe_id,
                mesh: segment.mesh(),
                transform: segment.pose,
            })
            .collect()
    }

    fn extract_full_mesh(&mut self) -> TriangleMesh {
        let mut full = TriangleMesh::default();
        for segment in &mut self.segments {
            let pose = segment.pose;
            full.append(&segment.mesh().transformed(&pose));
        }
        full
    }

    fn num_segments(&self) -> usize {
        self.segments.len()
    }

    fn active_keyframe(&self) -> Option<KeyFrameId> {
        self.active.map(|i| self.segments[i].keyframe_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    const W: usize = 64;
    const H: usize = 48;

    fn intrinsics() -> PinholeIntrinsics {
        PinholeIntrinsics {
            width: W,
            height: H,
            fx: 60.0,
            fy: 60.0,
            cx: 31.5,
            cy: 23.5,
        }
    }

    fn plane(depth: f32) -> RgbdImage {
        RgbdImage {
            width: W,
            height: H,
            color: vec![[90, 90, 90]; W * H],
            depth: vec![depth; W * H],
        }
    }

    #[test]
    fn test_integrate_without_segment_is_noop() {
        let mut volume = SegmentedTsdfVolume::new(VolumeConfig::default());
        let status = volume
            .integrate(&plane(1.0), &intrinsics(), &SE3::identity())
            .unwrap();

        assert_eq!(status, IntegrateStatus::NoActiveSegment);
        assert_eq!(volume.num_segments(), 0);
        assert!(volume.extract_full_mesh().is_empty());
    }

    #[test]
    fn test_resolution_mismatch_rejected() {
        let mut volume = SegmentedTsdfVolume::new(VolumeConfig::default());
        volume.set_active_keyframe(&SE3::identity(), KeyFrameId(0));
        let mut k = intrinsics();
        k.width = 32;

        assert!(matches!(
            volume.integrate(&plane(1.0), &k, &SE3::identity()),
            Err(ReconError::ResolutionMismatch { .. })
        ));
    }

    #[test]
    fn test_segments_append_and_repeat_last() {
        let mut volume = SegmentedTsdfVolume::new(VolumeConfig::default());
        let p0 = SE3::identity();
        let p1 = SE3::from_translation(Vector3::new(1.0, 0.0, 0.0));

        volume.set_active_keyframe(&p0, KeyFrameId(0));
        volume.set_active_keyframe(&p1, KeyFrameId(1));
        assert_eq!(volume.num_segments(), 2);
        assert_eq!(volume.active_keyframe(), Some(KeyFrameId(1)));

        // Repeating the newest id is a no-op and keeps the anchor.
        volume.set_active_keyframe(&p0, KeyFrameId(1));
        assert_eq!(volume.num_segments(), 2);
        assert_eq!(volume.active_index(), Some(1));
        assert_eq!(volume.segments()[1].pose, p1);
    }

    #[test]
    fn test_older_segment_stays_frozen() {
        let mut volume = SegmentedTsdfVolume::new(VolumeConfig::default());
        volume.set_active_keyframe(&SE3::identity(), KeyFrameId(0));
        volume.set_active_keyframe(&SE3::identity(), KeyFrameId(1));

        volume.set_active_keyframe(&SE3::identity(), KeyFrameId(0));
        assert_eq!(volume.num_segments(), 2);
        assert_eq!(volume.active_keyframe(), Some(KeyFrameId(1)));

        let status = volume
            .integrate(&plane(1.0), &intrinsics(), &SE3::identity())
            .unwrap();
        assert_eq!(status, IntegrateStatus::Fused { segment: 1 });
        assert_eq!(volume.segments()[0].grid.num_blocks(), 0);
    }

    #[test]
    fn test_integrate_targets_active_segment_only() {
        let mut volume = SegmentedTsdfVolume::new(VolumeConfig::default());
        volume.set_active_keyframe(&SE3::identity(), KeyFrameId(0));
        volume.set_active_keyframe(&SE3::identity(), KeyFrameId(1));

        let status = volume
            .integrate(&plane(1.0), &intrinsics(), &SE3::identity())
            .unwrap();

        assert_eq!(status, IntegrateStatus::Fused { segment: 1 });
        assert_eq!(volume.segments()[0].grid.num_blocks(), 0);
        assert!(volume.segments()[1].grid.num_blocks() > 0);
    }

    #[test]
    fn test_segment_frame_storage() {
        // Segment anchored 0.5 m ahead of the world origin, camera at origin.
        let anchor = SE3::from_translation(Vector3::new(0.0, 0.0, 0.5));
        let mut volume = SegmentedTsdfVolume::new(VolumeConfig::default());
        volume.set_active_keyframe(&anchor, KeyFrameId(3));
        volume
            .integrate(&plane(1.4), &intrinsics(), &SE3::identity())
            .unwrap();

        let entries = volume.list_segment_meshes();
        assert_eq!(entries.len(), 1);
        for v in &entries[0].mesh.vertices {
            assert!((v.z - 0.9).abs() < 0.01);
        }
        for v in &volume.extract_full_mesh().vertices {
            assert!((v.z - 1.4).abs() < 0.01);
        }
    }

    #[test]
    fn test_mesh_cache_invalidated_by_integrate() {
        let mut volume = SegmentedTsdfVolume::new(VolumeConfig::default());
        volume.set_active_keyframe(&SE3::identity(), KeyFrameId(0));

        let first = volume.list_segment_meshes()[0].mesh.clone();
        let again = volume.list_segment_meshes()[0].mesh.clone();
        assert!(Arc::ptr_eq(&first, &again));

        volume
            .integrate(&plane(1.0), &intrinsics(), &SE3::identity())
            .unwrap();
        let after = volume.list_segment_meshes()[0].mesh.clone();
        assert!(!Arc::ptr_eq(&first, &after));
        assert!(!after.is_empty());
    }

    #[test]
    fn test_apply_corrections_idempotent() {
        let mut volume = SegmentedTsdfVolume::new(VolumeConfig::default());
        volume.set_active_keyframe(&SE3::identity(), KeyFrameId(0));
        volume.set_active_keyframe(&SE3::identity(), KeyFrameId(1));

        let corrected = SE3::from_translation(Vector3::new(0.2, -0.1, 0.0));
        let map = TrajectoryCorrectionMap::from_trajectory(
            &[KeyFrameId(1), KeyFrameId(7)],
            &[corrected, SE3::identity()],
        )
        .unwrap();

        assert_eq!(volume.apply_corrections(&map), 1);
        let once: Vec<SE3> = volume.segments().iter().map(|s| s.pose).collect();
        assert_eq!(volume.apply_corrections(&map), 1);
        let twice: Vec<SE3> = volume.segments().iter().map(|s| s.pose).collect();

        assert_eq!(once, twice);
        assert_eq!(twice[0], SE3::identity());
        assert_relative_eq!(twice[1].translation, corrected.translation, epsilon = 1e-12);
    }
}
