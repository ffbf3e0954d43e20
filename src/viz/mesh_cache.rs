//! Mesh extraction cache.
//!
//! Reconciles the volume's segment list with what the visualization
//! consumer currently holds. Segments are append-only and only the active
//! one receives new data, so when the segment count has not changed only
//! the last mesh needs new geometry; every transform is still refreshed
//! because loop closures may have moved any segment. When the count
//! changed, everything is pushed again.
//!
//! A segment that stopped being active can still change shape when a
//! correction moves it relative to its neighbours. Its geometry is frozen
//! on the incremental path; enabling
//! `refresh_geometry_after_correction` forces one full push after every
//! correction instead.

use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::error::Result;
use crate::fusion::throttle::{GateSnapshot, ThrottleConfig};
use crate::fusion::volume::{MeshEntry, TriangleMesh};
use crate::geometry::SE3;
use crate::sensor::Frame;
use crate::system::events::FrameHandler;
use crate::system::shared_state::PipelineState;

use super::consumer::VisualizationConsumer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct MeshCacheConfig {
    /// Push all geometry on the first refresh after a loop-closure
    /// correction, even if the segment count is unchanged.
    pub refresh_geometry_after_correction: bool,
}

/// How a refresh reached the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPath {
    /// No segments yet; the consumer was not touched.
    Skipped,
    /// Last mesh replaced and all transforms refreshed.
    Incremental,
    /// Every mesh and transform replaced.
    Full,
}

/// What the consumer was last given.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeshCache {
    tracked_segments: usize,
    synced_epoch: u64,
}

impl MeshCache {
    /// Number of meshes the consumer holds.
    pub fn tracked_segments(&self) -> usize {
        self.tracked_segments
    }

    /// Path a refresh of `count` segments would take.
    pub fn choose_path(&self, count: usize, correction_epoch: u64, config: &MeshCacheConfig) -> RefreshPath {
        if count == 0 {
            return RefreshPath::Skipped;
        }
        let stale = config.refresh_geometry_after_correction && correction_epoch != self.synced_epoch;
        if count == self.tracked_segments && !stale {
            RefreshPath::Incremental
        } else {
            RefreshPath::Full
        }
    }

    /// Push `entries` to `consumer` along the cheapest valid path.
    pub fn refresh(
        &mut self,
        entries: &[MeshEntry],
        correction_epoch: u64,
        config: &MeshCacheConfig,
        consumer: &dyn VisualizationConsumer,
    ) -> RefreshPath {
        let path = self.choose_path(entries.len(), correction_epoch, config);
        let transforms: Vec<SE3> = entries.iter().map(|e| e.transform).collect();

        match path {
            RefreshPath::Skipped => {}
            RefreshPath::Incremental => {
                if let Some(active) = entries.last() {
                    consumer.replace_active_mesh(Arc::clone(&active.mesh), &active.transform);
                }
                consumer.replace_all_transforms(&transforms);
            }
            RefreshPath::Full => {
                let meshes: Vec<Arc<TriangleMesh>> =
                    entries.iter().map(|e| Arc::clone(&e.mesh)).collect();
                consumer.replace_all_meshes(&meshes, &transforms);
                self.tracked_segments = entries.len();
                self.synced_epoch = correction_epoch;
            }
        }
        path
    }
}

/// Pull the segment meshes out of the volume and reconcile them.
pub fn refresh_visualization(
    state: &mut PipelineState,
    config: &MeshCacheConfig,
    consumer: &dyn VisualizationConsumer,
) -> RefreshPath {
    let entries = state.volume.list_segment_meshes();
    let epoch = state.correction_epoch();
    let path = state.mesh_cache.refresh(&entries, epoch, config, consumer);
    match path {
        RefreshPath::Incremental => state.stats.incremental_refreshes += 1,
        RefreshPath::Full => state.stats.full_refreshes += 1,
        RefreshPath::Skipped => {}
    }
    debug!("Mesh refresh over {} segments: {:?}", entries.len(), path);
    path
}

/// FrameAvailable handler refreshing the viewer on the extraction schedule.
pub struct MeshExtractionHandler {
    consumer: Arc<dyn VisualizationConsumer>,
    throttle: ThrottleConfig,
    config: MeshCacheConfig,
}

impl MeshExtractionHandler {
    pub fn new(
        consumer: Arc<dyn VisualizationConsumer>,
        throttle: ThrottleConfig,
        config: MeshCacheConfig,
    ) -> Self {
        Self {
            consumer,
            throttle,
            config,
        }
    }
}

impl FrameHandler for MeshExtractionHandler {
    fn on_frame(&mut self, state: &mut PipelineState, gate: GateSnapshot, _frame: &Frame) -> Result<()> {
        if !gate.extract(&self.throttle) {
            return Ok(());
        }
        refresh_visualization(state, &self.config, self.consumer.as_ref());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::KeyFrameId;
    use crate::viz::consumer::{RecordingConsumer, ViewerUpdate};
    use nalgebra::Vector3;

    fn entries(n: usize) -> Vec<MeshEntry> {
        (0..n)
            .map(|i| MeshEntry {
                keyframe_id: KeyFrameId(i as u64),
                mesh: Arc::new(TriangleMesh::default()),
                transform: SE3::from_translation(Vector3::new(i as f64, 0.0, 0.0)),
            })
            .collect()
    }

    #[test]
    fn test_count_sequence_paths() {
        let mut cache = MeshCache::default();
        let consumer = RecordingConsumer::new();
        let config = MeshCacheConfig::default();

        let paths: Vec<RefreshPath> = [1, 1, 2, 2, 3]
            .iter()
            .map(|&n| cache.refresh(&entries(n), 0, &config, &consumer))
            .collect();

        assert_eq!(
            paths,
            vec![
                RefreshPath::Full,
                RefreshPath::Incremental,
                RefreshPath::Full,
                RefreshPath::Incremental,
                RefreshPath::Full,
            ]
        );
        assert_eq!(consumer.meshes().len(), 3);
        assert_eq!(cache.tracked_segments(), 3);
    }

    #[test]
    fn test_incremental_refreshes_every_transform() {
        let mut cache = MeshCache::default();
        let consumer = RecordingConsumer::new();
        let config = MeshCacheConfig::default();
        cache.refresh(&entries(3), 0, &config, &consumer);

        let mut moved = entries(3);
        moved[0].transform = SE3::from_translation(Vector3::new(0.0, 5.0, 0.0));
        assert_eq!(
            cache.refresh(&moved, 1, &config, &consumer),
            RefreshPath::Incremental
        );

        assert_eq!(consumer.transforms()[0], moved[0].transform);
        assert_eq!(
            consumer.updates(),
            vec![
                ViewerUpdate::AllMeshes(3),
                ViewerUpdate::ActiveMesh,
                ViewerUpdate::Transforms(3)
            ]
        );
    }

    #[test]
    fn test_empty_volume_skipped() {
        let mut cache = MeshCache::default();
        let consumer = RecordingConsumer::new();
        let path = cache.refresh(&[], 0, &MeshCacheConfig::default(), &consumer);

        assert_eq!(path, RefreshPath::Skipped);
        assert!(consumer.updates().is_empty());
    }

    #[test]
    fn test_refresh_after_correction_forces_full() {
        let mut cache = MeshCache::default();
        let config = MeshCacheConfig {
            refresh_geometry_after_correction: true,
        };
        assert_eq!(cache.choose_path(2, 0, &config), RefreshPath::Full);

        let consumer = RecordingConsumer::new();
        cache.refresh(&entries(2), 0, &config, &consumer);
        assert_eq!(cache.choose_path(2, 0, &config), RefreshPath::Incremental);
        assert_eq!(cache.choose_path(2, 1, &config), RefreshPath::Full);

        cache.refresh(&entries(2), 1, &config, &consumer);
        assert_eq!(cache.choose_path(2, 1, &config), RefreshPath::Incremental);

        // Frozen geometry unless asked otherwise.
        assert_eq!(
            cache.choose_path(2, 7, &MeshCacheConfig::default()),
            RefreshPath::Incremental
        );
    }
}
