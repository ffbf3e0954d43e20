//! Loop-closure correction of segment poses.
//!
//! Correction runs in three phases, mirroring how the localizer publishes
//! its trajectory:
//! 1. COLLECT: query the optimized KeyFrame trajectory (localizer lock only)
//! 2. SOLVE: validate it and build a [`TrajectoryCorrectionMap`]
//! 3. APPLY: move every matching segment (pipeline state lock, held by the
//!    dispatcher for the whole handler run)
//!
//! Applying the same map twice leaves the model unchanged.

use std::collections::btree_map::{BTreeMap, Entry};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{ReconError, Result};
use crate::geometry::SE3;
use crate::sensor::KeyFrameId;
use crate::system::events::LoopClosureHandler;
use crate::system::localization::TrajectorySource;
use crate::system::shared_state::PipelineState;

/// Corrected world-from-KeyFrame poses keyed by KeyFrame id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrajectoryCorrectionMap {
    poses: BTreeMap<KeyFrameId, SE3>,
}

impl TrajectoryCorrectionMap {
    /// Pair parallel id/pose sequences.
    ///
    /// Unequal lengths are rejected. If an id repeats, its first pose wins.
    pub fn from_trajectory(ids: &[KeyFrameId], poses: &[SE3]) -> Result<Self> {
        if ids.len() != poses.len() {
            return Err(ReconError::TrajectoryMismatch {
                ids: ids.len(),
                poses: poses.len(),
            });
        }

        let mut map = BTreeMap::new();
        for (id, pose) in ids.iter().zip(poses.iter()) {
            match map.entry(*id) {
                Entry::Vacant(slot) => {
                    slot.insert(*pose);
                }
                Entry::Occupied(_) => debug!("Duplicate {} in trajectory, keeping first pose", id),
            }
        }
        Ok(Self { poses: map })
    }

    pub fn get(&self, id: KeyFrameId) -> Option<&SE3> {
        self.poses.get(&id)
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&KeyFrameId, &SE3)> {
        self.poses.iter()
    }
}

/// Phases 1 and 2: query the localizer and build the correction map.
pub fn fetch_corrections(source: &dyn TrajectorySource) -> Result<TrajectoryCorrectionMap> {
    let (ids, poses) = source.query_mapped_trajectory();
    TrajectoryCorrectionMap::from_trajectory(&ids, &poses)
}

/// Phase 3: move segments and mark the visualization as stale.
///
/// Returns the number of segments updated.
pub fn apply_corrections(state: &mut PipelineState, corrections: &TrajectoryCorrectionMap) -> usize {
    let updated = state.volume.apply_corrections(corrections);
    state.mark_corrected();
    state.stats.corrections_applied += 1;
    debug!(
        "Applied {} corrected poses to {} segments",
        corrections.len(),
        updated
    );
    updated
}

/// Full correction pass: fetch, validate, apply.
///
/// A rejected trajectory leaves the model untouched; the next loop closure
/// retries from scratch.
pub fn correct_from_source(state: &mut PipelineState, source: &dyn TrajectorySource) -> Result<usize> {
    match fetch_corrections(source) {
        Ok(corrections) => Ok(apply_corrections(state, &corrections)),
        Err(e) => {
            state.stats.corrections_rejected += 1;
            warn!("Rejected trajectory correction: {}", e);
            Err(e)
        }
    }
}

/// LoopClosureDetected handler that re-anchors segments on the optimized
/// trajectory.
pub struct LoopClosureCorrector {
    source: Arc<dyn TrajectorySource>,
}

impl LoopClosureCorrector {
    pub fn new(source: Arc<dyn TrajectorySource>) -> Self {
        Self { source }
    }
}

impl LoopClosureHandler for LoopClosureCorrector {
    fn on_loop_closure(&mut self, state: &mut PipelineState) -> Result<()> {
        info!("loop closure detected");
        let updated = correct_from_source(state, self.source.as_ref())?;
        info!("Loop closure corrected {} segments", updated);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn test_map_from_trajectory() {
        let ids = [KeyFrameId(2), KeyFrameId(0)];
        let poses = [
            SE3::from_translation(Vector3::new(2.0, 0.0, 0.0)),
            SE3::identity(),
        ];
        let map = TrajectoryCorrectionMap::from_trajectory(&ids, &poses).unwrap();

        assert_eq!(map.len(), 2);
        assert_eq!(map.get(KeyFrameId(2)), Some(&poses[0]));
        assert_eq!(map.get(KeyFrameId(1)), None);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let result = TrajectoryCorrectionMap::from_trajectory(
            &[KeyFrameId(0), KeyFrameId(1)],
            &[SE3::identity()],
        );
        assert!(matches!(
            result,
            Err(ReconError::TrajectoryMismatch { ids: 2, poses: 1 })
        ));
    }

    #[test]
    fn test_duplicate_id_keeps_first() {
        let first = SE3::from_translation(Vector3::new(1.0, 0.0, 0.0));
        let map = TrajectoryCorrectionMap::from_trajectory(
            &[KeyFrameId(4), KeyFrameId(4)],
            &[first, SE3::identity()],
        )
        .unwrap();

        assert_eq!(map.len(), 1);
        assert_eq!(map.get(KeyFrameId(4)), Some(&first));
    }

    #[test]
    fn test_empty_trajectory() {
        let map = TrajectoryCorrectionMap::from_trajectory(&[], &[]).unwrap();
        assert!(map.is_empty());
    }
}
