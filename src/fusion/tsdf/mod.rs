//! Segmented TSDF volume.
//!
//! Each segment is a sparse TSDF grid anchored at a KeyFrame pose. Fused
//! data is stored in the segment frame, so correcting a KeyFrame pose moves
//! the whole segment rigidly without touching voxels.

pub mod grid;
pub mod segmented;
pub mod surface_nets;

use serde::Deserialize;

use crate::error::{ReconError, Result};
use crate::sensor::DepthConversion;

pub use grid::{TsdfGrid, Voxel};
pub use segmented::{Segment, SegmentedTsdfVolume};
pub use surface_nets::extract_mesh;

/// Volume and depth conversion parameters.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct VolumeConfig {
    /// Voxel edge length in metres.
    pub voxel_size: f64,
    /// Truncation distance in metres.
    pub sdf_trunc: f64,
    /// Voxels per block edge.
    pub block_resolution: u32,
    /// Upper bound on the per-voxel integration weight.
    pub max_weight: f32,
    /// Raw depth units per metre.
    pub depth_scale: f32,
    /// Depths beyond this (metres) are discarded.
    pub depth_trunc: f32,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            voxel_size: 0.03,
            sdf_trunc: 0.15,
            block_resolution: 8,
            max_weight: 100.0,
            depth_scale: 1000.0,
            depth_trunc: 5.0,
        }
    }
}

impl VolumeConfig {
    pub fn depth_conversion(&self) -> DepthConversion {
        DepthConversion {
            depth_scale: self.depth_scale,
            depth_trunc: self.depth_trunc,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.voxel_size > 0.0) {
            return Err(ReconError::InvalidConfig(format!(
                "volume.voxel_size must be positive, got {}",
                self.voxel_size
            )));
        }
        if self.sdf_trunc < self.voxel_size {
            return Err(ReconError::InvalidConfig(format!(
                "volume.sdf_trunc ({}) must be at least one voxel ({})",
                self.sdf_trunc, self.voxel_size
            )));
        }
        if self.block_resolution == 0 {
            return Err(ReconError::InvalidConfig(
                "volume.block_resolution must be non-zero".to_string(),
            ));
        }
        if !(self.max_weight >= 1.0) {
            return Err(ReconError::InvalidConfig(format!(
                "volume.max_weight must be at least 1, got {}",
                self.max_weight
            )));
        }
        if !(self.depth_scale > 0.0) || !(self.depth_trunc > 0.0) {
            return Err(ReconError::InvalidConfig(
                "volume.depth_scale and volume.depth_trunc must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = VolumeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.depth_conversion(), DepthConversion::default());
    }

    #[test]
    fn test_rejects_thin_truncation() {
        let config = VolumeConfig {
            sdf_trunc: 0.01,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
