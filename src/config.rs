//! Pipeline configuration.
//!
//! Loaded from a TOML file; every section and field is optional and falls
//! back to the reference schedule (fuse every 3rd tick, extract on ticks
//! 1, 31, 61, ...) and a 3 cm voxel volume.
//!
//! ```toml
//! [throttle]
//! fuse_stride = 3
//! extract_stride = 30
//! extract_offset = 1
//!
//! [volume]
//! voxel_size = 0.03
//! sdf_trunc = 0.15
//!
//! [mesh_cache]
//! refresh_geometry_after_correction = false
//!
//! [recorder]
//! enabled = true
//! output_dir = "recording"
//!
//! [demo]
//! ticks = 300
//! loop_closure_frame = 240
//! scene = { kind = "room", half_extents = [3.0, 1.5, 3.0] }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use nalgebra::Vector3;
use serde::Deserialize;

use crate::error::{ReconError, Result};
use crate::fusion::throttle::ThrottleConfig;
use crate::fusion::tsdf::VolumeConfig;
use crate::io::RecorderConfig;
use crate::sim::{CameraPath, LocalizerScript, Scene};
use crate::viz::MeshCacheConfig;

/// Final mesh export.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub enabled: bool,
    pub mesh_path: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mesh_path: PathBuf::from("mesh.ply"),
        }
    }
}

/// Where the visualization goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewerKind {
    /// Keep meshes in memory only.
    #[default]
    Headless,
    /// Spawn a Rerun viewer.
    Rerun,
    /// Write a Rerun recording to `rrd_path`.
    RerunFile,
}

/// Scripted session driven by the binary.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Acquisition ticks before stopping.
    pub ticks: u64,
    pub scene: Scene,
    pub path: CameraPath,
    pub keyframe_interval: u64,
    pub loop_closure_frame: Option<u64>,
    /// Translation drift (metres per frame) injected before loop closure.
    pub drift_per_frame: [f64; 3],
    pub frame_period_ns: u64,
    pub imu_rate_hz: f64,
    pub viewer: ViewerKind,
    pub rrd_path: PathBuf,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            ticks: 300,
            scene: Scene::default(),
            path: CameraPath::default(),
            keyframe_interval: 10,
            loop_closure_frame: Some(240),
            drift_per_frame: [0.0005, 0.0, 0.0005],
            frame_period_ns: 33_333_333,
            imu_rate_hz: 200.0,
            viewer: ViewerKind::Headless,
            rrd_path: PathBuf::from("recon.rrd"),
        }
    }
}

impl DemoConfig {
    pub fn localizer_script(&self) -> LocalizerScript {
        LocalizerScript {
            keyframe_interval: self.keyframe_interval,
            loop_closure_frame: self.loop_closure_frame,
            drift_per_frame: Vector3::from(self.drift_per_frame),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct ReconConfig {
    pub throttle: ThrottleConfig,
    pub volume: VolumeConfig,
    pub mesh_cache: MeshCacheConfig,
    pub recorder: RecorderConfig,
    pub export: ExportConfig,
    pub demo: DemoConfig,
}

impl ReconConfig {
    /// Load and validate a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents).map_err(|source| ReconError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents).map_err(|source| ReconError::ConfigParse {
            path: PathBuf::from("<string>"),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.volume.validate()?;
        if self.demo.frame_period_ns == 0 {
            return Err(ReconError::InvalidConfig(
                "demo.frame_period_ns must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = ReconConfig::from_toml_str("").unwrap();
        assert_eq!(config, ReconConfig::default());
        assert_eq!(config.throttle.fuse_stride, 3);
        assert_eq!(config.throttle.extract_stride, 30);
        assert_eq!(config.throttle.extract_offset, 1);
        assert!(!config.mesh_cache.refresh_geometry_after_correction);
    }

    #[test]
    fn test_partial_sections() {
        let config = ReconConfig::from_toml_str(
            r#"
            [throttle]
            fuse_stride = 5

            [mesh_cache]
            refresh_geometry_after_correction = true

            [demo]
            ticks = 12
            viewer = "rerun_file"
            scene = { kind = "plane", depth = 2.0 }
            path = { kind = "static", position = [0.0, 0.0, 0.0] }
            "#,
        )
        .unwrap();

        assert_eq!(config.throttle.fuse_stride, 5);
        assert_eq!(config.throttle.extract_stride, 30);
        assert!(config.mesh_cache.refresh_geometry_after_correction);
        assert_eq!(config.demo.ticks, 12);
        assert_eq!(config.demo.viewer, ViewerKind::RerunFile);
        assert_eq!(config.demo.scene, Scene::Plane { depth: 2.0 });
        assert_eq!(config.volume, VolumeConfig::default());
    }

    #[test]
    fn test_invalid_volume_rejected() {
        let result = ReconConfig::from_toml_str("[volume]\nvoxel_size = -1.0\n");
        assert!(matches!(result, Err(ReconError::InvalidConfig(_))));
    }

    #[test]
    fn test_parse_error_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[throttle\n").unwrap();

        match ReconConfig::load(&path) {
            Err(ReconError::ConfigParse { path: p, .. }) => assert_eq!(p, path),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }
}
