//! KeyFrame recorder.
//!
//! Writes each recorded KeyFrame's color (8-bit RGB PNG) and depth (16-bit
//! PNG, raw sensor units) under `color/` and `depth/`, and keeps a
//! `poses.csv` table of world-from-sensor poses. After the final
//! loop-closure correction the table is rewritten with corrected poses, so
//! the dataset can be re-fused offline.
//!
//! Layout:
//!     <output_dir>/color/<keyframe id>.png
//!     <output_dir>/depth/<keyframe id>.png
//!     <output_dir>/poses.csv

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use csv::{ReaderBuilder, WriterBuilder};
use image::{ImageBuffer, Luma, Rgb};
use nalgebra::Vector3;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ReconError, Result};
use crate::fusion::throttle::{GateSnapshot, ThrottleConfig};
use crate::geometry::SE3;
use crate::loop_closing::TrajectoryCorrectionMap;
use crate::sensor::{to_volume_images, Frame, KeyFrameId, KeyFrameRef};
use crate::system::events::KeyFrameHandler;
use crate::system::shared_state::PipelineState;

pub const POSE_TABLE: &str = "poses.csv";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub enabled: bool,
    pub output_dir: PathBuf,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            output_dir: PathBuf::from("recording"),
        }
    }
}

/// One row of the pose table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct PoseRow {
    keyframe_id: u64,
    tx: f64,
    ty: f64,
    tz: f64,
    qw: f64,
    qx: f64,
    qy: f64,
    qz: f64,
}

impl PoseRow {
    fn new(id: KeyFrameId, pose: &SE3) -> Self {
        let q = pose.rotation.quaternion();
        Self {
            keyframe_id: id.0,
            tx: pose.translation.x,
            ty: pose.translation.y,
            tz: pose.translation.z,
            qw: q.w,
            qx: q.i,
            qy: q.j,
            qz: q.k,
        }
    }

    fn pose(&self) -> SE3 {
        SE3::from_quaternion(
            self.qw,
            self.qx,
            self.qy,
            self.qz,
            Vector3::new(self.tx, self.ty, self.tz),
        )
    }
}

struct RecorderInner {
    dir: PathBuf,
    poses: BTreeMap<KeyFrameId, SE3>,
}

/// Shared handle to a recording directory.
#[derive(Clone)]
pub struct KeyFrameRecorder {
    inner: Arc<Mutex<RecorderInner>>,
}

impl KeyFrameRecorder {
    /// Prepare `dir` (and its image subdirectories) for writing.
    pub fn create(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(dir.join("color"))?;
        fs::create_dir_all(dir.join("depth"))?;
        Ok(Self {
            inner: Arc::new(Mutex::new(RecorderInner {
                dir,
                poses: BTreeMap::new(),
            })),
        })
    }

    pub fn output_dir(&self) -> PathBuf {
        self.inner.lock().dir.clone()
    }

    /// Poses currently in the table, ordered by KeyFrame id.
    pub fn poses(&self) -> Vec<(KeyFrameId, SE3)> {
        self.inner
            .lock()
            .poses
            .iter()
            .map(|(id, pose)| (*id, *pose))
            .collect()
    }

    /// Write both images and add the KeyFrame's pose to the table.
    pub fn record(&self, frame: &Frame, keyframe: &KeyFrameRef) -> Result<()> {
        let (color, depth) = to_volume_images(&frame.color, &frame.depth)?;
        let (w, h) = (color.width as u32, color.height as u32);

        let rgb: Vec<u8> = color.pixels.iter().flatten().copied().collect();
        let expected = rgb.len();
        let color_png = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_raw(w, h, rgb).ok_or(
            ReconError::MalformedBuffer {
                expected: (w * h * 3) as usize,
                actual: expected,
            },
        )?;
        let depth_len = depth.pixels.len();
        let depth_png = ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(w, h, depth.pixels).ok_or(
            ReconError::MalformedBuffer {
                expected: (w * h) as usize,
                actual: depth_len,
            },
        )?;

        let mut inner = self.inner.lock();
        let name = format!("{:06}.png", keyframe.id.0);
        color_png.save(inner.dir.join("color").join(&name))?;
        depth_png.save(inner.dir.join("depth").join(&name))?;

        inner.poses.insert(keyframe.id, keyframe.pose);
        write_pose_table(&inner.dir.join(POSE_TABLE), &inner.poses)?;
        debug!("Recorded {} from frame {}", keyframe.id, frame.id);
        Ok(())
    }

    /// Replace recorded poses with corrected ones and rewrite the table.
    ///
    /// KeyFrames absent from `corrections` keep their recorded pose.
    /// Returns the number of poses replaced.
    pub fn update_transforms(&self, corrections: &TrajectoryCorrectionMap) -> Result<usize> {
        let mut inner = self.inner.lock();
        let mut updated = 0;
        for (id, pose) in inner.poses.iter_mut() {
            if let Some(corrected) = corrections.get(*id) {
                *pose = *corrected;
                updated += 1;
            }
        }
        if !inner.poses.is_empty() {
            write_pose_table(&inner.dir.join(POSE_TABLE), &inner.poses)?;
        }
        Ok(updated)
    }
}

fn write_pose_table(path: &Path, poses: &BTreeMap<KeyFrameId, SE3>) -> Result<()> {
    let mut wtr = WriterBuilder::new().has_headers(true).from_path(path)?;
    for (id, pose) in poses {
        wtr.serialize(PoseRow::new(*id, pose))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Read a pose table written by [`KeyFrameRecorder`].
pub fn load_pose_table(path: impl AsRef<Path>) -> Result<Vec<(KeyFrameId, SE3)>> {
    let mut rdr = ReaderBuilder::new().has_headers(true).from_path(path.as_ref())?;
    let mut entries = Vec::new();
    for row in rdr.deserialize() {
        let row: PoseRow = row?;
        entries.push((KeyFrameId(row.keyframe_id), row.pose()));
    }
    Ok(entries)
}

/// KeyFrameAvailable handler recording KeyFrames on the fusion schedule.
pub struct KeyFrameSaveHandler {
    recorder: KeyFrameRecorder,
    throttle: ThrottleConfig,
}

impl KeyFrameSaveHandler {
    pub fn new(recorder: KeyFrameRecorder, throttle: ThrottleConfig) -> Self {
        Self { recorder, throttle }
    }
}

impl KeyFrameHandler for KeyFrameSaveHandler {
    fn on_keyframe(
        &mut self,
        state: &mut PipelineState,
        gate: GateSnapshot,
        frame: &Frame,
        keyframe: &KeyFrameRef,
    ) -> Result<()> {
        if !gate.fuse(&self.throttle) {
            return Ok(());
        }
        self.recorder.record(frame, keyframe)?;
        state.stats.keyframes_recorded += 1;
        Ok(())
    }
}
