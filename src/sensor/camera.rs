//! Camera interface and pinhole intrinsics.

use crate::error::{ReconError, Result};
use crate::imu::ImuSample;

use super::image::{ColorBuffer, DepthBuffer};
use super::types::FrameId;

/// Pinhole intrinsics of the color stream (depth is registered to color).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinholeIntrinsics {
    pub width: usize,
    pub height: usize,
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl PinholeIntrinsics {
    /// Build from the driver's `[fx, fy, cx, cy]` array.
    pub fn from_color_intrinsics(intrinsics: [f32; 4], width: usize, height: usize) -> Result<Self> {
        let [fx, fy, cx, cy] = intrinsics;
        if !(fx > 0.0 && fy > 0.0) {
            return Err(ReconError::InvalidIntrinsics(format!(
                "focal lengths must be positive, got fx={} fy={}",
                fx, fy
            )));
        }
        Ok(Self {
            width,
            height,
            fx: fx as f64,
            fy: fy as f64,
            cx: cx as f64,
            cy: cy as f64,
        })
    }

    /// Project a camera-frame point to the nearest pixel.
    ///
    /// Returns `None` behind the camera or outside the image.
    #[inline]
    pub fn project_to_pixel(&self, x: f64, y: f64, z: f64) -> Option<(usize, usize)> {
        if z <= 0.0 {
            return None;
        }
        let u = (self.fx * x / z + self.cx).round();
        let v = (self.fy * y / z + self.cy).round();
        if u < 0.0 || v < 0.0 || u >= self.width as f64 || v >= self.height as f64 {
            return None;
        }
        Some((u as usize, v as usize))
    }

    /// Back-project pixel (u, v) at z-depth `z` into the camera frame.
    #[inline]
    pub fn back_project(&self, u: usize, v: usize, z: f64) -> [f64; 3] {
        [
            (u as f64 - self.cx) * z / self.fx,
            (v as f64 - self.cy) * z / self.fy,
            z,
        ]
    }
}

/// One synchronized color/depth capture, before localization assigns a pose.
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub id: FrameId,
    pub timestamp_ns: u64,
    pub color: ColorBuffer,
    pub depth: DepthBuffer,
}

/// Upstream RGB-D camera with an inertial unit.
pub trait Camera {
    /// Start streaming.
    fn start(&mut self) -> Result<()>;

    /// Block until the next synchronized color/depth frame is available.
    fn grab(&mut self) -> Result<CameraFrame>;

    /// Inertial samples up to and including `timestamp_ns` not yet returned.
    fn inertial_samples_up_to(&mut self, timestamp_ns: u64) -> Vec<ImuSample>;

    /// Color intrinsics as `[fx, fy, cx, cy]`.
    fn color_intrinsics(&self) -> [f32; 4];
}
