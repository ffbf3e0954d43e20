//! Synthetic RGB-D camera.
//!
//! Renders the scene from a ground-truth camera path by casting one ray per
//! pixel, and produces at-rest inertial samples at a fixed rate.

use nalgebra::Vector3;

use crate::error::{ReconError, Result};
use crate::imu::ImuSample;
use crate::sensor::{
    Camera, CameraFrame, ChannelOrder, ColorBuffer, DepthBuffer, FrameId, SENSOR_HEIGHT, SENSOR_WIDTH,
};

use super::scene::{CameraPath, Scene};

/// `[fx, fy, cx, cy]` of the synthetic sensor.
pub const SYNTHETIC_INTRINSICS: [f32; 4] = [525.0, 525.0, 319.5, 239.5];

pub struct SyntheticCamera {
    scene: Scene,
    path: CameraPath,
    frame_period_ns: u64,
    imu_period_ns: u64,
    next_index: u64,
    next_imu_ns: u64,
    started: bool,
}

impl SyntheticCamera {
    pub fn new(scene: Scene, path: CameraPath, frame_period_ns: u64, imu_rate_hz: f64) -> Self {
        let imu_period_ns = if imu_rate_hz > 0.0 {
            (1e9 / imu_rate_hz) as u64
        } else {
            0
        };
        Self {
            scene,
            path,
            frame_period_ns,
            imu_period_ns,
            next_index: 0,
            next_imu_ns: 0,
            started: false,
        }
    }

    pub fn path(&self) -> &CameraPath {
        &self.path
    }

    /// Render frame `index` without advancing the stream.
    pub fn render(&self, index: u64) -> CameraFrame {
        let pose = self.path.pose_at(index);
        let origin = pose.translation;
        let [fx, fy, cx, cy] = SYNTHETIC_INTRINSICS.map(|v| v as f64);

        let mut color = Vec::with_capacity(SENSOR_WIDTH * SENSOR_HEIGHT * 3);
        let mut depth = Vec::with_capacity(SENSOR_WIDTH * SENSOR_HEIGHT);
        for v in 0..SENSOR_HEIGHT {
            for u in 0..SENSOR_WIDTH {
                let ray_cam = Vector3::new((u as f64 - cx) / fx, (v as f64 - cy) / fy, 1.0);
                let dir = pose.transform_vector(&ray_cam);
                match self.scene.cast(&origin, &dir) {
                    Some(hit) => {
                        let mm = (hit.t * 1000.0).round();
                        depth.push(if mm < u16::MAX as f64 { mm as u16 } else { 0 });
                        // Stored BGR, as delivered by the driver.
                        color.extend_from_slice(&[hit.color[2], hit.color[1], hit.color[0]]);
                    }
                    None => {
                        depth.push(0);
                        color.extend_from_slice(&[0, 0, 0]);
                    }
                }
            }
        }

        CameraFrame {
            id: FrameId(index),
            timestamp_ns: index * self.frame_period_ns,
            color: ColorBuffer {
                width: SENSOR_WIDTH,
                height: SENSOR_HEIGHT,
                order: ChannelOrder::Bgr,
                data: color,
            },
            depth: DepthBuffer {
                width: SENSOR_WIDTH,
                height: SENSOR_HEIGHT,
                data: depth,
            },
        }
    }
}

impl Camera for SyntheticCamera {
    fn start(&mut self) -> Result<()> {
        self.started = true;
        Ok(())
    }

    fn grab(&mut self) -> Result<CameraFrame> {
        if !self.started {
            return Err(ReconError::InvalidConfig("camera not started".to_string()));
        }
        let frame = self.render(self.next_index);
        self.next_index += 1;
        Ok(frame)
    }

    fn inertial_samples_up_to(&mut self, timestamp_ns: u64) -> Vec<ImuSample> {
        if self.imu_period_ns == 0 {
            return Vec::new();
        }
        let mut samples = Vec::new();
        while self.next_imu_ns <= timestamp_ns {
            samples.push(ImuSample::at_rest(self.next_imu_ns));
            self.next_imu_ns += self.imu_period_ns;
        }
        samples
    }

    fn color_intrinsics(&self) -> [f32; 4] {
        SYNTHETIC_INTRINSICS
    }
}
