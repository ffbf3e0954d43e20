//! Synthetic scenes and camera paths for scripted sessions.
//!
//! Camera convention: X right, Y down, Z forward. Poses are world-from-sensor.

use std::f64::consts::PI;

use nalgebra::{UnitQuaternion, Vector3};
use serde::Deserialize;

use crate::geometry::SE3;

/// Geometry the synthetic camera ray-casts against.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scene {
    /// Infinite plane `z = depth` facing the origin.
    Plane { depth: f64 },
    /// Axis-aligned room centred on the origin, seen from inside.
    Room { half_extents: [f64; 3] },
}

impl Default for Scene {
    fn default() -> Self {
        Scene::Room {
            half_extents: [3.0, 1.5, 3.0],
        }
    }
}

/// Surface hit by a ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    /// Ray parameter; equals camera-frame depth for rays with unit z.
    pub t: f64,
    pub color: [u8; 3],
}

const WALL_COLORS: [[u8; 3]; 6] = [
    [200, 80, 80],
    [80, 200, 80],
    [220, 220, 220],
    [90, 90, 90],
    [80, 80, 200],
    [200, 200, 80],
];

fn checker(p: &Vector3<f64>, base: [u8; 3]) -> [u8; 3] {
    let parity = (p.x.floor() + p.y.floor() + p.z.floor()) as i64;
    if parity.rem_euclid(2) == 0 {
        base
    } else {
        [base[0] / 2, base[1] / 2, base[2] / 2]
    }
}

impl Scene {
    /// First surface along `origin + t * dir`, `t > 0`.
    pub fn cast(&self, origin: &Vector3<f64>, dir: &Vector3<f64>) -> Option<Hit> {
        match *self {
            Scene::Plane { depth } => {
                if dir.z.abs() < 1e-12 {
                    return None;
                }
                let t = (depth - origin.z) / dir.z;
                if t <= 0.0 {
                    return None;
                }
                let p = origin + dir * t;
                Some(Hit {
                    t,
                    color: checker(&(p * 2.0), WALL_COLORS[4]),
                })
            }
            Scene::Room { half_extents } => {
                let mut best: Option<(f64, usize)> = None;
                for axis in 0..3 {
                    let d = dir[axis];
                    if d.abs() < 1e-12 {
                        continue;
                    }
                    let (bound, face) = if d > 0.0 {
                        (half_extents[axis], axis * 2)
                    } else {
                        (-half_extents[axis], axis * 2 + 1)
                    };
                    let t = (bound - origin[axis]) / d;
                    if t > 0.0 && best.map_or(true, |(bt, _)| t < bt) {
                        best = Some((t, face));
                    }
                }
                best.map(|(t, face)| {
                    let p = origin + dir * t;
                    Hit {
                        t,
                        color: checker(&(p * 2.0), WALL_COLORS[face]),
                    }
                })
            }
        }
    }
}

/// Ground-truth camera motion, indexed by frame.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CameraPath {
    /// Fixed pose at `position`, looking down +Z.
    Static { position: [f64; 3] },
    /// Slide by `step` per frame from `start`, looking down +Z.
    Linear { start: [f64; 3], step: [f64; 3] },
    /// Rotate about the vertical (Y) axis at `position`, one full turn every
    /// `frames_per_turn` frames.
    Pan { position: [f64; 3], frames_per_turn: u64 },
}

impl Default for CameraPath {
    fn default() -> Self {
        CameraPath::Pan {
            position: [0.0, 0.0, 0.0],
            frames_per_turn: 240,
        }
    }
}

impl CameraPath {
    pub fn pose_at(&self, index: u64) -> SE3 {
        match *self {
            CameraPath::Static { position } => SE3::from_translation(Vector3::from(position)),
            CameraPath::Linear { start, step } => {
                SE3::from_translation(Vector3::from(start) + Vector3::from(step) * index as f64)
            }
            CameraPath::Pan {
                position,
                frames_per_turn,
            } => {
                let turns = index as f64 / frames_per_turn.max(1) as f64;
                let rotation = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 2.0 * PI * turns);
                SE3 {
                    rotation,
                    translation: Vector3::from(position),
                }
            }
        }
    }
}
