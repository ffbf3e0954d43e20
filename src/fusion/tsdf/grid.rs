//! Sparse block-hashed TSDF grid.
//!
//! Voxels live on grid points `index * voxel_size` and are stored in cubic
//! blocks of `block_resolution^3` allocated on demand around observed
//! surface points. Integration is projective: each voxel in an allocated
//! block is projected into the depth image and updated with
//! `sdf = depth(pixel) - z_cam`, truncated to `[-trunc, trunc]`.

use std::collections::{HashMap, HashSet};

use nalgebra::Vector3;

use crate::geometry::SE3;
use crate::sensor::{PinholeIntrinsics, RgbdImage};

use super::VolumeConfig;

/// Integer coordinates of a voxel block.
pub type BlockKey = [i32; 3];

/// Integer coordinates of a voxel (grid point).
pub type VoxelIndex = [i32; 3];

/// A single TSDF sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Voxel {
    /// Normalized signed distance in [-1, 1]; negative behind the surface.
    pub tsdf: f32,
    /// Accumulated integration weight; zero means never observed.
    pub weight: f32,
    /// Running average RGB in [0, 1].
    pub color: [f32; 3],
}

impl Default for Voxel {
    fn default() -> Self {
        Self {
            tsdf: 1.0,
            weight: 0.0,
            color: [0.0; 3],
        }
    }
}

impl Voxel {
    #[inline]
    pub fn is_observed(&self) -> bool {
        self.weight > 0.0
    }

    fn fuse(&mut self, tsdf: f32, color: [u8; 3], max_weight: f32) {
        let w = 1.0;
        let total = self.weight + w;
        self.tsdf = (self.tsdf * self.weight + tsdf * w) / total;
        for (c, &raw) in self.color.iter_mut().zip(color.iter()) {
            *c = (*c * self.weight + raw as f32 / 255.0 * w) / total;
        }
        self.weight = total.min(max_weight);
    }
}

#[derive(Debug, Clone)]
struct VoxelBlock {
    voxels: Vec<Voxel>,
}

impl VoxelBlock {
    fn new(resolution: i32) -> Self {
        Self {
            voxels: vec![Voxel::default(); (resolution * resolution * resolution) as usize],
        }
    }
}

/// Sparse TSDF volume expressed in its own local frame.
#[derive(Debug, Clone)]
pub struct TsdfGrid {
    voxel_size: f64,
    sdf_trunc: f64,
    block_resolution: i32,
    max_weight: f32,
    blocks: HashMap<BlockKey, VoxelBlock>,
    integrated_frames: usize,
}

impl TsdfGrid {
    pub fn new(config: &VolumeConfig) -> Self {
        Self {
            voxel_size: config.voxel_size,
            sdf_trunc: config.sdf_trunc,
            block_resolution: config.block_resolution as i32,
            max_weight: config.max_weight,
            blocks: HashMap::new(),
            integrated_frames: 0,
        }
    }

    pub fn voxel_size(&self) -> f64 {
        self.voxel_size
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn integrated_frames(&self) -> usize {
        self.integrated_frames
    }

    /// Local-frame position of a voxel.
    #[inline]
    pub fn voxel_position(&self, index: VoxelIndex) -> Vector3<f64> {
        Vector3::new(
            index[0] as f64 * self.voxel_size,
            index[1] as f64 * self.voxel_size,
            index[2] as f64 * self.voxel_size,
        )
    }

    /// Voxel at `index` if it has been observed at least once.
    #[inline]
    pub fn observed(&self, index: VoxelIndex) -> Option<&Voxel> {
        let res = self.block_resolution;
        let key = [
            index[0].div_euclid(res),
            index[1].div_euclid(res),
            index[2].div_euclid(res),
        ];
        let block = self.blocks.get(&key)?;
        let local = [
            index[0].rem_euclid(res),
            index[1].rem_euclid(res),
            index[2].rem_euclid(res),
        ];
        let voxel = &block.voxels[(local[0] + res * (local[1] + res * local[2])) as usize];
        voxel.is_observed().then_some(voxel)
    }

    /// All observed voxels with their indices, in no particular order.
    pub fn observed_voxels(&self) -> impl Iterator<Item = (VoxelIndex, &Voxel)> + '_ {
        let res = self.block_resolution;
        self.blocks.iter().flat_map(move |(key, block)| {
            block
                .voxels
                .iter()
                .enumerate()
                .filter(|(_, v)| v.is_observed())
                .map(move |(i, v)| {
                    let i = i as i32;
                    let local = [i % res, (i / res) % res, i / (res * res)];
                    (
                        [
                            key[0] * res + local[0],
                            key[1] * res + local[1],
                            key[2] * res + local[2],
                        ],
                        v,
                    )
                })
        })
    }

    /// Fuse one RGB-D image seen from `camera_from_grid`.
    ///
    /// Pixels with depth 0.0 carry no information and neither allocate nor
    /// update voxels. Returns the number of voxel updates.
    pub fn integrate(
        &mut self,
        image: &RgbdImage,
        intrinsics: &PinholeIntrinsics,
        camera_from_grid: &SE3,
    ) -> usize {
        let grid_from_camera = camera_from_grid.inverse();
        let touched = self.touched_blocks(image, intrinsics, &grid_from_camera);

        let res = self.block_resolution;
        let voxel_size = self.voxel_size;
        let trunc = self.sdf_trunc;
        let max_weight = self.max_weight;
        let mut updates = 0;

        for key in touched {
            let block = self
                .blocks
                .entry(key)
                .or_insert_with(|| VoxelBlock::new(res));

            for lz in 0..res {
                for ly in 0..res {
                    for lx in 0..res {
                        let p = Vector3::new(
                            (key[0] * res + lx) as f64 * voxel_size,
                            (key[1] * res + ly) as f64 * voxel_size,
                            (key[2] * res + lz) as f64 * voxel_size,
                        );
                        let pc = camera_from_grid.transform_point(&p);
                        let Some((u, v)) = intrinsics.project_to_pixel(pc.x, pc.y, pc.z) else {
                            continue;
                        };
                        if u >= image.width || v >= image.height {
                            continue;
                        }
                        let pixel = v * image.width + u;
                        let depth = image.depth[pixel] as f64;
                        if depth <= 0.0 {
                            continue;
                        }

                        let sdf = depth - pc.z;
                        if sdf < -trunc {
                            continue;
                        }
                        let tsdf = (sdf / trunc).min(1.0) as f32;

                        let idx = (lx + res * (ly + res * lz)) as usize;
                        block.voxels[idx].fuse(tsdf, image.color[pixel], max_weight);
                        updates += 1;
                    }
                }
            }
        }

        self.integrated_frames += 1;
        updates
    }

    /// Blocks within the truncation band of any observed surface point.
    fn touched_blocks(
        &self,
        image: &RgbdImage,
        intrinsics: &PinholeIntrinsics,
        grid_from_camera: &SE3,
    ) -> HashSet<BlockKey> {
        let block_size = self.voxel_size * self.block_resolution as f64;
        let max_step = (block_size * 0.5).min(self.sdf_trunc);
        let n_steps = ((2.0 * self.sdf_trunc) / max_step).ceil().max(1.0) as i32;
        let step = 2.0 * self.sdf_trunc / n_steps as f64;

        let mut touched = HashSet::new();
        for v in 0..image.height {
            for u in 0..image.width {
                let depth = image.depth[v * image.width + u] as f64;
                if depth <= 0.0 {
                    continue;
                }
                let [x, y, z] = intrinsics.back_project(u, v, depth);
                let point = Vector3::new(x, y, z);
                let dir = point.normalize();

                for s in 0..=n_steps {
                    let offset = -self.sdf_trunc + s as f64 * step;
                    let p = grid_from_camera.transform_point(&(point + dir * offset));
                    touched.insert([
                        (p.x / block_size).floor() as i32,
                        (p.y / block_size).floor() as i32,
                        (p.z / block_size).floor() as i32,
                    ]);
                }
            }
        }
        touched
    }
}
