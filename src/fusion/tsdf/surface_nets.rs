//! Surface nets mesh extraction over a sparse TSDF grid.
//!
//! Every cell (the cube spanned by 8 neighbouring grid points) whose corners
//! are all observed and straddle the zero level gets one vertex at the mean
//! of its edge crossings. Every grid edge with a sign change emits a quad
//! joining the 4 cells that share it.

use std::collections::HashMap;

use nalgebra::Vector3;

use crate::fusion::volume::TriangleMesh;

use super::grid::{TsdfGrid, VoxelIndex};

const CORNERS: [[i32; 3]; 8] = [
    [0, 0, 0],
    [1, 0, 0],
    [0, 1, 0],
    [1, 1, 0],
    [0, 0, 1],
    [1, 0, 1],
    [0, 1, 1],
    [1, 1, 1],
];

const CELL_EDGES: [(usize, usize); 12] = [
    (0, 1),
    (2, 3),
    (4, 5),
    (6, 7),
    (0, 2),
    (1, 3),
    (4, 6),
    (5, 7),
    (0, 4),
    (1, 5),
    (2, 6),
    (3, 7),
];

#[inline]
fn offset(index: VoxelIndex, delta: [i32; 3]) -> VoxelIndex {
    [index[0] + delta[0], index[1] + delta[1], index[2] + delta[2]]
}

/// Vertex position and color for the cell whose minimum corner is `cell`.
fn cell_vertex(grid: &TsdfGrid, cell: VoxelIndex) -> Option<(Vector3<f64>, Vector3<f64>)> {
    let mut values = [0.0f32; 8];
    let mut colors = [[0.0f32; 3]; 8];
    for (i, corner) in CORNERS.iter().enumerate() {
        let voxel = grid.observed(offset(cell, *corner))?;
        values[i] = voxel.tsdf;
        colors[i] = voxel.color;
    }

    let mut position = Vector3::<f64>::zeros();
    let mut color = Vector3::<f64>::zeros();
    let mut crossings = 0usize;
    for &(a, b) in CELL_EDGES.iter() {
        let (va, vb) = (values[a], values[b]);
        if (va < 0.0) == (vb < 0.0) {
            continue;
        }
        let t = (va / (va - vb)) as f64;
        let pa = grid.voxel_position(offset(cell, CORNERS[a]));
        let pb = grid.voxel_position(offset(cell, CORNERS[b]));
        position += pa + (pb - pa) * t;

        let ca = Vector3::new(colors[a][0], colors[a][1], colors[a][2]).cast::<f64>();
        let cb = Vector3::new(colors[b][0], colors[b][1], colors[b][2]).cast::<f64>();
        color += ca + (cb - ca) * t;
        crossings += 1;
    }

    if crossings == 0 {
        return None;
    }
    let n = crossings as f64;
    Some((position / n, color / n))
}

/// Extract a triangle mesh in the grid's local frame.
pub fn extract_mesh(grid: &TsdfGrid) -> TriangleMesh {
    let mut mesh = TriangleMesh::default();
    let mut cell_ids: HashMap<VoxelIndex, u32> = HashMap::new();

    for (index, _) in grid.observed_voxels() {
        if let Some((position, color)) = cell_vertex(grid, index) {
            cell_ids.insert(index, mesh.vertices.len() as u32);
            mesh.vertices.push(position);
            mesh.colors.push(color);
        }
    }

    for (index, voxel) in grid.observed_voxels() {
        let inside = voxel.tsdf < 0.0;
        for axis in 0..3 {
            let mut step = [0; 3];
            step[axis] = 1;
            let Some(next) = grid.observed(offset(index, step)) else {
                continue;
            };
            if inside == (next.tsdf < 0.0) {
                continue;
            }

            let b = (axis + 1) % 3;
            let c = (axis + 2) % 3;
            let mut eb = [0; 3];
            let mut ec = [0; 3];
            eb[b] = -1;
            ec[c] = -1;

            let cells = [
                offset(offset(index, eb), ec),
                offset(index, ec),
                index,
                offset(index, eb),
            ];
            let mut quad = [0u32; 4];
            let mut complete = true;
            for (slot, cell) in quad.iter_mut().zip(cells.iter()) {
                match cell_ids.get(cell) {
                    Some(&id) => *slot = id,
                    None => {
                        complete = false;
                        break;
                    }
                }
            }
            if !complete {
                continue;
            }

            if inside {
                mesh.triangles.push([quad[0], quad[1], quad[2]]);
                mesh.triangles.push([quad[0], quad[2], quad[3]]);
            } else {
                mesh.triangles.push([quad[0], quad[2], quad[1]]);
                mesh.triangles.push([quad[0], quad[3], quad[2]]);
            }
        }
    }

    mesh
}
