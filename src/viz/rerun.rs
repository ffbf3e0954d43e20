//! Rerun-based mesh viewer.
//!
//! Entity hierarchy:
//!     world/
//!         camera           - Current camera pose
//!         segments/{i}     - Segment mesh, posed by its own transform

use std::sync::Arc;

use parking_lot::Mutex;
use rerun::{external::glam, RecordingStream};

use crate::error::{ReconError, Result};
use crate::fusion::volume::TriangleMesh;
use crate::geometry::SE3;

use super::consumer::VisualizationConsumer;

pub struct RerunMeshViewer {
    rec: RecordingStream,
    /// Number of segment entities currently logged.
    logged_segments: Mutex<usize>,
}

impl RerunMeshViewer {
    /// Spawn a viewer process and stream to it.
    pub fn spawn(app_name: &str) -> Result<Self> {
        let rec = rerun::RecordingStreamBuilder::new(app_name)
            .spawn()
            .map_err(|e| ReconError::Viewer(e.to_string()))?;
        Ok(Self::with_stream(rec))
    }

    /// Write the recording to an `.rrd` file instead of a live viewer.
    pub fn save(app_name: &str, path: &std::path::Path) -> Result<Self> {
        let rec = rerun::RecordingStreamBuilder::new(app_name)
            .save(path)
            .map_err(|e| ReconError::Viewer(e.to_string()))?;
        Ok(Self::with_stream(rec))
    }

    fn with_stream(rec: RecordingStream) -> Self {
        // Camera convention: X right, Y down, Z forward.
        rec.log_static("world", &rerun::ViewCoordinates::RDF()).ok();
        Self {
            rec,
            logged_segments: Mutex::new(0),
        }
    }

    fn segment_path(index: usize) -> String {
        format!("world/segments/{}", index)
    }

    fn log_transform(&self, path: &str, pose: &SE3) {
        let translation = glam::Vec3::new(
            pose.translation.x as f32,
            pose.translation.y as f32,
            pose.translation.z as f32,
        );
        let rotation = glam::Quat::from_xyzw(
            pose.rotation.coords.x as f32,
            pose.rotation.coords.y as f32,
            pose.rotation.coords.z as f32,
            pose.rotation.w as f32,
        );
        self.rec
            .log(
                path,
                &rerun::Transform3D::from_translation_rotation(translation, rotation),
            )
            .ok();
    }

    fn log_mesh(&self, index: usize, mesh: &TriangleMesh) {
        let path = format!("{}/mesh", Self::segment_path(index));
        if mesh.is_empty() {
            self.rec.log(path.as_str(), &rerun::Clear::flat()).ok();
            return;
        }

        let positions: Vec<[f32; 3]> = mesh
            .vertices
            .iter()
            .map(|v| [v.x as f32, v.y as f32, v.z as f32])
            .collect();
        let colors: Vec<[u8; 3]> = mesh
            .colors
            .iter()
            .map(|c| {
                [
                    (c.x.clamp(0.0, 1.0) * 255.0) as u8,
                    (c.y.clamp(0.0, 1.0) * 255.0) as u8,
                    (c.z.clamp(0.0, 1.0) * 255.0) as u8,
                ]
            })
            .collect();

        self.rec
            .log(
                path.as_str(),
                &rerun::Mesh3D::new(positions)
                    .with_triangle_indices(mesh.triangles.iter().copied())
                    .with_vertex_colors(colors),
            )
            .ok();
    }
}

impl VisualizationConsumer for RerunMeshViewer {
    fn replace_active_mesh(&self, mesh: Arc<TriangleMesh>, transform: &SE3) {
        let mut logged = self.logged_segments.lock();
        let index = logged.saturating_sub(1);
        *logged = (*logged).max(1);
        self.log_mesh(index, &mesh);
        self.log_transform(&Self::segment_path(index), transform);
    }

    fn replace_all_transforms(&self, transforms: &[SE3]) {
        for (i, pose) in transforms.iter().enumerate() {
            self.log_transform(&Self::segment_path(i), pose);
        }
    }

    fn replace_all_meshes(&self, meshes: &[Arc<TriangleMesh>], transforms: &[SE3]) {
        let mut logged = self.logged_segments.lock();
        for (i, (mesh, pose)) in meshes.iter().zip(transforms.iter()).enumerate() {
            self.log_mesh(i, mesh);
            self.log_transform(&Self::segment_path(i), pose);
        }
        for stale in meshes.len()..*logged {
            self.rec
                .log(Self::segment_path(stale).as_str(), &rerun::Clear::recursive())
                .ok();
        }
        *logged = meshes.len();
    }

    fn set_view_transform(&self, view: &SE3) {
        self.log_transform("world/camera", &view.inverse());
    }

    /// The Rerun viewer does not report input back to the logging process.
    fn consume_click_event(&self) -> bool {
        false
    }
}
