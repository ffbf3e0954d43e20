//! Visualization consumer interface.
//!
//! The consumer holds one mesh per segment plus a transform per mesh, and a
//! view transform for the camera. It is driven from pipeline handlers, so
//! all methods take `&self` and implementations synchronize internally.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::fusion::volume::TriangleMesh;
use crate::geometry::SE3;

pub trait VisualizationConsumer: Send + Sync {
    /// Replace the geometry of the last (active) mesh.
    fn replace_active_mesh(&self, mesh: Arc<TriangleMesh>, transform: &SE3);

    /// Replace the transform of every held mesh, in segment order.
    fn replace_all_transforms(&self, transforms: &[SE3]);

    /// Drop everything held and take these meshes instead.
    fn replace_all_meshes(&self, meshes: &[Arc<TriangleMesh>], transforms: &[SE3]);

    /// Camera view transform (sensor-from-world).
    fn set_view_transform(&self, view: &SE3);

    /// Returns true once per user click since the last call.
    fn consume_click_event(&self) -> bool;
}

/// What a consumer was asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerUpdate {
    ActiveMesh,
    Transforms(usize),
    AllMeshes(usize),
}

#[derive(Default)]
struct RecordingInner {
    meshes: Vec<Arc<TriangleMesh>>,
    transforms: Vec<SE3>,
    view: Option<SE3>,
    pending_clicks: usize,
    updates: Vec<ViewerUpdate>,
}

/// In-memory consumer for headless runs and tests.
///
/// Keeps exactly what a viewer would display and a log of the updates it
/// received. Clicks are injected with [`queue_click`](Self::queue_click).
#[derive(Default)]
pub struct RecordingConsumer {
    inner: Mutex<RecordingInner>,
}

impl RecordingConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a user click.
    pub fn queue_click(&self) {
        self.inner.lock().pending_clicks += 1;
    }

    pub fn meshes(&self) -> Vec<Arc<TriangleMesh>> {
        self.inner.lock().meshes.clone()
    }

    pub fn transforms(&self) -> Vec<SE3> {
        self.inner.lock().transforms.clone()
    }

    pub fn view_transform(&self) -> Option<SE3> {
        self.inner.lock().view
    }

    pub fn updates(&self) -> Vec<ViewerUpdate> {
        self.inner.lock().updates.clone()
    }
}

impl VisualizationConsumer for RecordingConsumer {
    fn replace_active_mesh(&self, mesh: Arc<TriangleMesh>, transform: &SE3) {
        let mut inner = self.inner.lock();
        match inner.meshes.last_mut() {
            Some(last) => *last = mesh,
            None => inner.meshes.push(mesh),
        }
        match inner.transforms.last_mut() {
            Some(last) => *last = *transform,
            None => inner.transforms.push(*transform),
        }
        inner.updates.push(ViewerUpdate::ActiveMesh);
    }

    fn replace_all_transforms(&self, transforms: &[SE3]) {
        let mut inner = self.inner.lock();
        inner.transforms = transforms.to_vec();
        inner.updates.push(ViewerUpdate::Transforms(transforms.len()));
    }

    fn replace_all_meshes(&self, meshes: &[Arc<TriangleMesh>], transforms: &[SE3]) {
        let mut inner = self.inner.lock();
        inner.meshes = meshes.to_vec();
        inner.transforms = transforms.to_vec();
        inner.updates.push(ViewerUpdate::AllMeshes(meshes.len()));
    }

    fn set_view_transform(&self, view: &SE3) {
        self.inner.lock().view = Some(*view);
    }

    fn consume_click_event(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.pending_clicks == 0 {
            return false;
        }
        inner.pending_clicks -= 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clicks_consumed_once() {
        let consumer = RecordingConsumer::new();
        assert!(!consumer.consume_click_event());
        consumer.queue_click();
        assert!(consumer.consume_click_event());
        assert!(!consumer.consume_click_event());
    }

    #[test]
    fn test_active_mesh_replaces_last() {
        let consumer = RecordingConsumer::new();
        let a = Arc::new(TriangleMesh::default());
        let b = Arc::new(TriangleMesh::default());
        consumer.replace_all_meshes(&[a.clone(), a.clone()], &[SE3::identity(); 2]);
        consumer.replace_active_mesh(b.clone(), &SE3::identity());

        let meshes = consumer.meshes();
        assert_eq!(meshes.len(), 2);
        assert!(Arc::ptr_eq(&meshes[0], &a));
        assert!(Arc::ptr_eq(&meshes[1], &b));
        assert_eq!(
            consumer.updates(),
            vec![ViewerUpdate::AllMeshes(2), ViewerUpdate::ActiveMesh]
        );
    }
}
