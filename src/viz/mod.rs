//! Visualization: consumer interface, mesh cache and viewer backends.

pub mod consumer;
pub mod mesh_cache;
pub mod rerun;
pub mod view;

pub use consumer::{RecordingConsumer, ViewerUpdate, VisualizationConsumer};
pub use mesh_cache::{refresh_visualization, MeshCache, MeshCacheConfig, MeshExtractionHandler, RefreshPath};
pub use self::rerun::RerunMeshViewer;
pub use view::ViewHandler;
