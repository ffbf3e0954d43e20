use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use rust_recon3d::config::{ReconConfig, ViewerKind};
use rust_recon3d::sim::{ScriptedLocalizer, SyntheticCamera};
use rust_recon3d::system::ReconstructionSystem;
use rust_recon3d::viz::{RecordingConsumer, RerunMeshViewer, VisualizationConsumer};

const APP_NAME: &str = "rust-recon3d";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            info!("Loading configuration from: {}", path);
            ReconConfig::load(&path).with_context(|| format!("Failed to load config {}", path))?
        }
        None => ReconConfig::default(),
    };

    let demo = config.demo.clone();
    let consumer: Arc<dyn VisualizationConsumer> = match demo.viewer {
        ViewerKind::Headless => Arc::new(RecordingConsumer::new()),
        ViewerKind::Rerun => Arc::new(RerunMeshViewer::spawn(APP_NAME).context("Failed to spawn rerun viewer")?),
        ViewerKind::RerunFile => Arc::new(
            RerunMeshViewer::save(APP_NAME, &demo.rrd_path)
                .with_context(|| format!("Failed to create {}", demo.rrd_path.display()))?,
        ),
    };

    let camera = SyntheticCamera::new(demo.scene, demo.path, demo.frame_period_ns, demo.imu_rate_hz);
    let localizer = ScriptedLocalizer::new(demo.path, demo.localizer_script());

    let mut system = ReconstructionSystem::new(config, camera, localizer, consumer)?;
    info!("Camera-IMU initialization complete");

    let ticks = system.run(Some(demo.ticks))?;
    info!("Acquisition stopped after {} ticks", ticks);

    let summary = system.shutdown()?;
    info!(
        "Final mesh: {} vertices, {} triangles over {} segments",
        summary.mesh.num_vertices(),
        summary.mesh.num_triangles(),
        summary.segments
    );
    info!("Exiting...");
    Ok(())
}
