//! Full pipeline runs against synthetic scenes.

use std::sync::Arc;

use rust_recon3d::config::ReconConfig;
use rust_recon3d::io::{load_pose_table, POSE_TABLE};
use rust_recon3d::sim::{CameraPath, LocalizerScript, Scene, ScriptedLocalizer, SyntheticCamera};
use rust_recon3d::system::{ReconstructionSystem, SessionSummary};
use rust_recon3d::viz::{RecordingConsumer, ViewerUpdate};

use approx::assert_relative_eq;
use nalgebra::Vector3;

const FRAME_PERIOD_NS: u64 = 33_333_333;

fn headless_config() -> ReconConfig {
    let mut config = ReconConfig::default();
    config.export.enabled = false;
    config
}

fn run_static_plane(depth: f64, ticks: u64) -> SessionSummary {
    let path = CameraPath::Static {
        position: [0.0, 0.0, 0.0],
    };
    let camera = SyntheticCamera::new(Scene::Plane { depth }, path, FRAME_PERIOD_NS, 200.0);
    let localizer = ScriptedLocalizer::new(path, LocalizerScript::default());
    let consumer = Arc::new(RecordingConsumer::new());

    let mut system = ReconstructionSystem::new(headless_config(), camera, localizer, consumer).unwrap();
    assert_eq!(system.run(Some(ticks)).unwrap(), ticks);
    system.shutdown().unwrap()
}

#[test]
fn test_flat_plane_reconstructed_within_one_centimetre() {
    let summary = run_static_plane(2.0, 30);

    assert!(summary.stats.frames_fused > 0);
    assert!(summary.mesh.num_triangles() > 0);
    for v in &summary.mesh.vertices {
        assert!((v.z - 2.0).abs() <= 0.01, "vertex at z = {}", v.z);
    }
}

#[test]
fn test_depth_beyond_trust_range_is_excluded() {
    let far = run_static_plane(6.0, 9);
    assert!(far.stats.frames_fused > 0);
    assert!(far.mesh.is_empty());
    assert_eq!(far.mesh.num_vertices(), 0);

    let near = run_static_plane(4.0, 9);
    assert!(near.mesh.num_triangles() > 0);
    for v in &near.mesh.vertices {
        assert!((v.z - 4.0).abs() <= 0.01, "vertex at z = {}", v.z);
    }
}

#[test]
fn test_scripted_session_with_loop_closure() {
    let dir = tempfile::tempdir().unwrap();
    let path = CameraPath::Pan {
        position: [0.0, 0.0, 0.0],
        frames_per_turn: 60,
    };
    let script = LocalizerScript {
        keyframe_interval: 10,
        loop_closure_frame: Some(60),
        drift_per_frame: Vector3::new(0.002, 0.0, 0.0),
    };

    let mut config = ReconConfig::default();
    config.recorder.enabled = true;
    config.recorder.output_dir = dir.path().join("recording");
    config.export.mesh_path = dir.path().join("mesh.ply");

    let camera = SyntheticCamera::new(Scene::default(), path, FRAME_PERIOD_NS, 200.0);
    let localizer = ScriptedLocalizer::new(path, script);
    let consumer = Arc::new(RecordingConsumer::new());

    let mut system =
        ReconstructionSystem::new(config, camera, localizer, consumer.clone()).unwrap();
    system.run(Some(75)).unwrap();
    let summary = system.shutdown().unwrap();

    // KeyFrames at frames 0, 10, ..., 70.
    assert_eq!(summary.stats.keyframes, 8);
    assert_eq!(summary.segments, 8);
    // Loop closure plus the final pass.
    assert_eq!(summary.stats.corrections_applied, 2);
    assert_eq!(summary.stats.handler_faults, 0);
    assert!(summary.stats.frames_fused > 0);
    assert!(summary.mesh.num_triangles() > 0);

    // The viewer saw full pushes whenever segments were added.
    let updates = consumer.updates();
    assert!(updates.contains(&ViewerUpdate::AllMeshes(8)));
    assert_eq!(consumer.meshes().len(), 8);

    let ply = std::fs::read_to_string(summary.mesh_path.unwrap()).unwrap();
    assert!(ply.starts_with("ply\n"));

    // Recorded KeyFrames up to the closure now carry drift-free poses.
    let table = load_pose_table(dir.path().join("recording").join(POSE_TABLE)).unwrap();
    assert_eq!(table.len() as u64, summary.stats.keyframes_recorded);
    for (id, pose) in table.iter().filter(|(id, _)| id.0 <= 6) {
        let truth = path.pose_at(id.0 * 10);
        assert_relative_eq!(pose.translation, truth.translation, epsilon = 1e-9);
    }
}

#[test]
fn test_stop_flag_ends_run() {
    let path = CameraPath::Static {
        position: [0.0, 0.0, 0.0],
    };
    let camera = SyntheticCamera::new(Scene::Plane { depth: 2.0 }, path, FRAME_PERIOD_NS, 0.0);
    let localizer = ScriptedLocalizer::new(path, LocalizerScript::default());
    let mut system = ReconstructionSystem::new(
        headless_config(),
        camera,
        localizer,
        Arc::new(RecordingConsumer::new()),
    )
    .unwrap();

    system.run(Some(2)).unwrap();
    system
        .stop_handle()
        .store(true, std::sync::atomic::Ordering::SeqCst);
    assert_eq!(system.run(None).unwrap(), 0);

    let summary = system.shutdown().unwrap();
    assert_eq!(summary.stats.ticks, 2);
}
