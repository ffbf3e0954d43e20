//! Reconstruction system - acquisition loop and handler wiring.
//!
//! The `ReconstructionSystem` owns the camera, the localizer and the event
//! dispatcher. Each `step` is one acquisition tick: latch the gate, grab a
//! capture, forward inertial data and the capture to the localizer, which
//! raises the events that drive fusion, extraction and correction.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::ReconConfig;
use crate::error::Result;
use crate::fusion::integrator::{ActiveKeyFrameHandler, VolumeIntegrator};
use crate::fusion::tsdf::SegmentedTsdfVolume;
use crate::fusion::volume::{TriangleMesh, VolumetricEngine};
use crate::io::{write_ply, KeyFrameRecorder, KeyFrameSaveHandler};
use crate::loop_closing::{apply_corrections, fetch_corrections, LoopClosureCorrector};
use crate::sensor::{Camera, PinholeIntrinsics, SENSOR_HEIGHT, SENSOR_WIDTH};
use crate::viz::{refresh_visualization, MeshExtractionHandler, ViewHandler, VisualizationConsumer};

use super::events::EventDispatcher;
use super::localization::Localizer;
use super::shared_state::{PipelineState, PipelineStats};

/// What a finished session produced.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub stats: PipelineStats,
    pub segments: usize,
    /// Full world-frame mesh after the final correction.
    pub mesh: TriangleMesh,
    pub mesh_path: Option<PathBuf>,
}

pub struct ReconstructionSystem<C: Camera, L: Localizer> {
    config: ReconConfig,
    camera: C,
    localizer: L,
    dispatcher: Arc<EventDispatcher>,
    consumer: Arc<dyn VisualizationConsumer>,
    recorder: Option<KeyFrameRecorder>,
    stop: Arc<AtomicBool>,
    camera_started: bool,
}

impl<C: Camera, L: Localizer> ReconstructionSystem<C, L> {
    /// Build the pipeline with the reference TSDF volume.
    pub fn new(
        config: ReconConfig,
        camera: C,
        localizer: L,
        consumer: Arc<dyn VisualizationConsumer>,
    ) -> Result<Self> {
        let volume = Box::new(SegmentedTsdfVolume::new(config.volume));
        Self::with_volume(config, camera, localizer, consumer, volume)
    }

    /// Build the pipeline around any volumetric engine.
    pub fn with_volume(
        config: ReconConfig,
        camera: C,
        mut localizer: L,
        consumer: Arc<dyn VisualizationConsumer>,
        volume: Box<dyn VolumetricEngine>,
    ) -> Result<Self> {
        config.validate()?;
        let intrinsics = PinholeIntrinsics::from_color_intrinsics(
            camera.color_intrinsics(),
            SENSOR_WIDTH,
            SENSOR_HEIGHT,
        )?;

        let state = PipelineState::new(volume, config.throttle.start_enabled);
        let dispatcher = Arc::new(EventDispatcher::new(state));

        let recorder = if config.recorder.enabled {
            let recorder = KeyFrameRecorder::create(&config.recorder.output_dir)?;
            dispatcher.register_keyframe_handler(
                "saveframe",
                KeyFrameSaveHandler::new(recorder.clone(), config.throttle),
            );
            Some(recorder)
        } else {
            None
        };

        dispatcher.register_frame_handler(
            "tsdfframe",
            VolumeIntegrator::new(intrinsics, config.throttle, config.volume.depth_conversion()),
        );
        dispatcher.register_frame_handler(
            "meshupdate",
            MeshExtractionHandler::new(consumer.clone(), config.throttle, config.mesh_cache),
        );
        dispatcher.register_frame_handler("viewhandler", ViewHandler::new(consumer.clone()));
        dispatcher.register_keyframe_handler("updatekfhandler", ActiveKeyFrameHandler);
        dispatcher.register_loop_closure_handler(
            "loophandler",
            LoopClosureCorrector::new(localizer.trajectory()),
        );

        localizer.attach(dispatcher.clone())?;

        Ok(Self {
            config,
            camera,
            localizer,
            dispatcher,
            consumer,
            recorder,
            stop: Arc::new(AtomicBool::new(false)),
            camera_started: false,
        })
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    /// Flag that ends [`run`](Self::run) at the next tick boundary.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// One acquisition tick.
    pub fn step(&mut self) -> Result<()> {
        if !self.camera_started {
            self.camera.start()?;
            self.camera_started = true;
            info!("Camera started");
        }

        self.dispatcher.begin_tick();
        let capture = self.camera.grab()?;
        let imu = self.camera.inertial_samples_up_to(capture.timestamp_ns);
        self.localizer.push_inertial_samples(&imu);
        self.localizer.push_frame(capture)
    }

    /// Tick until stopped or `max_ticks` is reached. Returns ticks run.
    pub fn run(&mut self, max_ticks: Option<u64>) -> Result<u64> {
        let mut ticks = 0;
        while !self.stop.load(Ordering::SeqCst) {
            if max_ticks.is_some_and(|max| ticks >= max) {
                break;
            }
            self.step()?;
            ticks += 1;
        }
        Ok(ticks)
    }

    /// Final correction, extraction, export and teardown.
    pub fn shutdown(mut self) -> Result<SessionSummary> {
        self.localizer.flush()?;

        info!("updating transforms");
        let trajectory = self.localizer.trajectory();
        match fetch_corrections(trajectory.as_ref()) {
            Ok(corrections) => {
                self.dispatcher
                    .with_state(|state| apply_corrections(state, &corrections));
                if let Some(recorder) = &self.recorder {
                    let updated = recorder.update_transforms(&corrections)?;
                    info!("Rewrote {} recorded KeyFrame poses", updated);
                }
            }
            Err(e) => {
                warn!("Final correction skipped: {}", e);
                self.dispatcher
                    .with_state(|state| state.stats.corrections_rejected += 1);
            }
        }

        info!("getting mesh");
        let consumer = self.consumer.clone();
        let cache_config = self.config.mesh_cache;
        let (mesh, segments) = self.dispatcher.with_state(|state| {
            refresh_visualization(state, &cache_config, consumer.as_ref());
            (state.volume.extract_full_mesh(), state.volume.num_segments())
        });

        let mesh_path = if self.config.export.enabled {
            write_ply(&mesh, &self.config.export.mesh_path)?;
            info!(
                "Wrote {} ({} vertices, {} triangles)",
                self.config.export.mesh_path.display(),
                mesh.num_vertices(),
                mesh.num_triangles()
            );
            Some(self.config.export.mesh_path.clone())
        } else {
            None
        };

        info!("Terminate...");
        self.localizer.shutdown()?;

        let stats = self.dispatcher.with_state(|state| state.stats);
        info!(
            "Session done: {} ticks, {} fused, {} keyframes, {} segments, {} corrections ({} rejected), {} faults",
            stats.ticks,
            stats.frames_fused,
            stats.keyframes,
            segments,
            stats.corrections_applied,
            stats.corrections_rejected,
            stats.handler_faults
        );

        Ok(SessionSummary {
            stats,
            segments,
            mesh,
            mesh_path,
        })
    }
}
