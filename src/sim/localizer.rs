//! Scripted localizer.
//!
//! Stands in for a visual-inertial SLAM system: poses come from the
//! ground-truth camera path plus a linearly accumulating drift, every
//! `keyframe_interval`-th frame is promoted to a KeyFrame, and at a chosen
//! frame the drift is "optimized away" and a loop closure is raised.
//!
//! FrameAvailable is raised on the caller's thread. KeyFrameAvailable and
//! LoopClosureDetected are raised from a worker thread fed over a channel,
//! the same way a mapping thread would announce them.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use nalgebra::Vector3;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{ReconError, Result};
use crate::geometry::SE3;
use crate::imu::ImuSample;
use crate::sensor::{CameraFrame, Frame, KeyFrameId};
use crate::system::events::EventDispatcher;
use crate::system::localization::{Localizer, TrajectorySource};
use crate::system::messages::WorkerMsg;

use super::scene::CameraPath;

/// Script for the localizer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalizerScript {
    /// Promote every n-th frame (frame 0 included). Zero disables KeyFrames.
    pub keyframe_interval: u64,
    /// Frame index at which the loop closes.
    pub loop_closure_frame: Option<u64>,
    /// World-frame translation error added per frame since the last closure.
    pub drift_per_frame: Vector3<f64>,
}

impl Default for LocalizerScript {
    fn default() -> Self {
        Self {
            keyframe_interval: 10,
            loop_closure_frame: None,
            drift_per_frame: Vector3::zeros(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct TrajectoryEntry {
    id: KeyFrameId,
    frame_index: u64,
    pose: SE3,
}

/// KeyFrame trajectory as currently estimated by the scripted localizer.
#[derive(Default)]
pub struct ScriptedTrajectory {
    entries: Mutex<Vec<TrajectoryEntry>>,
}

impl ScriptedTrajectory {
    fn push(&self, entry: TrajectoryEntry) {
        self.entries.lock().push(entry);
    }

    /// Replace every KeyFrame pose with its ground truth.
    fn optimize(&self, path: &CameraPath) {
        for entry in self.entries.lock().iter_mut() {
            entry.pose = path.pose_at(entry.frame_index);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl TrajectorySource for ScriptedTrajectory {
    fn query_mapped_trajectory(&self) -> (Vec<KeyFrameId>, Vec<SE3>) {
        self.entries.lock().iter().map(|e| (e.id, e.pose)).unzip()
    }
}

pub struct ScriptedLocalizer {
    path: CameraPath,
    script: LocalizerScript,
    trajectory: Arc<ScriptedTrajectory>,
    dispatcher: Option<Arc<EventDispatcher>>,
    worker_tx: Option<Sender<WorkerMsg>>,
    worker_handle: Option<JoinHandle<()>>,
    /// Frame index the current drift started accumulating from.
    drift_origin: u64,
    next_keyframe_id: u64,
    imu_samples: usize,
}

impl ScriptedLocalizer {
    pub fn new(path: CameraPath, script: LocalizerScript) -> Self {
        Self {
            path,
            script,
            trajectory: Arc::new(ScriptedTrajectory::default()),
            dispatcher: None,
            worker_tx: None,
            worker_handle: None,
            drift_origin: 0,
            next_keyframe_id: 0,
            imu_samples: 0,
        }
    }

    /// Inertial samples received so far.
    pub fn imu_samples(&self) -> usize {
        self.imu_samples
    }

    fn estimate(&self, index: u64) -> SE3 {
        let drift = self.script.drift_per_frame * index.saturating_sub(self.drift_origin) as f64;
        SE3::from_translation(drift).compose(&self.path.pose_at(index))
    }

    fn send(&self, msg: WorkerMsg) -> Result<()> {
        let tx = self
            .worker_tx
            .as_ref()
            .ok_or_else(|| ReconError::Localizer("not attached".to_string()))?;
        tx.send(msg)
            .map_err(|_| ReconError::Localizer("worker thread exited".to_string()))
    }

    fn run_worker(rx: Receiver<WorkerMsg>, dispatcher: Arc<EventDispatcher>) {
        while let Ok(msg) = rx.recv() {
            match msg {
                WorkerMsg::NewKeyFrame { frame, keyframe } => {
                    let report = dispatcher.dispatch_keyframe(&frame, &keyframe);
                    if !report.is_clean() {
                        warn!("{} faults while announcing {}", report.faults.len(), keyframe.id);
                    }
                }
                WorkerMsg::LoopClosure => {
                    let report = dispatcher.dispatch_loop_closure();
                    if !report.is_clean() {
                        warn!("{} faults while correcting the loop", report.faults.len());
                    }
                }
                WorkerMsg::Flush(reply) => {
                    reply.send(()).ok();
                }
                WorkerMsg::Shutdown => break,
            }
        }
        debug!("Localizer worker exiting");
    }
}

impl Localizer for ScriptedLocalizer {
    fn attach(&mut self, dispatcher: Arc<EventDispatcher>) -> Result<()> {
        if self.worker_handle.is_some() {
            return Err(ReconError::Localizer("already attached".to_string()));
        }
        let (tx, rx) = unbounded::<WorkerMsg>();
        let worker_dispatcher = Arc::clone(&dispatcher);
        let handle = thread::Builder::new()
            .name("localizer-worker".to_string())
            .spawn(move || Self::run_worker(rx, worker_dispatcher))?;

        self.dispatcher = Some(dispatcher);
        self.worker_tx = Some(tx);
        self.worker_handle = Some(handle);
        Ok(())
    }

    fn push_inertial_samples(&mut self, samples: &[ImuSample]) {
        self.imu_samples += samples.len();
    }

    fn push_frame(&mut self, capture: CameraFrame) -> Result<()> {
        let dispatcher = self
            .dispatcher
            .clone()
            .ok_or_else(|| ReconError::Localizer("not attached".to_string()))?;

        let index = capture.id.0;
        let pose = self.estimate(index);
        let mut frame = Frame::localized(capture, pose);

        let interval = self.script.keyframe_interval;
        if interval != 0 && index % interval == 0 {
            let id = KeyFrameId(self.next_keyframe_id);
            self.next_keyframe_id += 1;
            frame = frame.with_keyframe(id);
            self.trajectory.push(TrajectoryEntry {
                id,
                frame_index: index,
                pose,
            });
        }

        let report = dispatcher.dispatch_frame(&frame);
        if !report.is_clean() {
            warn!("{} faults while fusing frame {}", report.faults.len(), index);
        }

        if let Some(keyframe) = frame.keyframe {
            self.send(WorkerMsg::NewKeyFrame {
                frame: Box::new(frame),
                keyframe,
            })?;
        }

        if self.script.loop_closure_frame == Some(index) {
            self.trajectory.optimize(&self.path);
            self.drift_origin = index;
            info!(
                "Loop closed at frame {}, {} KeyFrames re-optimized",
                index,
                self.trajectory.len()
            );
            self.send(WorkerMsg::LoopClosure)?;
        }
        Ok(())
    }

    fn trajectory(&self) -> Arc<dyn TrajectorySource> {
        self.trajectory.clone()
    }

    fn flush(&mut self) -> Result<()> {
        if self.worker_tx.is_none() {
            return Ok(());
        }
        let (reply_tx, reply_rx) = bounded(1);
        self.send(WorkerMsg::Flush(reply_tx))?;
        reply_rx
            .recv()
            .map_err(|_| ReconError::Localizer("worker thread exited".to_string()))
    }

    fn shutdown(&mut self) -> Result<()> {
        if let Some(tx) = self.worker_tx.take() {
            tx.send(WorkerMsg::Shutdown).ok();
        }
        if let Some(handle) = self.worker_handle.take() {
            handle
                .join()
                .map_err(|_| ReconError::Localizer("worker thread panicked".to_string()))?;
        }
        self.dispatcher = None;
        Ok(())
    }
}

impl Drop for ScriptedLocalizer {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("Localizer shutdown failed: {}", e);
        }
    }
}
