//! State shared by every pipeline handler.
//!
//! The `PipelineState` is owned by the [`EventDispatcher`](super::events::EventDispatcher)
//! behind a single lock. Handlers receive it as `&mut` for the duration of
//! one dispatch, which serializes segment switching, integration, correction
//! and extraction regardless of which thread raised the event.

use crate::fusion::throttle::GateSnapshot;
use crate::fusion::volume::VolumetricEngine;
use crate::viz::mesh_cache::MeshCache;

/// Counters reported at shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub ticks: u64,
    pub frames_fused: u64,
    /// Gated frames that arrived before any KeyFrame.
    pub frames_without_segment: u64,
    pub keyframes: u64,
    pub keyframes_recorded: u64,
    pub incremental_refreshes: u64,
    pub full_refreshes: u64,
    pub corrections_applied: u64,
    pub corrections_rejected: u64,
    pub handler_faults: u64,
}

/// Mutable pipeline state.
pub struct PipelineState {
    tick: u64,
    /// Enabled flag as latched at the start of the current tick.
    latched_enabled: bool,
    /// Live flag, flipped by the UI toggle.
    fusion_enabled: bool,
    /// Incremented every time segment poses are corrected.
    correction_epoch: u64,

    /// The segmented volume model.
    pub volume: Box<dyn VolumetricEngine>,

    /// What the visualization consumer currently holds.
    pub mesh_cache: MeshCache,

    pub stats: PipelineStats,
}

impl PipelineState {
    pub fn new(volume: Box<dyn VolumetricEngine>, fusion_enabled: bool) -> Self {
        Self {
            tick: 0,
            latched_enabled: fusion_enabled,
            fusion_enabled,
            correction_epoch: 0,
            volume,
            mesh_cache: MeshCache::default(),
            stats: PipelineStats::default(),
        }
    }

    /// Advance the tick and latch the enabled flag for it.
    pub fn begin_tick(&mut self) -> GateSnapshot {
        self.tick += 1;
        self.latched_enabled = self.fusion_enabled;
        self.stats.ticks = self.tick;
        self.gate()
    }

    /// Gate values of the current tick.
    pub fn gate(&self) -> GateSnapshot {
        GateSnapshot {
            tick: self.tick,
            enabled: self.latched_enabled,
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn fusion_enabled(&self) -> bool {
        self.fusion_enabled
    }

    /// Set the live flag. Takes effect at the next tick.
    pub fn set_fusion_enabled(&mut self, enabled: bool) {
        self.fusion_enabled = enabled;
    }

    /// Flip the live flag and return its new value.
    pub fn toggle_fusion(&mut self) -> bool {
        self.fusion_enabled = !self.fusion_enabled;
        self.fusion_enabled
    }

    pub fn correction_epoch(&self) -> u64 {
        self.correction_epoch
    }

    /// Record that segment poses changed.
    pub fn mark_corrected(&mut self) {
        self.correction_epoch += 1;
    }
}
