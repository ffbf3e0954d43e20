//! Frame throttle gate.
//!
//! Fusion and extraction run on independent schedules against the same tick
//! clock. The tick advances once per acquisition iteration, so every handler
//! invoked for that iteration sees the same value. With the reference policy
//! fusion fires on ticks 3, 6, 9, ... and extraction on ticks 1, 31, 61, ...

use serde::Deserialize;

/// Fuse when enabled and `tick` is a multiple of `stride`.
///
/// A zero stride never fires.
#[inline]
pub fn should_fuse(tick: u64, enabled: bool, stride: u64) -> bool {
    enabled && stride != 0 && tick % stride == 0
}

/// Extract when enabled and `tick % stride == offset`.
///
/// A zero stride never fires.
#[inline]
pub fn should_extract(tick: u64, enabled: bool, stride: u64, offset: u64) -> bool {
    enabled && stride != 0 && tick % stride == offset
}

/// Gating schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Fuse every `fuse_stride` ticks.
    pub fuse_stride: u64,
    /// Extract every `extract_stride` ticks...
    pub extract_stride: u64,
    /// ...at this phase.
    pub extract_offset: u64,
    /// Whether fusion starts enabled.
    pub start_enabled: bool,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            fuse_stride: 3,
            extract_stride: 30,
            extract_offset: 1,
            start_enabled: true,
        }
    }
}

/// Tick value and enabled flag latched at the start of a tick.
///
/// Handlers receive this by value so that a toggle issued mid-tick only
/// affects the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateSnapshot {
    pub tick: u64,
    pub enabled: bool,
}

impl GateSnapshot {
    /// Whether this tick fuses under `config`.
    pub fn fuse(&self, config: &ThrottleConfig) -> bool {
        should_fuse(self.tick, self.enabled, config.fuse_stride)
    }

    /// Whether this tick extracts under `config`.
    pub fn extract(&self, config: &ThrottleConfig) -> bool {
        should_extract(
            self.tick,
            self.enabled,
            config.extract_stride,
            config.extract_offset,
        )
    }
}
