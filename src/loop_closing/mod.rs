//! Loop closing: re-anchoring fused segments on the optimized trajectory.
//!
//! Loop detection and pose graph optimization happen upstream in the
//! localizer. This module only reacts to the LoopClosureDetected signal by
//! pulling the corrected KeyFrame poses and moving the segments that are
//! anchored on them.

pub mod corrector;

pub use corrector::{
    apply_corrections, correct_from_source, fetch_corrections, LoopClosureCorrector,
    TrajectoryCorrectionMap,
};
