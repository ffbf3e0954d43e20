//! Scripted sessions: synthetic RGB-D camera and localizer.

pub mod camera;
pub mod localizer;
pub mod scene;

pub use camera::{SyntheticCamera, SYNTHETIC_INTRINSICS};
pub use localizer::{LocalizerScript, ScriptedLocalizer, ScriptedTrajectory};
pub use scene::{CameraPath, Scene};
