//! Inertial samples forwarded from the camera to the localization system.

pub mod sample;

pub use sample::{GRAVITY, ImuSample};
