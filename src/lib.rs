pub mod config;
pub mod error;
pub mod fusion;
pub mod geometry;
pub mod imu;
pub mod io;
pub mod loop_closing;
pub mod sensor;
pub mod sim;
pub mod system;
pub mod viz;

pub use config::ReconConfig;
pub use error::{ReconError, Result};
