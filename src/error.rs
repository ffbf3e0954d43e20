//! Error types for the reconstruction pipeline.

use std::path::PathBuf;

/// Result type alias
pub type Result<T> = std::result::Result<T, ReconError>;

/// Reconstruction pipeline error types
#[derive(Debug, thiserror::Error)]
pub enum ReconError {
    /// Image bridge input does not have the fixed sensor resolution
    #[error("resolution mismatch: expected {expected_width}x{expected_height}, got {width}x{height}")]
    ResolutionMismatch {
        /// Required width in pixels
        expected_width: usize,
        /// Required height in pixels
        expected_height: usize,
        /// Width of the offending buffer
        width: usize,
        /// Height of the offending buffer
        height: usize,
    },

    /// Buffer length disagrees with its declared dimensions
    #[error("malformed buffer: expected {expected} elements, got {actual}")]
    MalformedBuffer {
        /// Element count implied by width, height and channel count
        expected: usize,
        /// Element count actually present
        actual: usize,
    },

    /// Trajectory query returned arrays of different lengths
    #[error("trajectory query returned {ids} keyframe ids but {poses} poses")]
    TrajectoryMismatch {
        /// Number of keyframe identifiers
        ids: usize,
        /// Number of poses
        poses: usize,
    },

    /// A registered event handler failed during dispatch
    #[error("handler '{handler}' failed: {message}")]
    HandlerFault {
        /// Registration name of the handler
        handler: String,
        /// Error or panic message
        message: String,
    },

    /// Camera intrinsics are unusable (non-positive focal length)
    #[error("invalid camera intrinsics: {0}")]
    InvalidIntrinsics(String),

    /// Configuration value out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be parsed
    #[error("failed to parse config {path}: {source}")]
    ConfigParse {
        /// File that failed to parse
        path: PathBuf,
        /// Underlying TOML error
        source: toml::de::Error,
    },

    /// Localizer used before being attached, or after shutdown
    #[error("localizer error: {0}")]
    Localizer(String),

    /// Visualization backend failure
    #[error("viewer error: {0}")]
    Viewer(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Pose table write failure
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Image encoding failure
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}
