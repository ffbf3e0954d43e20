//! Sensor-side data: frame ids, camera interface, pose-tagged frames and the
//! image conversion bridge.

pub mod camera;
pub mod frame;
pub mod image;
pub mod types;

pub use camera::{Camera, CameraFrame, PinholeIntrinsics};
pub use frame::{Frame, KeyFrameRef};
pub use image::{
    ChannelOrder, ColorBuffer, ColorImage, DepthBuffer, DepthConversion, DepthImage, RgbdImage,
    SENSOR_HEIGHT, SENSOR_WIDTH, to_volume_images,
};
pub use types::{FrameId, KeyFrameId};
