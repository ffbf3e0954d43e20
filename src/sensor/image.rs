//! Image conversion bridge between camera buffers and the volumetric engine.
//!
//! The camera delivers interleaved 8-bit color and 16-bit millimetre depth at
//! a fixed 640x480. The bridge copies both into the engine layout (RGB8 and
//! u16 depth) pixel by pixel, and [`RgbdImage::from_color_and_depth`] applies
//! the metric scale and trusted-range clip. No filtering or resampling.

use crate::error::{ReconError, Result};

/// Width every bridged buffer must have.
pub const SENSOR_WIDTH: usize = 640;

/// Height every bridged buffer must have.
pub const SENSOR_HEIGHT: usize = 480;

/// Channel order of an interleaved 3-channel color buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

/// Interleaved 3-channel color buffer as produced by the camera driver.
#[derive(Debug, Clone)]
pub struct ColorBuffer {
    pub width: usize,
    pub height: usize,
    pub order: ChannelOrder,
    pub data: Vec<u8>,
}

impl ColorBuffer {
    /// Buffer filled with a single color given in RGB.
    pub fn filled(width: usize, height: usize, order: ChannelOrder, rgb: [u8; 3]) -> Self {
        let px = match order {
            ChannelOrder::Rgb => rgb,
            ChannelOrder::Bgr => [rgb[2], rgb[1], rgb[0]],
        };
        let data = px.iter().copied().cycle().take(width * height * 3).collect();
        Self {
            width,
            height,
            order,
            data,
        }
    }
}

/// Single-channel depth buffer in millimetres; 0 marks a missing sample.
#[derive(Debug, Clone)]
pub struct DepthBuffer {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u16>,
}

impl DepthBuffer {
    /// Buffer with every pixel at the same depth.
    pub fn filled(width: usize, height: usize, depth_mm: u16) -> Self {
        Self {
            width,
            height,
            data: vec![depth_mm; width * height],
        }
    }
}

/// RGB8 color image in the engine layout.
#[derive(Debug, Clone)]
pub struct ColorImage {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<[u8; 3]>,
}

/// Raw 16-bit depth image in the engine layout (still millimetres).
#[derive(Debug, Clone)]
pub struct DepthImage {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u16>,
}

/// Metric conversion applied when pairing color and depth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthConversion {
    /// Raw units per metre (1000.0 for millimetres).
    pub depth_scale: f32,
    /// Samples farther than this (metres) are treated as unknown.
    pub depth_trunc: f32,
}

impl Default for DepthConversion {
    fn default() -> Self {
        Self {
            depth_scale: 1000.0,
            depth_trunc: 5.0,
        }
    }
}

/// Color plus metric depth, ready for integration.
///
/// `depth[i] == 0.0` means no trusted measurement at pixel `i`.
#[derive(Debug, Clone)]
pub struct RgbdImage {
    pub width: usize,
    pub height: usize,
    pub color: Vec<[u8; 3]>,
    pub depth: Vec<f32>,
}

impl RgbdImage {
    /// Pair a color image with a raw depth image, converting depth to metres.
    ///
    /// Values beyond `depth_trunc` become 0.0 (unknown), never a wall or free
    /// space.
    pub fn from_color_and_depth(
        color: ColorImage,
        depth: &DepthImage,
        conversion: DepthConversion,
    ) -> Result<Self> {
        if color.width != depth.width || color.height != depth.height {
            return Err(ReconError::ResolutionMismatch {
                expected_width: color.width,
                expected_height: color.height,
                width: depth.width,
                height: depth.height,
            });
        }

        let depth_m = depth
            .pixels
            .iter()
            .map(|&raw| {
                let meters = raw as f32 / conversion.depth_scale;
                if meters > conversion.depth_trunc {
                    0.0
                } else {
                    meters
                }
            })
            .collect();

        Ok(Self {
            width: color.width,
            height: color.height,
            color: color.pixels,
            depth: depth_m,
        })
    }

    /// Number of pixels carrying a trusted depth.
    pub fn valid_depth_count(&self) -> usize {
        self.depth.iter().filter(|&&d| d > 0.0).count()
    }
}

/// Convert camera buffers into the engine layout.
///
/// Both buffers must be exactly 640x480; anything else is rejected before a
/// single pixel is copied.
pub fn to_volume_images(color: &ColorBuffer, depth: &DepthBuffer) -> Result<(ColorImage, DepthImage)> {
    check_resolution(color.width, color.height)?;
    check_resolution(depth.width, depth.height)?;
    check_len(SENSOR_WIDTH * SENSOR_HEIGHT * 3, color.data.len())?;
    check_len(SENSOR_WIDTH * SENSOR_HEIGHT, depth.data.len())?;

    let pixels = color
        .data
        .chunks_exact(3)
        .map(|px| match color.order {
            ChannelOrder::Rgb => [px[0], px[1], px[2]],
            ChannelOrder::Bgr => [px[2], px[1], px[0]],
        })
        .collect();

    Ok((
        ColorImage {
            width: SENSOR_WIDTH,
            height: SENSOR_HEIGHT,
            pixels,
        },
        DepthImage {
            width: SENSOR_WIDTH,
            height: SENSOR_HEIGHT,
            pixels: depth.data.clone(),
        },
    ))
}

fn check_resolution(width: usize, height: usize) -> Result<()> {
    if width != SENSOR_WIDTH || height != SENSOR_HEIGHT {
        return Err(ReconError::ResolutionMismatch {
            expected_width: SENSOR_WIDTH,
            expected_height: SENSOR_HEIGHT,
            width,
            height,
        });
    }
    Ok(())
}

fn check_len(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(ReconError::MalformedBuffer { expected, actual });
    }
    Ok(())
}
