//! # Video Format Types
//!
//! Media type model for the render sink: pixel format, frame geometry, and
//! frame rate. A stream sink accepts one major type (video); once a format
//! has been applied, later formats must keep the same pixel format — only
//! geometry and rate may change mid-stream (as an in-band format change).

use serde::{Deserialize, Serialize};

/// Supported pixel formats (the media subtype).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Planar YUV 4:2:0, 8-bit (the common camera/renderer interchange format).
    Nv12,
    /// Planar YUV 4:2:0, 8-bit, three planes.
    I420,
    /// Packed YUV 4:2:2, 8-bit.
    Yuy2,
    /// Packed BGRA, 8-bit per channel.
    Bgra,
}

/// Video format metadata for one stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoFormat {
    /// Pixel format (subtype). Fixed for the lifetime of a stream.
    pub pixel_format: PixelFormat,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Frame rate as a rational (numerator, denominator), e.g. (30000, 1001).
    pub frame_rate: (u32, u32),
}

impl VideoFormat {
    /// Create a new video format descriptor.
    pub fn new(pixel_format: PixelFormat, width: u32, height: u32, frame_rate: (u32, u32)) -> Self {
        Self {
            pixel_format,
            width,
            height,
            frame_rate,
        }
    }

    /// 720p30 NV12, a typical capture-pipeline default.
    pub fn hd_720p30() -> Self {
        Self::new(PixelFormat::Nv12, 1280, 720, (30, 1))
    }

    /// Frame rate in frames per second.
    pub fn fps(&self) -> f64 {
        if self.frame_rate.1 == 0 {
            return 0.0;
        }
        self.frame_rate.0 as f64 / self.frame_rate.1 as f64
    }

    /// Returns `true` if `other` may replace this format mid-stream.
    ///
    /// The pixel format is the stream's subtype and may not change once set;
    /// geometry and rate changes travel through the queue as in-band format
    /// changes.
    pub fn is_compatible_with(&self, other: &VideoFormat) -> bool {
        self.pixel_format == other.pixel_format
    }
}
