use std::fmt;

use serde::{Deserialize, Serialize};

/// Pixel formats we support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Rgb24,
    Bgr24,
    Yuyv4,
    Mjpeg,
}

impl PixelFormat {
    /// Bytes per pixel of the decoded in-memory layout.
    ///
    /// Mjpeg frames are decoded to RGB24 before they land in a slot, so
    /// every format stores three bytes per pixel once fetched.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb24 | PixelFormat::Bgr24 | PixelFormat::Mjpeg => 3,
            PixelFormat::Yuyv4 => 2,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelFormat::Rgb24 => "RGB24",
            PixelFormat::Bgr24 => "BGR24",
            PixelFormat::Yuyv4 => "YUYV",
            PixelFormat::Mjpeg => "MJPEG",
        };
        f.write_str(name)
    }
}

/// Whether a buffer's pixel data lives in device or host memory.
///
/// Decides how the packager prepares a payload: device-resident frames
/// get the motion overlay baked in, host-resident frames pass through
/// untransformed. The flag travels in the wire header so the receiver
/// knows which it got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Residency {
    Host,
    Device,
}

/// Frame metadata
#[derive(Debug, Clone)]
pub struct FrameMeta {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub format: PixelFormat,
    pub residency: Residency,
}

impl fmt::Display for FrameMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {}x{} {} ({:?}, stride {})",
            self.sequence, self.width, self.height, self.format, self.residency, self.stride
        )
    }
}

/// A writable frame slot owned by the pipeline.
///
/// Exactly two of these live inside the frame ring; a fetch writes into
/// one while the estimation step reads both.
pub struct Frame {
    pub data: Vec<u8>,
    pub meta: FrameMeta,
}

impl Frame {
    /// Allocate a zero-filled slot for the given dimensions.
    pub fn allocate(width: u32, height: u32, format: PixelFormat, residency: Residency) -> Self {
        let bpp = format.bytes_per_pixel();
        let stride = width as usize * bpp;
        Self {
            data: vec![0; stride * height as usize],
            meta: FrameMeta {
                sequence: 0,
                width,
                height,
                stride: stride as u32,
                format,
                residency,
            },
        }
    }

    /// Expected byte length of the pixel buffer.
    pub fn expected_len(&self) -> usize {
        self.meta.stride as usize * self.meta.height as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_sizes_buffer_from_dimensions() {
        let frame = Frame::allocate(64, 48, PixelFormat::Rgb24, Residency::Host);
        assert_eq!(frame.data.len(), 64 * 48 * 3);
        assert_eq!(frame.meta.stride, 64 * 3);
        assert_eq!(frame.expected_len(), frame.data.len());
    }

    #[test]
    fn meta_display_names_format() {
        let frame = Frame::allocate(8, 8, PixelFormat::Mjpeg, Residency::Device);
        let text = frame.meta.to_string();
        assert!(text.contains("MJPEG"));
        assert!(text.contains("8x8"));
    }
}
