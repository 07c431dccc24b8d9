//! Extraction of a computed motion field into a transmit-ready payload.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use thiserror::Error;

use crate::capture::frame::{Frame, Residency};
use crate::engine::MotionField;
use crate::net::sink::TransmitPayload;

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("frame buffer is {got} bytes, expected {want}")]
    TruncatedFrame { got: usize, want: usize },

    #[error("motion field is empty")]
    EmptyField,

    #[error("motion field covers {field_w}x{field_h} px, frame is {frame_w}x{frame_h}")]
    FieldMismatch {
        field_w: u32,
        field_h: u32,
        frame_w: u32,
        frame_h: u32,
    },
}

/// Copies the motion field and frame pixels out of engine-owned storage
/// before the next estimation step can invalidate them.
///
/// Device-resident frames get the motion vectors drawn into the pixel
/// copy; host-resident frames pass through untransformed. Either way
/// the payload owns its bytes.
pub struct ResultPackager {
    scratch: Vec<u8>,
}

impl ResultPackager {
    pub fn new() -> Self {
        Self {
            scratch: Vec::new(),
        }
    }

    pub fn package(
        &mut self,
        field: &MotionField,
        frame: &Frame,
    ) -> Result<TransmitPayload, PackageError> {
        if field.vectors.is_empty() {
            return Err(PackageError::EmptyField);
        }
        let want = frame.expected_len();
        if frame.data.len() < want {
            return Err(PackageError::TruncatedFrame {
                got: frame.data.len(),
                want,
            });
        }
        let field_w = field.cols * field.block;
        let field_h = field.rows * field.block;
        if field_w > frame.meta.width || field_h > frame.meta.height {
            return Err(PackageError::FieldMismatch {
                field_w,
                field_h,
                frame_w: frame.meta.width,
                frame_h: frame.meta.height,
            });
        }

        let mut motion = Vec::with_capacity(field.vectors.len() * 8);
        for v in &field.vectors {
            motion.extend_from_slice(&v[0].to_le_bytes());
            motion.extend_from_slice(&v[1].to_le_bytes());
        }

        self.scratch.clear();
        self.scratch.extend_from_slice(&frame.data);
        if frame.meta.residency == Residency::Device {
            overlay_vectors(&mut self.scratch, frame, field);
        }

        let timestamp_us = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64;

        Ok(TransmitPayload {
            video: Bytes::copy_from_slice(&self.scratch),
            motion: Bytes::from(motion),
            width: frame.meta.width,
            height: frame.meta.height,
            motion_cols: field.cols,
            motion_rows: field.rows,
            residency: frame.meta.residency,
            frame: frame.meta.sequence,
            timestamp_us,
        })
    }
}

impl Default for ResultPackager {
    fn default() -> Self {
        Self::new()
    }
}

/// Draw each motion vector as a bright trace from its block center.
fn overlay_vectors(pixels: &mut [u8], frame: &Frame, field: &MotionField) {
    let bpp = frame.meta.format.bytes_per_pixel();
    let stride = frame.meta.stride as usize;
    let width = frame.meta.width as i32;
    let height = frame.meta.height as i32;
    let half = (field.block / 2) as i32;

    for row in 0..field.rows {
        for col in 0..field.cols {
            let v = field.at(col, row);
            let cx = (col * field.block) as i32 + half;
            let cy = (row * field.block) as i32 + half;
            let steps = v[0].abs().max(v[1].abs()).ceil() as i32;

            for step in 0..=steps {
                let t = if steps == 0 {
                    0.0
                } else {
                    step as f32 / steps as f32
                };
                let x = cx + (v[0] * t).round() as i32;
                let y = cy + (v[1] * t).round() as i32;
                if x < 0 || x >= width || y < 0 || y >= height {
                    continue;
                }
                let base = y as usize * stride + x as usize * bpp;
                for c in 0..bpp.min(3) {
                    pixels[base + c] = 0xFF;
                }
            }
        }
    }
}
