use jpeg_decoder::Decoder;
use thiserror::Error;

use super::frame::{Frame, PixelFormat};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("jpeg decode failed: {0}")]
    Jpeg(#[from] jpeg_decoder::Error),

    #[error("decoded frame is {got} bytes, slot expects {want}")]
    SizeMismatch { got: usize, want: usize },

    #[error("no decoder for {0}")]
    Unsupported(PixelFormat),
}

/// Decode raw capture bytes into a frame slot.
///
/// MJPEG is decoded to RGB24; RGB/BGR bytes are copied as-is. The slot's
/// buffer length is the contract: anything that does not fill it exactly
/// is an error, so a short capture can never leave a half-written frame
/// looking valid.
pub fn decode_into(raw: &[u8], format: PixelFormat, slot: &mut Frame) -> Result<(), DecodeError> {
    let want = slot.expected_len();
    match format {
        PixelFormat::Mjpeg => {
            let mut decoder = Decoder::new(raw);
            let pixels = decoder.decode()?;
            if pixels.len() != want {
                return Err(DecodeError::SizeMismatch {
                    got: pixels.len(),
                    want,
                });
            }
            slot.data.copy_from_slice(&pixels);
            Ok(())
        }
        PixelFormat::Rgb24 | PixelFormat::Bgr24 => {
            if raw.len() < want {
                return Err(DecodeError::SizeMismatch {
                    got: raw.len(),
                    want,
                });
            }
            slot.data.copy_from_slice(&raw[..want]);
            Ok(())
        }
        other => Err(DecodeError::Unsupported(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::Residency;

    #[test]
    fn rgb_passthrough_fills_slot() {
        let mut slot = Frame::allocate(4, 2, PixelFormat::Rgb24, Residency::Host);
        let raw: Vec<u8> = (0..24).collect();
        decode_into(&raw, PixelFormat::Rgb24, &mut slot).unwrap();
        assert_eq!(slot.data, raw);
    }

    #[test]
    fn short_rgb_buffer_is_rejected() {
        let mut slot = Frame::allocate(4, 2, PixelFormat::Rgb24, Residency::Host);
        let err = decode_into(&[0u8; 10], PixelFormat::Rgb24, &mut slot).unwrap_err();
        assert!(matches!(err, DecodeError::SizeMismatch { got: 10, .. }));
    }

    #[test]
    fn yuyv_has_no_decoder() {
        let mut slot = Frame::allocate(4, 2, PixelFormat::Yuyv4, Residency::Host);
        let err = decode_into(&[0u8; 16], PixelFormat::Yuyv4, &mut slot).unwrap_err();
        assert!(matches!(err, DecodeError::Unsupported(PixelFormat::Yuyv4)));
    }
}
