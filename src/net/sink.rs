//! Network sink capability consumed by the pipeline controller.

use async_trait::async_trait;
use bytes::Bytes;

use crate::capture::frame::Residency;

/// One frame's worth of transmit-ready data.
#[derive(Debug, Clone)]
pub struct TransmitPayload {
    /// Pixel bytes, possibly with the motion overlay baked in.
    pub video: Bytes,
    /// Motion field as little-endian f32 (dx, dy) pairs, row-major.
    pub motion: Bytes,
    pub width: u32,
    pub height: u32,
    pub motion_cols: u32,
    pub motion_rows: u32,
    pub residency: Residency,
    /// Source frame sequence number.
    pub frame: u64,
    /// Packaging time, microseconds since the Unix epoch.
    pub timestamp_us: u64,
}

/// Remote receiver of frames and motion data.
///
/// `transmit` is bounded; a `false` return means the payload was
/// dropped. The controller never retries within the same iteration.
#[async_trait]
pub trait FrameSink: Send {
    async fn open(&mut self) -> bool;

    async fn transmit(&mut self, payload: &TransmitPayload) -> bool;
}
