//! Frame source capability consumed by the pipeline controller.

use std::time::Duration;

use async_trait::async_trait;

use crate::capture::frame::{Frame, PixelFormat};

/// Outcome of a single fetch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus {
    /// A frame was written into the requested slot.
    Ok,
    /// No frame arrived within the deadline; retry the same slot.
    Timeout,
    /// The source is unavailable until explicitly reopened.
    Closed,
}

/// A live producer of frames.
///
/// `fetch` may occupy a bounded wait up to the caller-supplied timeout;
/// it always returns control to the caller. A `Timeout` must leave the
/// slot untouched as far as the caller is concerned, so the same slot
/// can be retried. After `Closed`, only `reopen` can bring the source
/// back.
#[async_trait]
pub trait FrameSource: Send {
    async fn open(&mut self) -> bool;

    async fn fetch(&mut self, slot: &mut Frame, timeout: Duration) -> SourceStatus;

    async fn reopen(&mut self) -> bool;

    /// Dimensions of the frames this source produces. Valid after `open`.
    fn frame_dimensions(&self) -> (u32, u32);

    /// In-memory layout of fetched frames. Valid after `open`.
    fn pixel_format(&self) -> PixelFormat;
}
