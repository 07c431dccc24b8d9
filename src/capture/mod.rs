pub mod decoder;
pub mod frame;
pub mod source;
pub mod v4l2;

pub use frame::{Frame, FrameMeta, PixelFormat, Residency};
pub use source::{FrameSource, SourceStatus};
pub use v4l2::V4l2Source;
