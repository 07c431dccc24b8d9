//! Motion estimation capability and its result types.

pub mod block;

use thiserror::Error;

use crate::capture::frame::{Frame, PixelFormat};
use crate::EstimatorParams;

pub use block::BlockMatcher;

#[derive(Debug, Error)]
pub enum EstimatorError {
    #[error("engine not initialized")]
    NotInitialized,

    #[error("frame pair dimensions differ: {0}x{1} vs {2}x{3}")]
    MismatchedPair(u32, u32, u32, u32),

    #[error("frame dimensions changed since initialization: expected {want_w}x{want_h}, got {got_w}x{got_h}")]
    DimensionsChanged {
        want_w: u32,
        want_h: u32,
        got_w: u32,
        got_h: u32,
    },

    #[error("no luma extraction for {0}")]
    UnsupportedFormat(PixelFormat),

    #[error("frame buffer is {got} bytes, expected {want}")]
    TruncatedFrame { got: usize, want: usize },
}

/// One motion vector per block, in pixels of the source frame.
pub type MotionVector = [f32; 2];

/// Grid of motion vectors produced by one estimation step.
///
/// `cols * rows` vectors, row-major; each covers a `block`-pixel square
/// of the source frame.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionField {
    pub cols: u32,
    pub rows: u32,
    pub block: u32,
    pub vectors: Vec<MotionVector>,
}

impl MotionField {
    pub fn at(&self, col: u32, row: u32) -> MotionVector {
        self.vectors[(row * self.cols + col) as usize]
    }
}

/// The estimation engine consumed by the pipeline controller.
///
/// `initialize` binds the engine to the frame pair's dimensions and
/// parameters; it is called once at startup and again after every
/// source recovery, with the same parameters. `motion_field` borrows
/// the result of the most recent step, so it cannot outlive the next
/// `compute_step` call.
pub trait MotionEstimator: Send {
    fn initialize(
        &mut self,
        prev: &Frame,
        curr: &Frame,
        params: &EstimatorParams,
    ) -> Result<(), EstimatorError>;

    fn compute_step(&mut self, prev: &Frame, curr: &Frame) -> Result<(), EstimatorError>;

    fn motion_field(&self) -> Option<&MotionField>;
}
