//! CPU block-matching motion estimator.
//!
//! Sum-of-absolute-differences search over the luma plane, one vector
//! per 16x16 block. Not a production optical-flow implementation; it
//! exists so the pipeline has a self-contained engine to drive.

use crate::capture::frame::{Frame, PixelFormat};
use crate::engine::{EstimatorError, MotionEstimator, MotionField};
use crate::EstimatorParams;

const BLOCK: usize = 16;
const RADIUS: i32 = 8;

pub struct BlockMatcher {
    params: EstimatorParams,
    width: u32,
    height: u32,
    cols: u32,
    rows: u32,
    prev_luma: Vec<u8>,
    curr_luma: Vec<u8>,
    field: Option<MotionField>,
    initialized: bool,
}

impl BlockMatcher {
    pub fn new() -> Self {
        Self {
            params: EstimatorParams::default(),
            width: 0,
            height: 0,
            cols: 0,
            rows: 0,
            prev_luma: Vec::new(),
            curr_luma: Vec::new(),
            field: None,
            initialized: false,
        }
    }

    fn check_pair(&self, prev: &Frame, curr: &Frame) -> Result<(), EstimatorError> {
        if prev.meta.width != curr.meta.width || prev.meta.height != curr.meta.height {
            return Err(EstimatorError::MismatchedPair(
                prev.meta.width,
                prev.meta.height,
                curr.meta.width,
                curr.meta.height,
            ));
        }
        if prev.meta.width != self.width || prev.meta.height != self.height {
            return Err(EstimatorError::DimensionsChanged {
                want_w: self.width,
                want_h: self.height,
                got_w: prev.meta.width,
                got_h: prev.meta.height,
            });
        }
        Ok(())
    }

    fn fill_luma(frame: &Frame, out: &mut [u8]) -> Result<(), EstimatorError> {
        let w = frame.meta.width as usize;
        let h = frame.meta.height as usize;
        let need = w * h * 3;
        if frame.data.len() < need {
            return Err(EstimatorError::TruncatedFrame {
                got: frame.data.len(),
                want: need,
            });
        }

        // BT.601-ish integer luma; Mjpeg slots hold decoded RGB24.
        let (ri, bi) = match frame.meta.format {
            PixelFormat::Rgb24 | PixelFormat::Mjpeg => (0usize, 2usize),
            PixelFormat::Bgr24 => (2, 0),
            other => return Err(EstimatorError::UnsupportedFormat(other)),
        };

        for (px, y) in out.iter_mut().enumerate() {
            let base = px * 3;
            let r = frame.data[base + ri] as u32;
            let g = frame.data[base + 1] as u32;
            let b = frame.data[base + bi] as u32;
            *y = ((77 * r + 150 * g + 29 * b) >> 8) as u8;
        }
        Ok(())
    }

    fn sad(&self, px: usize, py: usize, cx: usize, cy: usize) -> u32 {
        let w = self.width as usize;
        let mut acc = 0u32;
        for row in 0..BLOCK {
            let p = (py + row) * w + px;
            let c = (cy + row) * w + cx;
            for col in 0..BLOCK {
                let a = self.prev_luma[p + col] as i32;
                let b = self.curr_luma[c + col] as i32;
                acc += a.abs_diff(b);
            }
        }
        acc
    }

    /// Best displacement for the block anchored at (x0, y0) in the
    /// previous frame, searched against the current frame.
    fn search(&self, x0: usize, y0: usize) -> (f32, f32) {
        let max_x = self.width as usize - BLOCK;
        let max_y = self.height as usize - BLOCK;
        let bias = self.params.bias_weight;

        let mut best = f32::INFINITY;
        let mut best_dx = 0i32;
        let mut best_dy = 0i32;

        for dy in -RADIUS..=RADIUS {
            let cy = y0 as i32 + dy;
            if cy < 0 || cy as usize > max_y {
                continue;
            }
            for dx in -RADIUS..=RADIUS {
                let cx = x0 as i32 + dx;
                if cx < 0 || cx as usize > max_x {
                    continue;
                }
                let sad = self.sad(x0, y0, cx as usize, cy as usize) as f32;
                let penalty = bias * ((dx * dx + dy * dy) as f32).sqrt() * BLOCK as f32;
                let cost = sad + penalty;
                if cost < best {
                    best = cost;
                    best_dx = dx;
                    best_dy = dy;
                }
            }
        }

        (best_dx as f32, best_dy as f32)
    }

    fn smooth(&self, vectors: &mut [[f32; 2]]) {
        let s = self.params.smoothness_factor;
        if s <= 0.0 || vectors.is_empty() {
            return;
        }
        let cols = self.cols as i32;
        let rows = self.rows as i32;
        let raw = vectors.to_vec();
        for row in 0..rows {
            for col in 0..cols {
                let mut sum = [0.0f32; 2];
                let mut n = 0.0f32;
                for (nc, nr) in [(col - 1, row), (col + 1, row), (col, row - 1), (col, row + 1)] {
                    if nc < 0 || nc >= cols || nr < 0 || nr >= rows {
                        continue;
                    }
                    let v = raw[(nr * cols + nc) as usize];
                    sum[0] += v[0];
                    sum[1] += v[1];
                    n += 1.0;
                }
                if n == 0.0 {
                    continue;
                }
                let here = &mut vectors[(row * cols + col) as usize];
                here[0] = (raw[(row * cols + col) as usize][0] + s * sum[0] / n) / (1.0 + s);
                here[1] = (raw[(row * cols + col) as usize][1] + s * sum[1] / n) / (1.0 + s);
            }
        }
    }
}

impl Default for BlockMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MotionEstimator for BlockMatcher {
    fn initialize(
        &mut self,
        prev: &Frame,
        curr: &Frame,
        params: &EstimatorParams,
    ) -> Result<(), EstimatorError> {
        if prev.meta.width != curr.meta.width || prev.meta.height != curr.meta.height {
            return Err(EstimatorError::MismatchedPair(
                prev.meta.width,
                prev.meta.height,
                curr.meta.width,
                curr.meta.height,
            ));
        }

        self.params = *params;
        self.width = prev.meta.width;
        self.height = prev.meta.height;
        self.cols = self.width / BLOCK as u32;
        self.rows = self.height / BLOCK as u32;
        let plane = self.width as usize * self.height as usize;
        self.prev_luma = vec![0; plane];
        self.curr_luma = vec![0; plane];
        self.field = None;
        self.initialized = true;
        Ok(())
    }

    fn compute_step(&mut self, prev: &Frame, curr: &Frame) -> Result<(), EstimatorError> {
        if !self.initialized {
            return Err(EstimatorError::NotInitialized);
        }
        self.check_pair(prev, curr)?;

        Self::fill_luma(prev, &mut self.prev_luma)?;
        Self::fill_luma(curr, &mut self.curr_luma)?;

        let mut vectors = Vec::with_capacity((self.cols * self.rows) as usize);
        for row in 0..self.rows {
            for col in 0..self.cols {
                let x0 = col as usize * BLOCK;
                let y0 = row as usize * BLOCK;
                let (dx, dy) = self.search(x0, y0);
                vectors.push([dx, dy]);
            }
        }

        self.smooth(&mut vectors);

        let divisor = (1u32 << self.params.mv_div_factor) as f32;
        for v in &mut vectors {
            v[0] /= divisor;
            v[1] /= divisor;
        }

        self.field = Some(MotionField {
            cols: self.cols,
            rows: self.rows,
            block: BLOCK as u32,
            vectors,
        });
        Ok(())
    }

    fn motion_field(&self) -> Option<&MotionField> {
        self.field.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::Residency;

    fn noise_frame(width: u32, height: u32, shift: usize) -> Frame {
        let mut frame = Frame::allocate(width, height, PixelFormat::Rgb24, Residency::Host);
        let w = width as usize;
        // Deterministic per-pixel noise, horizontally rotated by `shift`.
        for y in 0..height as usize {
            for x in 0..w {
                let sx = (x + w - shift) % w;
                let mut v = (sx as u64)
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(y as u64 * 1442695040888963407);
                v ^= v >> 33;
                let lum = (v % 251) as u8;
                let base = (y * w + x) * 3;
                frame.data[base] = lum;
                frame.data[base + 1] = lum;
                frame.data[base + 2] = lum;
            }
        }
        frame
    }

    fn params(bias: f32, div: u32, smooth: f32) -> EstimatorParams {
        EstimatorParams {
            bias_weight: bias,
            mv_div_factor: div,
            smoothness_factor: smooth,
        }
    }

    #[test]
    fn no_field_before_first_step() {
        let prev = noise_frame(64, 64, 0);
        let curr = noise_frame(64, 64, 0);
        let mut engine = BlockMatcher::new();
        engine.initialize(&prev, &curr, &params(0.0, 0, 0.0)).unwrap();
        assert!(engine.motion_field().is_none());
    }

    #[test]
    fn step_before_initialize_is_rejected() {
        let prev = noise_frame(64, 64, 0);
        let curr = noise_frame(64, 64, 0);
        let mut engine = BlockMatcher::new();
        let err = engine.compute_step(&prev, &curr).unwrap_err();
        assert!(matches!(err, EstimatorError::NotInitialized));
    }

    #[test]
    fn identical_frames_yield_zero_motion() {
        let prev = noise_frame(64, 64, 0);
        let curr = noise_frame(64, 64, 0);
        let mut engine = BlockMatcher::new();
        engine.initialize(&prev, &curr, &params(0.5, 0, 0.0)).unwrap();
        engine.compute_step(&prev, &curr).unwrap();

        let field = engine.motion_field().unwrap();
        assert_eq!(field.cols, 4);
        assert_eq!(field.rows, 4);
        for v in &field.vectors {
            assert_eq!(*v, [0.0, 0.0]);
        }
    }

    #[test]
    fn horizontal_shift_is_detected() {
        let prev = noise_frame(64, 64, 0);
        let curr = noise_frame(64, 64, 4);
        let mut engine = BlockMatcher::new();
        engine.initialize(&prev, &curr, &params(0.0, 0, 0.0)).unwrap();
        engine.compute_step(&prev, &curr).unwrap();

        let field = engine.motion_field().unwrap();
        // Interior columns: the +4 candidate is inside the search window
        // and away from the rotation seam.
        for row in 0..field.rows {
            for col in 1..=2 {
                assert_eq!(field.at(col, row), [4.0, 0.0], "block ({col},{row})");
            }
        }
    }

    #[test]
    fn div_factor_scales_vectors() {
        let prev = noise_frame(64, 64, 0);
        let curr = noise_frame(64, 64, 4);
        let mut engine = BlockMatcher::new();
        engine.initialize(&prev, &curr, &params(0.0, 2, 0.0)).unwrap();
        engine.compute_step(&prev, &curr).unwrap();

        let field = engine.motion_field().unwrap();
        assert_eq!(field.at(1, 1), [1.0, 0.0]);
    }

    #[test]
    fn smoothing_preserves_uniform_motion() {
        let prev = noise_frame(64, 64, 0);
        let curr = noise_frame(64, 64, 4);
        let mut engine = BlockMatcher::new();
        engine.initialize(&prev, &curr, &params(0.0, 0, 1.0)).unwrap();
        engine.compute_step(&prev, &curr).unwrap();

        // Block (1,2) and all four of its neighbors can reach the +4
        // candidate, so every input to the blend is (4, 0).
        let field = engine.motion_field().unwrap();
        let v = field.at(1, 2);
        assert!((v[0] - 4.0).abs() < 1e-3, "got {v:?}");
        assert!(v[1].abs() < 1e-3);
    }

    #[test]
    fn dimension_change_is_rejected() {
        let prev = noise_frame(64, 64, 0);
        let curr = noise_frame(64, 64, 0);
        let mut engine = BlockMatcher::new();
        engine.initialize(&prev, &curr, &params(0.0, 0, 0.0)).unwrap();

        let small_prev = noise_frame(32, 32, 0);
        let small_curr = noise_frame(32, 32, 0);
        let err = engine.compute_step(&small_prev, &small_curr).unwrap_err();
        assert!(matches!(err, EstimatorError::DimensionsChanged { .. }));
    }
}
