use ndarray::Array2;

use crate::error::{Result, StabilizationError};

/// A single luminance frame.
/// Pixel values are f32 in [0.0, 1.0], shape = (height, width).
#[derive(Clone, Debug)]
pub struct Frame {
    pub data: Array2<f32>,
    /// Capture timestamp in nanoseconds, carried through to the output.
    pub timestamp_ns: u64,
}

impl Frame {
    pub fn new(data: Array2<f32>, timestamp_ns: u64) -> Self {
        Self { data, timestamp_ns }
    }

    /// Build a frame from packed 8-bit luminance samples, row-major.
    pub fn from_luma8(samples: &[u8], shape: (usize, usize), timestamp_ns: u64) -> Result<Self> {
        let (h, w) = shape;
        if h == 0 || w == 0 {
            return Err(StabilizationError::InvalidInput(format!(
                "zero-sized frame: {h}x{w}"
            )));
        }
        if samples.len() != h * w {
            return Err(StabilizationError::InvalidInput(format!(
                "expected {} luminance samples for a {h}x{w} frame, got {}",
                h * w,
                samples.len()
            )));
        }

        let data = Array2::from_shape_fn((h, w), |(r, c)| samples[r * w + c] as f32 / 255.0);
        Ok(Self { data, timestamp_ns })
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }
}
