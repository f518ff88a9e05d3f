use ndarray::Array2;
use rayon::prelude::*;

use crate::consts::PARALLEL_PIXEL_THRESHOLD;
use crate::error::{Result, StabilizationError};
use crate::geometry::Point2f;
use crate::motion::Homography;

use super::field::{sample_plane, WarpField};

/// Options for applying a warp field to an image.
#[derive(Clone, Copy, Debug)]
pub struct RemapOptions {
    /// Run a 5x5 median and 3x3 box filter over the displacement planes
    /// before upsampling, to suppress speckle left by robust fitting.
    /// Has no effect on the exact 2x2 homography path.
    pub smooth_field: bool,
}

impl Default for RemapOptions {
    fn default() -> Self {
        Self { smooth_field: true }
    }
}

impl WarpField {
    /// Backward-warp `src` into a new image using this field.
    ///
    /// A 2x2 field is applied as an exact perspective warp built from the
    /// four corner displacements. Larger fields are resized to the image
    /// resolution, added to the identity grid, and remapped with bilinear
    /// interpolation and a constant (zero) border.
    pub fn apply(&self, src: &Array2<f32>) -> Result<Array2<f32>> {
        self.apply_with(src, RemapOptions::default())
    }

    pub fn apply_with(&self, src: &Array2<f32>, options: RemapOptions) -> Result<Array2<f32>> {
        let (h, w) = src.dim();
        if h == 0 || w == 0 {
            return Err(StabilizationError::InvalidInput(format!(
                "cannot warp an empty image: {h}x{w}"
            )));
        }

        if self.shape() == (2, 2) {
            return self.apply_as_homography(src);
        }

        let (mut dx, mut dy) = (self.dx().clone(), self.dy().clone());
        if options.smooth_field {
            dx = box_filter_3x3(&median_filter_5x5(&dx));
            dy = box_filter_3x3(&median_filter_5x5(&dy));
        }

        let field = WarpField::from_planes(dx, dy).resized((h, w));
        Ok(remap_bilinear(src, field.dx(), field.dy()))
    }

    /// Exact perspective path for minimum-size fields.
    fn apply_as_homography(&self, src: &Array2<f32>) -> Result<Array2<f32>> {
        let (h, w) = src.dim();
        let (fw, fh) = (w as f32, h as f32);

        let destination = [
            Point2f::new(0.0, 0.0),
            Point2f::new(fw, 0.0),
            Point2f::new(0.0, fh),
            Point2f::new(fw, fh),
        ];
        let source = [
            destination[0] + Point2f::new(self.dx()[[0, 0]], self.dy()[[0, 0]]),
            destination[1] + Point2f::new(self.dx()[[0, 1]], self.dy()[[0, 1]]),
            destination[2] + Point2f::new(self.dx()[[1, 0]], self.dy()[[1, 0]]),
            destination[3] + Point2f::new(self.dx()[[1, 1]], self.dy()[[1, 1]]),
        ];

        // Degenerate corner quads fall back to the identity mapping.
        let warp = Homography::from_quad(&destination, &source)
            .unwrap_or_else(Homography::identity);

        let warp_row = |row: usize| -> Vec<f32> {
            (0..w)
                .map(|col| {
                    let p = warp.apply(Point2f::new(col as f32, row as f32));
                    sample_bilinear_zero(src, p.y, p.x)
                })
                .collect()
        };

        let rows: Vec<Vec<f32>> = if h * w >= PARALLEL_PIXEL_THRESHOLD {
            (0..h).into_par_iter().map(warp_row).collect()
        } else {
            (0..h).map(warp_row).collect()
        };

        let mut dst = Array2::<f32>::zeros((h, w));
        for (row, row_data) in rows.into_iter().enumerate() {
            for (col, value) in row_data.into_iter().enumerate() {
                dst[[row, col]] = value;
            }
        }
        Ok(dst)
    }
}

/// Remap `src` through per-pixel displacement planes of the same shape.
fn remap_bilinear(src: &Array2<f32>, dx: &Array2<f32>, dy: &Array2<f32>) -> Array2<f32> {
    let (h, w) = src.dim();
    let remap_row = |row: usize| -> Vec<f32> {
        (0..w)
            .map(|col| {
                let sx = col as f32 + dx[[row, col]];
                let sy = row as f32 + dy[[row, col]];
                sample_bilinear_zero(src, sy, sx)
            })
            .collect()
    };

    let rows: Vec<Vec<f32>> = if h * w >= PARALLEL_PIXEL_THRESHOLD {
        (0..h).into_par_iter().map(remap_row).collect()
    } else {
        (0..h).map(remap_row).collect()
    };

    let mut dst = Array2::<f32>::zeros((h, w));
    for (row, row_data) in rows.into_iter().enumerate() {
        for (col, value) in row_data.into_iter().enumerate() {
            dst[[row, col]] = value;
        }
    }
    dst
}

/// Bilinear sample with a constant zero border outside the image.
pub(crate) fn sample_bilinear_zero(data: &Array2<f32>, y: f32, x: f32) -> f32 {
    let (h, w) = data.dim();
    if x < -1.0 || y < -1.0 || x > w as f32 || y > h as f32 {
        return 0.0;
    }

    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let fetch = |r: isize, c: isize| -> f32 {
        if r < 0 || c < 0 || r >= h as isize || c >= w as isize {
            0.0
        } else {
            data[[r as usize, c as usize]]
        }
    };

    let r0 = y0 as isize;
    let c0 = x0 as isize;
    fetch(r0, c0) * (1.0 - fx) * (1.0 - fy)
        + fetch(r0, c0 + 1) * fx * (1.0 - fy)
        + fetch(r0 + 1, c0) * (1.0 - fx) * fy
        + fetch(r0 + 1, c0 + 1) * fx * fy
}

/// 5x5 median filter with edge clamping, used on displacement planes only.
fn median_filter_5x5(data: &Array2<f32>) -> Array2<f32> {
    let (h, w) = data.dim();
    let mut window = [0.0f32; 25];

    Array2::from_shape_fn((h, w), |(r, c)| {
        let mut i = 0;
        for dr in -2isize..=2 {
            for dc in -2isize..=2 {
                let rr = (r as isize + dr).clamp(0, h as isize - 1) as usize;
                let cc = (c as isize + dc).clamp(0, w as isize - 1) as usize;
                window[i] = data[[rr, cc]];
                i += 1;
            }
        }
        let mut sorted = window;
        sorted.sort_by(|a, b| a.total_cmp(b));
        sorted[12]
    })
}

/// 3x3 box filter with edge clamping.
fn box_filter_3x3(data: &Array2<f32>) -> Array2<f32> {
    let (h, w) = data.dim();

    Array2::from_shape_fn((h, w), |(r, c)| {
        let mut sum = 0.0;
        for dr in -1isize..=1 {
            for dc in -1isize..=1 {
                let rr = (r as isize + dr).clamp(0, h as isize - 1) as usize;
                let cc = (c as isize + dc).clamp(0, w as isize - 1) as usize;
                sum += data[[rr, cc]];
            }
        }
        sum / 9.0
    })
}
