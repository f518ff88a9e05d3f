use ndarray::Array2;

use crate::consts::{MESH_ACCUMULATION_WEIGHT, MINIMUM_FIELD_SHAPE};
use crate::data::SpatialMap;
use crate::data::stream_buffer::Convolvable;
use crate::error::{Result, StabilizationError};
use crate::geometry::{sign, Point2f, Rect2f};
use crate::motion::Homography;

/// A dense grid of 2D displacement vectors describing a backward warp.
///
/// At destination coordinate `(x, y)` in a frame of size `(w, h)`, the
/// source coordinate is `(x, y) + sample(x * (cols-1) / w, y * (rows-1) / h)`.
/// The identity warp is the all-zero field, and a 2x2 field is the exact
/// representation of a homography.
///
/// Displacements are stored as separate per-axis planes of shape
/// `(rows, cols)`.
#[derive(Clone, Debug)]
pub struct WarpField {
    dx: Array2<f32>,
    dy: Array2<f32>,
}

impl WarpField {
    /// Create an identity field of shape `(rows, cols)`.
    pub fn new(shape: (usize, usize)) -> Self {
        assert!(
            shape.0 >= MINIMUM_FIELD_SHAPE.0 && shape.1 >= MINIMUM_FIELD_SHAPE.1,
            "warp field must be at least 2x2"
        );
        Self {
            dx: Array2::zeros(shape),
            dy: Array2::zeros(shape),
        }
    }

    /// Build a field from pre-computed displacement planes.
    pub fn from_planes(dx: Array2<f32>, dy: Array2<f32>) -> Self {
        assert_eq!(dx.dim(), dy.dim(), "displacement planes must match");
        assert!(dx.nrows() >= 2 && dx.ncols() >= 2, "warp field must be at least 2x2");
        Self { dx, dy }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.dx.dim()
    }

    pub fn rows(&self) -> usize {
        self.dx.nrows()
    }

    pub fn cols(&self) -> usize {
        self.dx.ncols()
    }

    pub fn dx(&self) -> &Array2<f32> {
        &self.dx
    }

    pub fn dy(&self) -> &Array2<f32> {
        &self.dy
    }

    fn check_shape(&self, other: &WarpField) -> Result<()> {
        if self.shape() != other.shape() {
            return Err(StabilizationError::SizeMismatch {
                expected: self.shape(),
                actual: other.shape(),
            });
        }
        Ok(())
    }

    /// Reset to the identity warp.
    pub fn set_identity(&mut self) {
        self.dx.fill(0.0);
        self.dy.fill(0.0);
    }

    /// Set every cell to the backward displacement of a uniform `motion`.
    pub fn set_to_translation(&mut self, motion: Point2f) {
        self.dx.fill(-motion.x);
        self.dy.fill(-motion.y);
    }

    /// Add a constant vector to every cell.
    pub fn translate_by(&mut self, amount: Point2f) {
        self.dx.mapv_inplace(|v| v + amount.x);
        self.dy.mapv_inplace(|v| v + amount.y);
    }

    /// Set the field to represent the homography `warp` over a frame of
    /// size `scale` = `(w, h)`. A 2x2 field represents it exactly.
    pub fn set_to(&mut self, warp: &Homography, scale: (f32, f32)) {
        let (rows, cols) = self.shape();
        let step_x = scale.0 / (cols - 1) as f32;
        let step_y = scale.1 / (rows - 1) as f32;

        let inverse = warp.try_invert().unwrap_or_else(Homography::identity);
        for r in 0..rows {
            for c in 0..cols {
                let p = Point2f::new(c as f32 * step_x, r as f32 * step_y);
                let source = inverse.apply(p);
                self.dx[[r, c]] = source.x - p.x;
                self.dy[[r, c]] = source.y - p.y;
            }
        }
    }

    /// Sample the displacement at a position in grid coordinates, where
    /// `x` spans `[0, cols-1]` and `y` spans `[0, rows-1]`. Bilinear
    /// between grid points, clamped to the nearest edge outside.
    pub fn sample(&self, position: Point2f) -> Point2f {
        Point2f::new(
            sample_plane(&self.dx, position.y, position.x),
            sample_plane(&self.dy, position.y, position.x),
        )
    }

    /// Final position of a grid-coordinate point after warping.
    pub fn trace(&self, position: Point2f) -> Point2f {
        position + self.sample(position)
    }

    /// Fit the field to a set of point correspondences over `region`.
    ///
    /// The estimation is inspired by the MeshFlow algorithm: a 2x2 seed
    /// (taken from `motion_hint` when present) accumulates observed motions
    /// with a sign-based median-like update, then the grid is repeatedly
    /// upsampled 2x and refined with halved accumulation weight until it
    /// reaches the field's resolution. Cells with no nearby matches inherit
    /// motion from their neighborhood and the hint.
    pub fn fit_to(
        &mut self,
        region: Rect2f,
        origin_points: &[Point2f],
        warped_points: &[Point2f],
        motion_hint: Option<&Homography>,
    ) {
        assert_eq!(origin_points.len(), warped_points.len());

        let target_shape = self.shape();
        let mut motions = WarpField::new(MINIMUM_FIELD_SHAPE);

        if let Some(hint) = motion_hint {
            if let Some(inverse) = hint.try_invert() {
                let corners = [
                    Point2f::new(region.x, region.y),
                    Point2f::new(region.x + region.w, region.y),
                    Point2f::new(region.x, region.y + region.h),
                    Point2f::new(region.x + region.w, region.y + region.h),
                ];
                for (i, corner) in corners.iter().enumerate() {
                    let offset = inverse.apply(*corner) - *corner;
                    motions.dx[[i / 2, i % 2]] = offset.x;
                    motions.dy[[i / 2, i % 2]] = offset.y;
                }
            }
        }

        // The alignment rectangle positions grid cells so that each cell is
        // centred on one of the field's vertices.
        let mut weight = MESH_ACCUMULATION_WEIGHT;
        let seed_alignment = Rect2f::new(
            region.x - region.w / 2.0,
            region.y - region.h / 2.0,
            region.w * 2.0,
            region.h * 2.0,
        );
        accumulate_motions(&mut motions, weight, seed_alignment, origin_points, warped_points);

        while motions.shape() != target_shape {
            let next_shape = (
                (motions.rows() * 2).min(target_shape.0),
                (motions.cols() * 2).min(target_shape.1),
            );

            let cell_w = region.w / (next_shape.1 - 1) as f32;
            let cell_h = region.h / (next_shape.0 - 1) as f32;
            let alignment = Rect2f::new(
                region.x - cell_w / 2.0,
                region.y - cell_h / 2.0,
                next_shape.1 as f32 * cell_w,
                next_shape.0 as f32 * cell_h,
            );

            weight /= 2.0;
            motions = motions.resized(next_shape);
            accumulate_motions(&mut motions, weight, alignment, origin_points, warped_points);
        }

        *self = motions;
    }

    /// Bilinear resample of the displacement grid to a new shape.
    /// Identity is preserved since zero resamples to zero.
    pub fn resized(&self, shape: (usize, usize)) -> WarpField {
        assert!(shape.0 >= 2 && shape.1 >= 2, "warp field must be at least 2x2");
        if shape == self.shape() {
            return self.clone();
        }
        WarpField {
            dx: resize_plane(&self.dx, shape),
            dy: resize_plane(&self.dy, shape),
        }
    }

    pub fn resize(&mut self, shape: (usize, usize)) {
        if shape != self.shape() {
            *self = self.resized(shape);
        }
    }

    /// `self += weight * other`. Used to convolve a window of fields.
    pub fn combine(&mut self, other: &WarpField, weight: f64) -> Result<()> {
        self.check_shape(other)?;
        let w = weight as f32;
        self.dx.zip_mut_with(&other.dx, |a, &b| *a += w * b);
        self.dy.zip_mut_with(&other.dy, |a, &b| *a += w * b);
        Ok(())
    }

    /// Per-component symmetric clamp to `limits` = `(max_x, max_y)`.
    pub fn clamp(&mut self, limits: (f32, f32)) {
        self.dx.mapv_inplace(|v| v.clamp(-limits.0, limits.0));
        self.dy.mapv_inplace(|v| v.clamp(-limits.1, limits.1));
    }

    /// Per-component clamp to an asymmetric range.
    pub fn clamp_range(&mut self, min: (f32, f32), max: (f32, f32)) {
        self.dx.mapv_inplace(|v| v.clamp(min.0, max.0));
        self.dy.mapv_inplace(|v| v.clamp(min.1, max.1));
    }

    /// Rigidity filter: pull every vector toward the field mean, keeping
    /// only `tolerance` of its deviation.
    pub fn undistort(&mut self, tolerance: f32) {
        let mean_x = self.dx.mean().unwrap_or(0.0);
        let mean_y = self.dy.mean().unwrap_or(0.0);
        self.dx.mapv_inplace(|v| mean_x + tolerance * (v - mean_x));
        self.dy.mapv_inplace(|v| mean_y + tolerance * (v - mean_y));
    }

    /// Compose the field with a crop: destinations cover the full frame of
    /// shape `frame_shape` while sources are drawn from `region`, rescaled.
    pub fn crop_in(&mut self, region: Rect2f, frame_shape: (usize, usize)) {
        let (rows, cols) = self.shape();
        let frame_w = frame_shape.1 as f32;
        let frame_h = frame_shape.0 as f32;
        let step_x = frame_w / (cols - 1) as f32;
        let step_y = frame_h / (rows - 1) as f32;

        let previous = self.clone();
        for r in 0..rows {
            for c in 0..cols {
                let p = Point2f::new(c as f32 * step_x, r as f32 * step_y);
                let cropped = Point2f::new(
                    region.x + p.x * region.w / frame_w,
                    region.y + p.y * region.h / frame_h,
                );
                // Sample the old field at the crop point so the crop
                // composes with the existing warp.
                let grid = Point2f::new(
                    cropped.x * (cols - 1) as f32 / frame_w,
                    cropped.y * (rows - 1) as f32 / frame_h,
                );
                let carried = previous.sample(grid);
                self.dx[[r, c]] = (cropped.x - p.x) + carried.x;
                self.dy[[r, c]] = (cropped.y - p.y) + carried.y;
            }
        }
    }

    /// Per-axis scaling of all displacement vectors.
    pub fn scale_by(&mut self, factors: (f32, f32)) {
        self.dx.mapv_inplace(|v| v * factors.0);
        self.dy.mapv_inplace(|v| v * factors.1);
    }
}

impl Convolvable for WarpField {
    fn zero_like(&self) -> Self {
        WarpField::new(self.shape())
    }

    fn accumulate(&mut self, other: &Self, weight: f64) {
        debug_assert_eq!(self.shape(), other.shape());
        let w = weight as f32;
        self.dx.zip_mut_with(&other.dx, |a, &b| *a += w * b);
        self.dy.zip_mut_with(&other.dy, |a, &b| *a += w * b);
    }
}

/// Median-like accumulation of observed motions into a coarse field.
///
/// Each match adjusts the cell containing its warped point by
/// `weight * sign(observed - stored)` per component, so repeated updates
/// converge on the local median motion instead of being dragged by
/// outliers.
fn accumulate_motions(
    field: &mut WarpField,
    weight: f32,
    alignment: Rect2f,
    origin_points: &[Point2f],
    warped_points: &[Point2f],
) {
    debug_assert!(weight > 0.0);

    let partitions: SpatialMap<()> = SpatialMap::new(field.shape(), alignment);
    for (origin, warped) in origin_points.iter().zip(warped_points) {
        let motion = *origin - *warped;
        if let Some((col, row)) = partitions.try_key_of(*warped) {
            let stored_x = field.dx[[row, col]];
            let stored_y = field.dy[[row, col]];
            field.dx[[row, col]] = stored_x + weight * sign(motion.x - stored_x);
            field.dy[[row, col]] = stored_y + weight * sign(motion.y - stored_y);
        }
    }
}

/// Bilinear sample of a displacement plane at fractional grid coordinates,
/// clamped to the nearest edge point outside the grid.
pub(crate) fn sample_plane(plane: &Array2<f32>, y: f32, x: f32) -> f32 {
    let (rows, cols) = plane.dim();
    let x = x.clamp(0.0, (cols - 1) as f32);
    let y = y.clamp(0.0, (rows - 1) as f32);

    let c0 = x.floor() as usize;
    let r0 = y.floor() as usize;
    let c1 = (c0 + 1).min(cols - 1);
    let r1 = (r0 + 1).min(rows - 1);
    let fx = x - c0 as f32;
    let fy = y - r0 as f32;

    plane[[r0, c0]] * (1.0 - fx) * (1.0 - fy)
        + plane[[r0, c1]] * fx * (1.0 - fy)
        + plane[[r1, c0]] * (1.0 - fx) * fy
        + plane[[r1, c1]] * fx * fy
}

fn resize_plane(plane: &Array2<f32>, shape: (usize, usize)) -> Array2<f32> {
    let (rows, cols) = plane.dim();
    let (new_rows, new_cols) = shape;
    let row_scale = (rows - 1) as f32 / (new_rows - 1) as f32;
    let col_scale = (cols - 1) as f32 / (new_cols - 1) as f32;

    Array2::from_shape_fn(shape, |(r, c)| {
        sample_plane(plane, r as f32 * row_scale, c as f32 * col_scale)
    })
}

impl std::ops::AddAssign<&WarpField> for WarpField {
    fn add_assign(&mut self, other: &WarpField) {
        assert_eq!(self.shape(), other.shape(), "warp field shape mismatch");
        self.dx.zip_mut_with(&other.dx, |a, &b| *a += b);
        self.dy.zip_mut_with(&other.dy, |a, &b| *a += b);
    }
}

impl std::ops::SubAssign<&WarpField> for WarpField {
    fn sub_assign(&mut self, other: &WarpField) {
        assert_eq!(self.shape(), other.shape(), "warp field shape mismatch");
        self.dx.zip_mut_with(&other.dx, |a, &b| *a -= b);
        self.dy.zip_mut_with(&other.dy, |a, &b| *a -= b);
    }
}

impl std::ops::Add for &WarpField {
    type Output = WarpField;

    fn add(self, other: &WarpField) -> WarpField {
        let mut result = self.clone();
        result += other;
        result
    }
}

impl std::ops::Sub for &WarpField {
    type Output = WarpField;

    fn sub(self, other: &WarpField) -> WarpField {
        let mut result = self.clone();
        result -= other;
        result
    }
}

impl std::ops::Mul<f32> for &WarpField {
    type Output = WarpField;

    fn mul(self, scaling: f32) -> WarpField {
        let mut result = self.clone();
        result.dx.mapv_inplace(|v| v * scaling);
        result.dy.mapv_inplace(|v| v * scaling);
        result
    }
}

impl std::ops::MulAssign<f32> for WarpField {
    fn mul_assign(&mut self, scaling: f32) {
        self.dx.mapv_inplace(|v| v * scaling);
        self.dy.mapv_inplace(|v| v * scaling);
    }
}

impl std::ops::Div<f32> for &WarpField {
    type Output = WarpField;

    fn div(self, scaling: f32) -> WarpField {
        assert!(scaling != 0.0);
        let mut result = self.clone();
        result.dx.mapv_inplace(|v| v / scaling);
        result.dy.mapv_inplace(|v| v / scaling);
        result
    }
}

impl std::ops::DivAssign<f32> for WarpField {
    fn div_assign(&mut self, scaling: f32) {
        assert!(scaling != 0.0);
        self.dx.mapv_inplace(|v| v / scaling);
        self.dy.mapv_inplace(|v| v / scaling);
    }
}

/// Per-element product with another field of the same shape.
impl std::ops::Mul<&WarpField> for &WarpField {
    type Output = WarpField;

    fn mul(self, other: &WarpField) -> WarpField {
        assert_eq!(self.shape(), other.shape(), "warp field shape mismatch");
        let mut result = self.clone();
        result.dx.zip_mut_with(&other.dx, |a, &b| *a *= b);
        result.dy.zip_mut_with(&other.dy, |a, &b| *a *= b);
        result
    }
}
