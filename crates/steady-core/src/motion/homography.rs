use nalgebra::{DMatrix, Matrix3, SMatrix, SVector};

use crate::geometry::Point2f;

/// A 3x3 projective transform over frame coordinates.
#[derive(Clone, Copy, Debug)]
pub struct Homography {
    matrix: Matrix3<f64>,
}

impl Homography {
    pub fn identity() -> Self {
        Self {
            matrix: Matrix3::identity(),
        }
    }

    pub fn from_matrix(matrix: Matrix3<f64>) -> Self {
        Self { matrix }
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    /// Apply the transform to a point, with projective division.
    pub fn apply(&self, p: Point2f) -> Point2f {
        let x = p.x as f64;
        let y = p.y as f64;
        let m = &self.matrix;

        let w = m[(2, 0)] * x + m[(2, 1)] * y + m[(2, 2)];
        let w = if w.abs() < 1e-12 { 1e-12 } else { w };
        Point2f::new(
            ((m[(0, 0)] * x + m[(0, 1)] * y + m[(0, 2)]) / w) as f32,
            ((m[(1, 0)] * x + m[(1, 1)] * y + m[(1, 2)]) / w) as f32,
        )
    }

    pub fn try_invert(&self) -> Option<Homography> {
        self.matrix.try_inverse().map(Homography::from_matrix)
    }

    /// Squared reprojection error of a correspondence under this transform.
    pub fn sq_error(&self, from: Point2f, to: Point2f) -> f64 {
        let mapped = self.apply(from);
        let dx = (mapped.x - to.x) as f64;
        let dy = (mapped.y - to.y) as f64;
        dx * dx + dy * dy
    }

    /// Exact homography mapping four `from` points onto four `to` points.
    ///
    /// Solves the standard 8x8 linear system with `h33 = 1`. Returns `None`
    /// for degenerate (collinear) quads.
    pub fn from_quad(from: &[Point2f; 4], to: &[Point2f; 4]) -> Option<Homography> {
        let mut a = SMatrix::<f64, 8, 8>::zeros();
        let mut b = SVector::<f64, 8>::zeros();

        for i in 0..4 {
            let (x, y) = (from[i].x as f64, from[i].y as f64);
            let (u, v) = (to[i].x as f64, to[i].y as f64);

            a[(2 * i, 0)] = x;
            a[(2 * i, 1)] = y;
            a[(2 * i, 2)] = 1.0;
            a[(2 * i, 6)] = -x * u;
            a[(2 * i, 7)] = -y * u;
            b[2 * i] = u;

            a[(2 * i + 1, 3)] = x;
            a[(2 * i + 1, 4)] = y;
            a[(2 * i + 1, 5)] = 1.0;
            a[(2 * i + 1, 6)] = -x * v;
            a[(2 * i + 1, 7)] = -y * v;
            b[2 * i + 1] = v;
        }

        let h = a.lu().solve(&b)?;
        let warp = Homography::from_matrix(Matrix3::new(
            h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0,
        ));

        // Partial pivoting can still "solve" a degenerate quad; demand
        // that the result actually reproduces the correspondences.
        for (f, t) in from.iter().zip(to) {
            if warp.sq_error(*f, *t) > 1e-4 {
                return None;
            }
        }
        Some(warp)
    }

    /// Least-squares homography from `n >= 4` correspondences via the
    /// normalized direct linear transform.
    pub fn fit(from: &[Point2f], to: &[Point2f]) -> Option<Homography> {
        assert_eq!(from.len(), to.len());
        if from.len() < 4 {
            return None;
        }
        if from.len() == 4 {
            // The thin SVD of the 8x9 system drops the null vector; the
            // minimal case is exact anyway.
            let from4 = [from[0], from[1], from[2], from[3]];
            let to4 = [to[0], to[1], to[2], to[3]];
            return Homography::from_quad(&from4, &to4);
        }

        let (from_norm, t_from) = normalize(from);
        let (to_norm, t_to) = normalize(to);

        let n = from.len();
        let mut a = DMatrix::<f64>::zeros(2 * n, 9);
        for i in 0..n {
            let (x, y) = (from_norm[i].0, from_norm[i].1);
            let (u, v) = (to_norm[i].0, to_norm[i].1);

            a[(2 * i, 0)] = -x;
            a[(2 * i, 1)] = -y;
            a[(2 * i, 2)] = -1.0;
            a[(2 * i, 6)] = x * u;
            a[(2 * i, 7)] = y * u;
            a[(2 * i, 8)] = u;

            a[(2 * i + 1, 3)] = -x;
            a[(2 * i + 1, 4)] = -y;
            a[(2 * i + 1, 5)] = -1.0;
            a[(2 * i + 1, 6)] = x * v;
            a[(2 * i + 1, 7)] = y * v;
            a[(2 * i + 1, 8)] = v;
        }

        let svd = a.svd(false, true);
        let v_t = svd.v_t?;
        let h = v_t.row(v_t.nrows() - 1);

        let normalized = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);
        let denorm = t_to.try_inverse()? * normalized * t_from;
        if denorm[(2, 2)].abs() < 1e-12 {
            return None;
        }
        Some(Homography::from_matrix(denorm / denorm[(2, 2)]))
    }

    /// Least-squares 4-DOF partial affine transform (rotation, uniform
    /// scale, translation) from `n >= 2` correspondences, embedded as a
    /// homography.
    pub fn fit_partial_affine(from: &[Point2f], to: &[Point2f]) -> Option<Homography> {
        assert_eq!(from.len(), to.len());
        let n = from.len();
        if n < 2 {
            return None;
        }

        // Model: u = a*x - b*y + tx, v = b*x + a*y + ty. Normal equations
        // for (a, b, tx, ty) have a closed form after centring both sets.
        let inv_n = 1.0 / n as f64;
        let (mut cx, mut cy, mut cu, mut cv) = (0.0, 0.0, 0.0, 0.0);
        for i in 0..n {
            cx += from[i].x as f64;
            cy += from[i].y as f64;
            cu += to[i].x as f64;
            cv += to[i].y as f64;
        }
        cx *= inv_n;
        cy *= inv_n;
        cu *= inv_n;
        cv *= inv_n;

        let mut sxx = 0.0;
        let mut sxu = 0.0;
        let mut sxv = 0.0;
        let mut syu = 0.0;
        let mut syv = 0.0;
        for i in 0..n {
            let x = from[i].x as f64 - cx;
            let y = from[i].y as f64 - cy;
            let u = to[i].x as f64 - cu;
            let v = to[i].y as f64 - cv;
            sxx += x * x + y * y;
            sxu += x * u;
            sxv += x * v;
            syu += y * u;
            syv += y * v;
        }
        if sxx < 1e-12 {
            return None;
        }

        let a = (sxu + syv) / sxx;
        let b = (sxv - syu) / sxx;
        let tx = cu - a * cx + b * cy;
        let ty = cv - b * cx - a * cy;

        Some(Homography::from_matrix(Matrix3::new(
            a, -b, tx, b, a, ty, 0.0, 0.0, 1.0,
        )))
    }
}

/// Hartley normalization: translate to the centroid and scale so the mean
/// distance from the origin is sqrt(2).
fn normalize(points: &[Point2f]) -> (Vec<(f64, f64)>, Matrix3<f64>) {
    let n = points.len() as f64;
    let (mut cx, mut cy) = (0.0, 0.0);
    for p in points {
        cx += p.x as f64;
        cy += p.y as f64;
    }
    cx /= n;
    cy /= n;

    let mut mean_dist = 0.0;
    for p in points {
        let dx = p.x as f64 - cx;
        let dy = p.y as f64 - cy;
        mean_dist += (dx * dx + dy * dy).sqrt();
    }
    mean_dist /= n;
    let scale = if mean_dist > 1e-12 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };

    let normalized = points
        .iter()
        .map(|p| (scale * (p.x as f64 - cx), scale * (p.y as f64 - cy)))
        .collect();
    let transform = Matrix3::new(scale, 0.0, -scale * cx, 0.0, scale, -scale * cy, 0.0, 0.0, 1.0);
    (normalized, transform)
}
