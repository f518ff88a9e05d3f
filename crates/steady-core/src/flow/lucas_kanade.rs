use ndarray::Array2;

use crate::consts::{LK_EPSILON, LK_MAX_ITERATIONS, LK_WINDOW_SIZE};
use crate::geometry::Point2f;

use super::Pyramid;

/// Per-point result of sparse optical flow.
#[derive(Clone, Copy, Debug)]
pub struct FlowStatus {
    /// Matched position in the next image.
    pub point: Point2f,
    /// Whether the solver converged inside the image bounds.
    pub tracked: bool,
    /// Mean absolute residual of the final matching window (0..255 scale).
    pub error: f32,
}

/// Sparse iterative Lucas-Kanade optical flow over image pyramids.
///
/// Each point is tracked coarse-to-fine: the displacement found at a
/// coarser level is doubled and used as the starting guess at the next.
/// Points whose spatial gradient matrix is near-singular, or whose match
/// window leaves the image, are flagged as untracked.
pub fn track_points(prev: &Pyramid, next: &Pyramid, points: &[Point2f]) -> Vec<FlowStatus> {
    let depth = prev.depth().min(next.depth());
    points
        .iter()
        .map(|&point| track_single(prev, next, point, depth))
        .collect()
}

fn track_single(prev: &Pyramid, next: &Pyramid, point: Point2f, depth: usize) -> FlowStatus {
    let mut flow = Point2f::new(0.0, 0.0);
    let mut error = f32::MAX;

    for level in (0..depth).rev() {
        let prev_img = prev.level(level);
        let next_img = next.level(level);
        let scale = (1 << level) as f32;
        let base = Point2f::new(point.x / scale, point.y / scale);

        flow = flow * 2.0;

        match refine_at_level(prev_img, next_img, base, flow) {
            Some((refined, residual)) => {
                flow = refined;
                error = residual;
            }
            None => {
                return FlowStatus {
                    point,
                    tracked: false,
                    error: f32::MAX,
                };
            }
        }
    }

    FlowStatus {
        point: point + flow,
        tracked: true,
        error,
    }
}

/// One level of the iterative solver. Returns the refined flow and the
/// final mean absolute window residual, or `None` on failure.
fn refine_at_level(
    prev: &Array2<f32>,
    next: &Array2<f32>,
    base: Point2f,
    initial_flow: Point2f,
) -> Option<(Point2f, f32)> {
    const RADIUS: isize = (LK_WINDOW_SIZE as isize - 1) / 2;
    const WINDOW_AREA: f32 = (LK_WINDOW_SIZE * LK_WINDOW_SIZE) as f32;

    if !window_in_bounds(prev, base) {
        return None;
    }

    // Template window and spatial gradients, sampled once per level.
    let mut template = [0.0f32; LK_WINDOW_SIZE * LK_WINDOW_SIZE];
    let mut grad_x = [0.0f32; LK_WINDOW_SIZE * LK_WINDOW_SIZE];
    let mut grad_y = [0.0f32; LK_WINDOW_SIZE * LK_WINDOW_SIZE];

    let mut gxx = 0.0f64;
    let mut gxy = 0.0f64;
    let mut gyy = 0.0f64;

    let mut i = 0;
    for dr in -RADIUS..=RADIUS {
        for dc in -RADIUS..=RADIUS {
            let x = base.x + dc as f32;
            let y = base.y + dr as f32;
            template[i] = sample_clamped(prev, y, x);
            let gx = (sample_clamped(prev, y, x + 1.0) - sample_clamped(prev, y, x - 1.0)) * 0.5;
            let gy = (sample_clamped(prev, y + 1.0, x) - sample_clamped(prev, y - 1.0, x)) * 0.5;
            grad_x[i] = gx;
            grad_y[i] = gy;
            gxx += (gx * gx) as f64;
            gxy += (gx * gy) as f64;
            gyy += (gy * gy) as f64;
            i += 1;
        }
    }

    // Reject structureless windows: the normal matrix must be well
    // conditioned for the 2x2 solve to mean anything.
    let det = gxx * gyy - gxy * gxy;
    let min_eigenvalue = ((gxx + gyy) - ((gxx - gyy).powi(2) + 4.0 * gxy * gxy).sqrt()) / 2.0;
    if det.abs() < 1e-6 || min_eigenvalue < 1e-2 {
        return None;
    }

    let mut flow = initial_flow;
    let mut residual = f32::MAX;

    for _ in 0..LK_MAX_ITERATIONS {
        let target = base + flow;
        if !window_in_bounds(next, target) {
            return None;
        }

        let mut bx = 0.0f64;
        let mut by = 0.0f64;
        let mut abs_sum = 0.0f32;

        let mut i = 0;
        for dr in -RADIUS..=RADIUS {
            for dc in -RADIUS..=RADIUS {
                let diff =
                    template[i] - sample_clamped(next, target.y + dr as f32, target.x + dc as f32);
                bx += (diff * grad_x[i]) as f64;
                by += (diff * grad_y[i]) as f64;
                abs_sum += diff.abs();
                i += 1;
            }
        }
        residual = abs_sum / WINDOW_AREA;

        let step_x = (gyy * bx - gxy * by) / det;
        let step_y = (gxx * by - gxy * bx) / det;
        flow.x += step_x as f32;
        flow.y += step_y as f32;

        if step_x * step_x + step_y * step_y < LK_EPSILON {
            break;
        }
    }

    Some((flow, residual))
}

fn window_in_bounds(image: &Array2<f32>, centre: Point2f) -> bool {
    const MARGIN: f32 = ((LK_WINDOW_SIZE as isize - 1) / 2) as f32 + 2.0;
    let (h, w) = image.dim();
    centre.x >= MARGIN
        && centre.y >= MARGIN
        && centre.x < w as f32 - MARGIN
        && centre.y < h as f32 - MARGIN
}

/// Bilinear sample clamped to the image edges.
fn sample_clamped(data: &Array2<f32>, y: f32, x: f32) -> f32 {
    let (h, w) = data.dim();
    let x = x.clamp(0.0, (w - 1) as f32);
    let y = y.clamp(0.0, (h - 1) as f32);

    let c0 = x.floor() as usize;
    let r0 = y.floor() as usize;
    let c1 = (c0 + 1).min(w - 1);
    let r1 = (r0 + 1).min(h - 1);
    let fx = x - c0 as f32;
    let fy = y - r0 as f32;

    data[[r0, c0]] * (1.0 - fx) * (1.0 - fy)
        + data[[r0, c1]] * fx * (1.0 - fy)
        + data[[r1, c0]] * (1.0 - fx) * fy
        + data[[r1, c1]] * fx * fy
}
