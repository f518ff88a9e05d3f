// Shared helpers; not every test binary uses every builder.
#![allow(dead_code)]

use ndarray::Array2;

use steady_core::frame::Frame;

/// Deterministic pseudo-random generator for reproducible test patterns.
pub struct TestRng(u64);

impl TestRng {
    pub fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    pub fn next_u32(&mut self) -> u32 {
        // xorshift64*
        let mut x = self.0;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.0 = x;
        (x.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 32) as u32
    }
}

/// A corner-rich blocky texture: constant-intensity cells with strong
/// contrast at every cell boundary. Values in [0, 1].
pub fn textured_pattern(shape: (usize, usize), block: usize, seed: u64) -> Array2<f32> {
    let mut rng = TestRng::new(seed);
    let (h, w) = shape;
    let blocks_w = w / block + 2;
    let blocks_h = h / block + 2;

    let values: Vec<f32> = (0..blocks_w * blocks_h)
        .map(|_| (rng.next_u32() % 256) as f32 / 255.0)
        .collect();

    Array2::from_shape_fn(shape, |(r, c)| {
        values[(r / block) * blocks_w + (c / block)]
    })
}

/// Uniform pseudo-random noise in [0, 1], a worst case for tracking.
pub fn noise_pattern(shape: (usize, usize), seed: u64) -> Array2<f32> {
    let mut rng = TestRng::new(seed);
    Array2::from_shape_fn(shape, |_| (rng.next_u32() % 256) as f32 / 255.0)
}

/// Sample `pattern` shifted so its content appears translated by
/// `(dx, dy)` pixels, with bilinear interpolation and a zero border.
pub fn translated(pattern: &Array2<f32>, dx: f32, dy: f32) -> Array2<f32> {
    let (h, w) = pattern.dim();
    Array2::from_shape_fn((h, w), |(r, c)| {
        bilinear_zero(pattern, r as f32 - dy, c as f32 - dx)
    })
}

pub fn bilinear_zero(data: &Array2<f32>, y: f32, x: f32) -> f32 {
    let (h, w) = data.dim();
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

/// Quantize a [0, 1] luminance plane to 8 bits.
pub fn to_u8(data: &Array2<f32>) -> Array2<u8> {
    data.mapv(|v| (v.clamp(0.0, 1.0) * 255.0) as u8)
}

/// Wrap a luminance plane into a frame with a synthetic 30 fps timestamp.
pub fn frame_at(data: Array2<f32>, index: usize) -> Frame {
    Frame::new(data, index as u64 * 33_333_333)
}

/// Mean absolute difference over the interior of two images, ignoring a
/// border of `margin` pixels where warps introduce fill.
pub fn interior_mad(a: &Array2<f32>, b: &Array2<f32>, margin: usize) -> f32 {
    let (h, w) = a.dim();
    assert_eq!(a.dim(), b.dim());
    assert!(h > 2 * margin && w > 2 * margin);

    let mut sum = 0.0f64;
    let mut count = 0usize;
    for r in margin..h - margin {
        for c in margin..w - margin {
            sum += (a[[r, c]] - b[[r, c]]).abs() as f64;
            count += 1;
        }
    }
    (sum / count as f64) as f32
}

/// Estimate the horizontal displacement of `image` relative to `pattern`
/// by dense search over integer shifts in `[-range, range]`.
pub fn estimate_x_shift(pattern: &Array2<f32>, image: &Array2<f32>, range: isize) -> isize {
    let (h, w) = pattern.dim();
    let margin = range.unsigned_abs() + 2;

    let mut best_shift = 0;
    let mut best_cost = f64::INFINITY;
    for shift in -range..=range {
        let mut cost = 0.0f64;
        for r in margin..h - margin {
            for c in margin..w - margin {
                let pc = (c as isize - shift) as usize;
                cost += (image[[r, c]] - pattern[[r, pc]]).abs() as f64;
            }
        }
        if cost < best_cost {
            best_cost = cost;
            best_shift = shift;
        }
    }
    best_shift
}
