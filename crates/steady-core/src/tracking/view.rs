use ndarray::Array2;
use rayon::prelude::*;

use crate::consts::PARALLEL_PIXEL_THRESHOLD;

/// 3x3 sharpening kernel applied after downsampling to counteract the
/// loss of high-frequency detail that corner detection depends on.
const SHARPEN_KERNEL: [[f32; 3]; 3] = [[0.0, -0.5, 0.0], [-0.5, 3.0, -0.5], [0.0, -0.5, 0.0]];

/// Convert a luminance plane into an 8-bit tracking view: area-resample to
/// `resolution` = `(rows, cols)`, sharpen, and quantize.
pub fn tracking_view(luma: &Array2<f32>, resolution: (usize, usize)) -> Array2<u8> {
    let resized = resize_area(luma, resolution);
    let sharpened = sharpen(&resized);
    sharpened.mapv(|v| (v.clamp(0.0, 1.0) * 255.0) as u8)
}

/// Box-average resampling: each destination pixel averages the source
/// pixels its footprint covers. Behaves like area interpolation for
/// downscales and nearest-neighbour-with-averaging for upscales.
fn resize_area(data: &Array2<f32>, resolution: (usize, usize)) -> Array2<f32> {
    let (src_h, src_w) = data.dim();
    let (dst_h, dst_w) = resolution;
    if (src_h, src_w) == resolution {
        return data.clone();
    }

    let scale_y = src_h as f32 / dst_h as f32;
    let scale_x = src_w as f32 / dst_w as f32;

    let average_row = |r: usize| -> Vec<f32> {
        let y0 = (r as f32 * scale_y) as usize;
        let y1 = (((r + 1) as f32 * scale_y).ceil() as usize).clamp(y0 + 1, src_h);
        (0..dst_w)
            .map(|c| {
                let x0 = (c as f32 * scale_x) as usize;
                let x1 = (((c + 1) as f32 * scale_x).ceil() as usize).clamp(x0 + 1, src_w);
                let mut sum = 0.0f64;
                for y in y0..y1 {
                    for x in x0..x1 {
                        sum += data[[y, x]] as f64;
                    }
                }
                (sum / ((y1 - y0) * (x1 - x0)) as f64) as f32
            })
            .collect()
    };

    let rows: Vec<Vec<f32>> = if src_h * src_w >= PARALLEL_PIXEL_THRESHOLD {
        (0..dst_h).into_par_iter().map(average_row).collect()
    } else {
        (0..dst_h).map(average_row).collect()
    };

    let mut result = Array2::<f32>::zeros(resolution);
    for (r, row) in rows.into_iter().enumerate() {
        for (c, value) in row.into_iter().enumerate() {
            result[[r, c]] = value;
        }
    }
    result
}

fn sharpen(data: &Array2<f32>) -> Array2<f32> {
    let (h, w) = data.dim();
    Array2::from_shape_fn((h, w), |(r, c)| {
        let mut sum = 0.0;
        for (kr, kernel_row) in SHARPEN_KERNEL.iter().enumerate() {
            for (kc, &kv) in kernel_row.iter().enumerate() {
                if kv == 0.0 {
                    continue;
                }
                let rr = (r as isize + kr as isize - 1).clamp(0, h as isize - 1) as usize;
                let cc = (c as isize + kc as isize - 1).clamp(0, w as isize - 1) as usize;
                sum += data[[rr, cc]] * kv;
            }
        }
        sum
    })
}
