use ndarray::Array2;

use crate::geometry::{Point2f, Rect2f};

/// A detected corner with its detector response.
#[derive(Clone, Copy, Debug)]
pub struct KeyPoint {
    pub position: Point2f,
    pub response: f32,
    /// Carried over from the previous frame's tracked set rather than
    /// freshly detected. Propagated corners hold their suppression-grid
    /// cell against competing detections.
    pub propagated: bool,
}

/// Bresenham circle of radius 3 as (col, row) offsets, clockwise from
/// twelve o'clock.
const CIRCLE: [(isize, isize); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

/// Contiguous arc length required by the segment test.
const ARC_LENGTH: usize = 9;

/// FAST-9/16 segment-test corner detection within `bounds` of `image`.
///
/// A pixel is a corner when at least nine contiguous circle pixels are all
/// brighter than `centre + threshold` or all darker than
/// `centre - threshold`. The response is the total contrast of the circle
/// beyond the threshold. Detected corners are appended to `out` in image
/// coordinates.
pub fn detect_corners(image: &Array2<u8>, bounds: Rect2f, threshold: u8, out: &mut Vec<KeyPoint>) {
    let (h, w) = image.dim();
    if h < 7 || w < 7 {
        return;
    }

    let row_start = (bounds.y.max(0.0) as usize).max(3);
    let row_end = (((bounds.y + bounds.h) as usize).min(h)).saturating_sub(3);
    let col_start = (bounds.x.max(0.0) as usize).max(3);
    let col_end = (((bounds.x + bounds.w) as usize).min(w)).saturating_sub(3);

    let t = threshold as i16;
    for row in row_start..row_end {
        for col in col_start..col_end {
            let centre = image[[row, col]] as i16;
            let bright_limit = centre + t;
            let dark_limit = centre - t;

            let fetch = |i: usize| {
                let (dc, dr) = CIRCLE[i];
                image[[(row as isize + dr) as usize, (col as isize + dc) as usize]] as i16
            };

            // Cardinal pre-test: a 9-contiguous arc must cover at least
            // three of the four compass pixels.
            let mut bright_cardinals = 0;
            let mut dark_cardinals = 0;
            for i in [0, 4, 8, 12] {
                let value = fetch(i);
                if value > bright_limit {
                    bright_cardinals += 1;
                } else if value < dark_limit {
                    dark_cardinals += 1;
                }
            }
            if bright_cardinals < 3 && dark_cardinals < 3 {
                continue;
            }

            let mut circle = [0i16; 16];
            for (i, value) in circle.iter_mut().enumerate() {
                *value = fetch(i);
            }

            if !segment_test(&circle, bright_limit, dark_limit) {
                continue;
            }

            let mut response = 0i32;
            for &value in &circle {
                response += ((value - centre).abs() as i32 - t as i32).max(0);
            }

            out.push(KeyPoint {
                position: Point2f::new(col as f32, row as f32),
                response: response as f32,
                propagated: false,
            });
        }
    }
}

/// Look for a contiguous run of at least [`ARC_LENGTH`] circle pixels that
/// are all brighter than `bright_limit` or all darker than `dark_limit`.
fn segment_test(circle: &[i16; 16], bright_limit: i16, dark_limit: i16) -> bool {
    let mut bright_run = 0;
    let mut dark_run = 0;

    // Walk the circle twice to catch runs that wrap around.
    for i in 0..32 {
        let value = circle[i % 16];

        if value > bright_limit {
            bright_run += 1;
            if bright_run >= ARC_LENGTH {
                return true;
            }
        } else {
            bright_run = 0;
        }

        if value < dark_limit {
            dark_run += 1;
            if dark_run >= ARC_LENGTH {
                return true;
            }
        } else {
            dark_run = 0;
        }
    }

    false
}
