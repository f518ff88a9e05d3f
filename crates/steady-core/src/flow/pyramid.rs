use ndarray::Array2;

/// Binomial 1D kernel [1, 4, 6, 4, 1] / 16 used to smooth before decimation.
const BINOMIAL_KERNEL: [f32; 5] = [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];

/// Smallest pyramid level dimension worth tracking on.
const MIN_LEVEL_DIMENSION: usize = 16;

/// A coarse-to-fine image pyramid for sparse optical flow.
///
/// Level 0 is the input image converted to f32 (0..255 range); each
/// further level is smoothed and decimated by 2x.
#[derive(Clone, Debug)]
pub struct Pyramid {
    levels: Vec<Array2<f32>>,
}

impl Pyramid {
    pub fn build(image: &Array2<u8>, max_levels: usize) -> Self {
        let mut levels = Vec::with_capacity(max_levels + 1);
        levels.push(image.mapv(|v| v as f32));

        for _ in 0..max_levels {
            let current = levels.last().expect("pyramid has a base level");
            let (h, w) = current.dim();
            if h / 2 < MIN_LEVEL_DIMENSION || w / 2 < MIN_LEVEL_DIMENSION {
                break;
            }
            let blurred = convolve_cols(&convolve_rows(current));
            levels.push(downsample_2x(&blurred));
        }

        Self { levels }
    }

    /// Number of levels, including the base image.
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, index: usize) -> &Array2<f32> {
        &self.levels[index]
    }
}

fn convolve_rows(data: &Array2<f32>) -> Array2<f32> {
    let (h, w) = data.dim();
    let mut result = Array2::<f32>::zeros((h, w));
    for row in 0..h {
        for col in 0..w {
            let mut sum = 0.0;
            for (k, &kv) in BINOMIAL_KERNEL.iter().enumerate() {
                let src = (col as isize + k as isize - 2).clamp(0, w as isize - 1) as usize;
                sum += data[[row, src]] * kv;
            }
            result[[row, col]] = sum;
        }
    }
    result
}

fn convolve_cols(data: &Array2<f32>) -> Array2<f32> {
    let (h, w) = data.dim();
    let mut result = Array2::<f32>::zeros((h, w));
    for row in 0..h {
        for col in 0..w {
            let mut sum = 0.0;
            for (k, &kv) in BINOMIAL_KERNEL.iter().enumerate() {
                let src = (row as isize + k as isize - 2).clamp(0, h as isize - 1) as usize;
                sum += data[[src, col]] * kv;
            }
            result[[row, col]] = sum;
        }
    }
    result
}

/// Decimate by taking every other pixel.
fn downsample_2x(data: &Array2<f32>) -> Array2<f32> {
    let (h, w) = data.dim();
    let new_h = h / 2;
    let new_w = w / 2;
    let mut result = Array2::<f32>::zeros((new_h, new_w));
    for r in 0..new_h {
        for c in 0..new_w {
            result[[r, c]] = data[[r * 2, c * 2]];
        }
    }
    result
}
