/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Smallest legal warp field shape. A 2x2 field is exactly a homography.
pub const MINIMUM_FIELD_SHAPE: (usize, usize) = (2, 2);

/// Initial FAST corner threshold for fresh detection zones.
pub const FAST_INITIAL_THRESHOLD: u8 = 70;

/// Lower bound of the adaptive FAST threshold.
pub const FAST_MIN_THRESHOLD: u8 = 10;

/// Upper bound of the adaptive FAST threshold.
pub const FAST_MAX_THRESHOLD: u8 = 250;

/// Step applied to a zone's FAST threshold when it over/under-shoots.
pub const FAST_THRESHOLD_STEP: u8 = 5;

/// Allowed deviation from the per-zone corner target before the
/// threshold is adjusted.
pub const FAST_FEATURE_TOLERANCE: usize = 50;

/// EMA factor for the tracker's stability and quality metrics.
pub const METRIC_SMOOTHING_FACTOR: f64 = 0.05;

/// Tracking-point distribution quality above which a full homography
/// is trusted for mesh estimation hints.
pub const GOOD_DISTRIBUTION_QUALITY: f64 = 0.6;

/// Smallest smoothing sigma of the adaptive path filter.
pub const MIN_FILTER_SIGMA: f64 = 3.0;

/// Largest smoothing sigma of the adaptive path filter.
pub const MAX_FILTER_SIGMA: f64 = 13.0;

/// EMA factor for the adaptive smoothing sigma.
pub const SIGMA_RESPONSE_RATE: f64 = 0.08;

/// EMA factor for the pipeline's scene quality estimate.
pub const QA_UPDATE_RATE: f64 = 0.05;

/// Per-frame step of the pipeline's trust factor.
pub const QA_BLEND_STEP: f64 = 0.05;

/// Side length of the square Lucas-Kanade matching window.
pub const LK_WINDOW_SIZE: usize = 7;

/// Pyramid levels used for sparse optical flow.
pub const LK_PYRAMID_LEVELS: usize = 3;

/// Iteration cap per pyramid level of the flow solver.
pub const LK_MAX_ITERATIONS: usize = 30;

/// Convergence epsilon (squared step length) of the flow solver.
pub const LK_EPSILON: f64 = 1e-4;

/// Coarse sub-grid used by the distribution quality metric.
pub const DISTRIBUTION_GRID_SHAPE: (usize, usize) = (5, 5);

/// Initial accumulation weight of the mesh motion fit.
pub const MESH_ACCUMULATION_WEIGHT: f32 = 0.8;

/// Small epsilon to avoid division by zero in floating-point comparisons.
pub const EPSILON: f32 = 1e-10;
