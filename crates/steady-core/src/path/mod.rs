use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::consts::{
    MAX_FILTER_SIGMA, MINIMUM_FIELD_SHAPE, MIN_FILTER_SIGMA, SIGMA_RESPONSE_RATE,
};
use crate::data::StreamBuffer;
use crate::error::{Result, StabilizationError};
use crate::geometry::{exp_moving_average, gaussian_kernel_1d, Rect2f};
use crate::warp::WarpField;

/// Tuning for the predictive path filter.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PathSmootherSettings {
    /// Look-ahead radius `r`; the output is delayed by `r + 1` frames.
    #[serde(default = "default_path_prediction_frames")]
    pub path_prediction_frames: usize,
    /// Fraction of each frame edge reserved as corrective budget.
    #[serde(default = "default_scene_margins")]
    pub scene_margins: f32,
    /// Shape `(rows, cols)` of the path's warp fields.
    #[serde(default = "default_motion_resolution")]
    pub motion_resolution: (usize, usize),
    /// Clamp corrections to the margins once the drift saturates.
    #[serde(default = "default_true")]
    pub clamp_path_to_margins: bool,
    /// Pull correction vectors toward their mean for extra rigidity.
    #[serde(default)]
    pub force_output_rigidity: bool,
    /// Deviation fraction kept by the rigidity filter.
    #[serde(default = "default_rigidity_tolerance")]
    pub rigidity_tolerance: f32,
    /// Fold the margin crop into the emitted corrections.
    #[serde(default)]
    pub crop_frame_to_margins: bool,
}

fn default_path_prediction_frames() -> usize {
    10
}

fn default_scene_margins() -> f32 {
    0.1
}

fn default_motion_resolution() -> (usize, usize) {
    MINIMUM_FIELD_SHAPE
}

fn default_rigidity_tolerance() -> f32 {
    0.25
}

fn default_true() -> bool {
    true
}

impl Default for PathSmootherSettings {
    fn default() -> Self {
        Self {
            path_prediction_frames: default_path_prediction_frames(),
            scene_margins: default_scene_margins(),
            motion_resolution: default_motion_resolution(),
            clamp_path_to_margins: default_true(),
            force_output_rigidity: false,
            rigidity_tolerance: default_rigidity_tolerance(),
            crop_frame_to_margins: false,
        }
    }
}

impl PathSmootherSettings {
    pub fn validate(&self) -> Result<()> {
        if self.path_prediction_frames == 0 {
            return Err(StabilizationError::InvalidConfiguration(
                "path_prediction_frames must be at least 1".into(),
            ));
        }
        if !(0.0..0.5).contains(&self.scene_margins) {
            return Err(StabilizationError::InvalidConfiguration(
                "scene_margins must lie in [0, 0.5)".into(),
            ));
        }
        if self.motion_resolution.0 < 2 || self.motion_resolution.1 < 2 {
            return Err(StabilizationError::InvalidConfiguration(
                "motion_resolution must be at least 2x2".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.rigidity_tolerance) {
            return Err(StabilizationError::InvalidConfiguration(
                "rigidity_tolerance must lie in [0, 1]".into(),
            ));
        }
        Ok(())
    }
}

/// Smooths an accumulated camera path with bounded look-ahead.
///
/// The path is a window of `2r + 1` accumulated warp fields centred on the
/// frame being corrected. A window-length Gaussian kernel produces the
/// smoothed trace; its sigma adapts to how far the trace has drifted from
/// the true path so corrections never leave the scene margins. Each call
/// returns the correction for the previous call's frame, which together
/// with the caller's one-frame queue realizes the `r + 1` output delay.
pub struct PathSmoother {
    settings: PathSmootherSettings,
    path: StreamBuffer<WarpField>,
    trace: WarpField,
    sigma: f64,
    pending: Option<WarpField>,
}

impl PathSmoother {
    pub fn new(settings: PathSmootherSettings) -> Result<Self> {
        settings.validate()?;

        let window = 2 * settings.path_prediction_frames + 1;
        let mut smoother = Self {
            trace: WarpField::new(settings.motion_resolution),
            path: StreamBuffer::new(window),
            sigma: MAX_FILTER_SIGMA,
            pending: None,
            settings,
        };
        smoother.fill_path();
        Ok(smoother)
    }

    pub fn configure(&mut self, settings: PathSmootherSettings) -> Result<()> {
        settings.validate()?;

        let new_window = 2 * settings.path_prediction_frames + 1;
        if new_window != self.path.capacity() {
            // Rebuild the window around the existing path: drop the oldest
            // positions when shrinking, pad the front with copies of the
            // oldest when growing, so the centre keeps moving forward in
            // time.
            let mut elements: Vec<WarpField> = self.path.iter().cloned().collect();
            if elements.len() > new_window {
                elements.drain(..elements.len() - new_window);
            } else if let Some(oldest) = elements.first().cloned() {
                let padding = new_window - elements.len();
                for _ in 0..padding {
                    elements.insert(0, oldest.clone());
                }
            }

            self.path = StreamBuffer::new(new_window);
            for element in elements {
                self.path.push(element);
            }
        }

        self.settings = settings;
        if self.path.is_empty() {
            self.fill_path();
        }
        Ok(())
    }

    pub fn settings(&self) -> &PathSmootherSettings {
        &self.settings
    }

    /// Output delay contributed by this smoother: `r` from window
    /// centering plus one from the correction hand-off.
    pub fn frame_delay(&self) -> usize {
        self.settings.path_prediction_frames + 1
    }

    /// The smoothed path position most recently emitted.
    pub fn position(&self) -> &WarpField {
        self.path.centre()
    }

    /// The displayable region of a frame after margins are reserved.
    pub fn scene_margins(&self, frame_shape: (usize, usize)) -> Rect2f {
        Rect2f::of_frame(frame_shape).shrink_by_margin(self.settings.scene_margins)
    }

    /// Warp that crops a frame to its scene margins and rescales it back
    /// to full size.
    pub fn scene_crop(&self, frame_shape: (usize, usize)) -> WarpField {
        let mut crop = WarpField::new(self.settings.motion_resolution);
        crop.crop_in(self.scene_margins(frame_shape), frame_shape);
        crop
    }

    /// Advance the path by `motion` and return the correction for the
    /// frame delayed by [`PathSmoother::frame_delay`]. Returns `None`
    /// until the hand-off slot has filled.
    pub fn next(&mut self, motion: &WarpField, frame_shape: (usize, usize)) -> Result<Option<WarpField>> {
        // Adopt a new motion resolution on the fly by resampling history.
        if motion.shape() != self.trace.shape() {
            self.resize_fields(motion.shape());
        }

        let position = self.path.newest() + motion;
        self.path.push(position);

        let margins = self.scene_margins(frame_shape);
        let limits = (margins.x, margins.y);

        // Drift of the last trace from the current path position, as a
        // fraction of the corrective limits. 1.0 means the correction
        // would push content out of frame.
        let current = self.path.centre().clone();
        let max_drift = max_normalized_drift(&self.trace, &current, limits).min(1.0);

        // Close the feedback loop: drifting toward the limits lowers the
        // smoothing so the trace returns to the path; a settled trace
        // raises it for maximum stability.
        self.sigma = exp_moving_average(
            self.sigma,
            MIN_FILTER_SIGMA + (MAX_FILTER_SIGMA - MIN_FILTER_SIGMA) * (1.0 - max_drift),
            SIGMA_RESPONSE_RATE,
        );
        trace!(sigma = self.sigma, max_drift, "path filter update");

        let kernel = gaussian_kernel_1d(self.path.capacity(), self.sigma);
        self.trace = self.path.convolve(&kernel);

        let mut correction = &self.trace - &current;

        if self.settings.clamp_path_to_margins && max_drift >= 1.0 {
            correction.clamp(limits);
        }
        if self.settings.force_output_rigidity {
            correction.undistort(self.settings.rigidity_tolerance);
        }
        if self.settings.crop_frame_to_margins {
            correction.crop_in(margins, frame_shape);
        }

        Ok(std::mem::replace(&mut self.pending, Some(correction)))
    }

    /// Reset to the initial state: an identity path and no pending
    /// correction.
    pub fn restart(&mut self) {
        self.path.clear();
        self.fill_path();
        self.trace = WarpField::new(self.settings.motion_resolution);
        self.sigma = MAX_FILTER_SIGMA;
        self.pending = None;
    }

    fn fill_path(&mut self) {
        // Pre-fill with identity so the newest element is always defined
        // and warm-up needs no special casing.
        while !self.path.is_full() {
            self.path.push(WarpField::new(self.settings.motion_resolution));
        }
    }

    fn resize_fields(&mut self, shape: (usize, usize)) {
        self.trace.resize(shape);
        if let Some(pending) = self.pending.as_mut() {
            pending.resize(shape);
        }
        for i in 0..self.path.size() {
            self.path.at_mut(i).resize(shape);
        }
        self.settings.motion_resolution = shape;
    }
}

/// Largest per-component deviation between two fields, normalized by the
/// per-axis corrective limits.
fn max_normalized_drift(trace: &WarpField, current: &WarpField, limits: (f32, f32)) -> f64 {
    let lx = limits.0.max(crate::consts::EPSILON) as f64;
    let ly = limits.1.max(crate::consts::EPSILON) as f64;

    let mut max_drift = 0.0f64;
    for (t, c) in trace.dx().iter().zip(current.dx().iter()) {
        max_drift = max_drift.max(((t - c).abs() as f64) / lx);
    }
    for (t, c) in trace.dy().iter().zip(current.dy().iter()) {
        max_drift = max_drift.max(((t - c).abs() as f64) / ly);
    }
    max_drift
}
