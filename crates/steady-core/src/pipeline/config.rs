use serde::{Deserialize, Serialize};

use crate::consts::MINIMUM_FIELD_SHAPE;
use crate::detect::FeatureDetectorSettings;
use crate::error::{Result, StabilizationError};
use crate::path::PathSmootherSettings;
use crate::tracking::FrameTrackerSettings;

/// Complete configuration surface of the stabilization pipeline.
///
/// One flat struct supplied at construction and replaceable through
/// [`crate::pipeline::StabilizationPipeline::configure`]. The motion
/// resolution is linked into the tracker and smoother so every warp field
/// in the system shares one shape.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StabilizationSettings {
    /// Master switch. When off, frames pass through with the same delay
    /// and no tracking or smoothing runs.
    #[serde(default = "default_true")]
    pub stabilize_output: bool,
    /// Shape `(rows, cols)` of all motion fields. `(2, 2)` stabilizes with
    /// a single global homography per frame.
    #[serde(default = "default_motion_resolution")]
    pub motion_resolution: (usize, usize),
    /// Shape `(rows, cols)` at which corner detection and optical flow
    /// run.
    #[serde(default = "default_tracking_resolution")]
    pub tracking_resolution: (usize, usize),
    /// Look-ahead radius `r`; the pipeline delays output by `r + 1`
    /// frames.
    #[serde(default = "default_path_prediction_frames")]
    pub path_prediction_frames: usize,
    /// Fraction of each frame edge reserved for corrective motion.
    #[serde(default = "default_scene_margins")]
    pub scene_margins: f32,
    /// Tracking quality below which trust snaps to zero.
    #[serde(default = "default_min_tracking_quality")]
    pub min_tracking_quality: f64,
    /// Scene quality EMA below which trust decays toward zero.
    #[serde(default = "default_min_scene_quality")]
    pub min_scene_quality: f64,
    /// Crop emitted frames to the stable region inside the margins.
    #[serde(default)]
    pub crop_frame_to_margins: bool,
    /// Clamp corrections to the margins once drift saturates.
    #[serde(default = "default_true")]
    pub clamp_path_to_margins: bool,
    /// Force near-rigid output corrections.
    #[serde(default)]
    pub force_output_rigidity: bool,
    /// Deviation fraction kept by the rigidity filter.
    #[serde(default = "default_rigidity_tolerance")]
    pub rigidity_tolerance: f32,
    /// Fewest surviving matches required for motion estimation.
    #[serde(default = "default_minimum_tracking_points")]
    pub minimum_tracking_points: usize,
    /// Shape `(rows, cols)` of the independent FAST detection zones.
    #[serde(default = "default_detection_regions")]
    pub detection_regions: (usize, usize),
    /// Shape `(rows, cols)` of the corner suppression grid.
    #[serde(default = "default_feature_grid_shape")]
    pub feature_grid_shape: (usize, usize),
    /// Propagated-corner density below which zones re-detect.
    #[serde(default = "default_min_feature_density")]
    pub min_feature_density: f32,
    /// Target raw corner density per detection zone.
    #[serde(default = "default_max_feature_density")]
    pub max_feature_density: f32,
}

fn default_true() -> bool {
    true
}

fn default_motion_resolution() -> (usize, usize) {
    MINIMUM_FIELD_SHAPE
}

fn default_tracking_resolution() -> (usize, usize) {
    (360, 640)
}

fn default_path_prediction_frames() -> usize {
    10
}

fn default_scene_margins() -> f32 {
    0.1
}

fn default_min_tracking_quality() -> f64 {
    0.3
}

fn default_min_scene_quality() -> f64 {
    0.8
}

fn default_rigidity_tolerance() -> f32 {
    0.25
}

fn default_minimum_tracking_points() -> usize {
    40
}

fn default_detection_regions() -> (usize, usize) {
    (2, 2)
}

fn default_feature_grid_shape() -> (usize, usize) {
    (20, 20)
}

fn default_min_feature_density() -> f32 {
    0.1
}

fn default_max_feature_density() -> f32 {
    0.75
}

impl Default for StabilizationSettings {
    fn default() -> Self {
        Self {
            stabilize_output: true,
            motion_resolution: default_motion_resolution(),
            tracking_resolution: default_tracking_resolution(),
            path_prediction_frames: default_path_prediction_frames(),
            scene_margins: default_scene_margins(),
            min_tracking_quality: default_min_tracking_quality(),
            min_scene_quality: default_min_scene_quality(),
            crop_frame_to_margins: false,
            clamp_path_to_margins: true,
            force_output_rigidity: false,
            rigidity_tolerance: default_rigidity_tolerance(),
            minimum_tracking_points: default_minimum_tracking_points(),
            detection_regions: default_detection_regions(),
            feature_grid_shape: default_feature_grid_shape(),
            min_feature_density: default_min_feature_density(),
            max_feature_density: default_max_feature_density(),
        }
    }
}

impl StabilizationSettings {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.min_tracking_quality) {
            return Err(StabilizationError::InvalidConfiguration(
                "min_tracking_quality must lie in [0, 1]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_scene_quality) {
            return Err(StabilizationError::InvalidConfiguration(
                "min_scene_quality must lie in [0, 1]".into(),
            ));
        }
        self.tracker_settings().validate()?;
        self.smoother_settings().validate()
    }

    /// Tracker view of the configuration, with the motion resolution
    /// linked through.
    pub fn tracker_settings(&self) -> FrameTrackerSettings {
        FrameTrackerSettings {
            motion_resolution: self.motion_resolution,
            tracking_resolution: self.tracking_resolution,
            minimum_tracking_points: self.minimum_tracking_points,
            detector: FeatureDetectorSettings {
                detection_resolution: self.tracking_resolution,
                detection_regions: self.detection_regions,
                feature_grid_shape: self.feature_grid_shape,
                min_feature_density: self.min_feature_density,
                max_feature_density: self.max_feature_density,
                ..FeatureDetectorSettings::default()
            },
            ..FrameTrackerSettings::default()
        }
    }

    /// Smoother view of the configuration, with the motion resolution
    /// linked through.
    pub fn smoother_settings(&self) -> PathSmootherSettings {
        PathSmootherSettings {
            path_prediction_frames: self.path_prediction_frames,
            scene_margins: self.scene_margins,
            motion_resolution: self.motion_resolution,
            clamp_path_to_margins: self.clamp_path_to_margins,
            force_output_rigidity: self.force_output_rigidity,
            rigidity_tolerance: self.rigidity_tolerance,
            crop_frame_to_margins: self.crop_frame_to_margins,
        }
    }
}
