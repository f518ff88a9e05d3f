pub mod view;

use ndarray::Array2;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::consts::{
    GOOD_DISTRIBUTION_QUALITY, LK_PYRAMID_LEVELS, METRIC_SMOOTHING_FACTOR, MINIMUM_FIELD_SHAPE,
};
use crate::detect::{FeatureDetector, FeatureDetectorSettings, KeyPoint};
use crate::error::{Result, StabilizationError};
use crate::flow::{track_points, Pyramid};
use crate::frame::Frame;
use crate::geometry::{exp_moving_average, Point2f, Rect2f};
use crate::motion::{estimate_homography, EstimationProfile, Homography};
use crate::warp::WarpField;

use view::tracking_view;

/// Tuning for per-frame motion estimation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FrameTrackerSettings {
    /// Shape `(rows, cols)` of the estimated motion field. `(2, 2)` tracks
    /// a single global homography.
    #[serde(default = "default_motion_resolution")]
    pub motion_resolution: (usize, usize),
    /// Shape `(rows, cols)` at which detection and optical flow run.
    #[serde(default = "default_tracking_resolution")]
    pub tracking_resolution: (usize, usize),
    /// Fewest surviving matches required to attempt motion estimation.
    #[serde(default = "default_minimum_tracking_points")]
    pub minimum_tracking_points: usize,
    /// Drop matches whose flow residual exceeds this (0..255 scale).
    /// `None` disables the filter.
    #[serde(default = "default_max_tracking_error")]
    pub max_tracking_error: Option<f32>,
    #[serde(default)]
    pub detector: FeatureDetectorSettings,
}

fn default_motion_resolution() -> (usize, usize) {
    MINIMUM_FIELD_SHAPE
}

fn default_tracking_resolution() -> (usize, usize) {
    (360, 640)
}

fn default_minimum_tracking_points() -> usize {
    40
}

fn default_max_tracking_error() -> Option<f32> {
    Some(30.0)
}

impl Default for FrameTrackerSettings {
    fn default() -> Self {
        Self {
            motion_resolution: default_motion_resolution(),
            tracking_resolution: default_tracking_resolution(),
            minimum_tracking_points: default_minimum_tracking_points(),
            max_tracking_error: default_max_tracking_error(),
            detector: FeatureDetectorSettings::default(),
        }
    }
}

impl FrameTrackerSettings {
    pub fn validate(&self) -> Result<()> {
        if self.motion_resolution.0 < 2 || self.motion_resolution.1 < 2 {
            return Err(StabilizationError::InvalidConfiguration(
                "motion_resolution must be at least 2x2".into(),
            ));
        }
        if self.minimum_tracking_points < 4 {
            return Err(StabilizationError::InvalidConfiguration(
                "minimum_tracking_points must be at least 4".into(),
            ));
        }
        let mut detector = self.detector.clone();
        detector.detection_resolution = self.tracking_resolution;
        detector.validate()
    }
}

/// Estimates the inter-frame motion of a video stream.
///
/// Each call to [`FrameTracker::track`] matches corners between the
/// previous and current tracking views and fits either a global
/// homography (2x2 motion resolution) or a dense motion mesh. Failures to
/// track are reported as `None` and leave the tracker hot for the next
/// frame.
pub struct FrameTracker {
    settings: FrameTrackerSettings,
    detector: FeatureDetector,
    prev_view: Array2<u8>,
    first_frame: bool,
    keypoints: Vec<KeyPoint>,
    tracked_points: Vec<Point2f>,
    matched_points: Vec<Point2f>,
    inlier_status: Vec<bool>,
    frame_stability: f64,
    distribution_quality: f64,
    tracking_stability: f64,
    rng: SmallRng,
}

/// Fixed RNG seed so identical input streams estimate identical motion.
const ESTIMATION_SEED: u64 = 0x5744_F00D;

impl FrameTracker {
    pub fn new(settings: FrameTrackerSettings) -> Result<Self> {
        settings.validate()?;

        let mut detector_settings = settings.detector.clone();
        detector_settings.detection_resolution = settings.tracking_resolution;
        let detector = FeatureDetector::new(detector_settings)?;
        let capacity = detector.max_feature_capacity();

        Ok(Self {
            settings,
            detector,
            prev_view: Array2::zeros((1, 1)),
            first_frame: true,
            keypoints: Vec::with_capacity(capacity),
            tracked_points: Vec::with_capacity(capacity),
            matched_points: Vec::with_capacity(capacity),
            inlier_status: Vec::with_capacity(capacity),
            frame_stability: 0.0,
            distribution_quality: 0.0,
            tracking_stability: 0.0,
            rng: SmallRng::seed_from_u64(ESTIMATION_SEED),
        })
    }

    pub fn configure(&mut self, settings: FrameTrackerSettings) -> Result<()> {
        settings.validate()?;

        let mut detector_settings = settings.detector.clone();
        detector_settings.detection_resolution = settings.tracking_resolution;
        self.detector.configure(detector_settings)?;
        self.settings = settings;
        Ok(())
    }

    pub fn settings(&self) -> &FrameTrackerSettings {
        &self.settings
    }

    /// EMA of the inlier fraction, in [0, 1].
    pub fn frame_stability(&self) -> f64 {
        self.frame_stability
    }

    /// EMA of the tracking-point distribution quality, in [0, 1].
    pub fn tracking_quality(&self) -> f64 {
        self.distribution_quality
    }

    /// Instantaneous quality of the last [`FrameTracker::track`] call:
    /// the frame's corner distribution quality, or zero when tracking
    /// underflowed. Collapses within a single frame on a scene cut.
    pub fn tracking_stability(&self) -> f64 {
        self.tracking_stability
    }

    pub fn motion_resolution(&self) -> (usize, usize) {
        self.settings.motion_resolution
    }

    pub fn tracking_resolution(&self) -> (usize, usize) {
        self.settings.tracking_resolution
    }

    /// Forget the previous frame and all propagated detector state.
    pub fn restart(&mut self) {
        self.first_frame = true;
        self.frame_stability = 0.0;
        self.distribution_quality = 0.0;
        self.tracking_stability = 0.0;
        self.detector.reset();
        self.rng = SmallRng::seed_from_u64(ESTIMATION_SEED);
    }

    /// Estimate the warp mapping the current frame back onto the previous
    /// one. Returns `None` while cold or when too few matches survive;
    /// the caller treats that as identity motion with zero trust.
    pub fn track(&mut self, frame: &Frame) -> Result<Option<WarpField>> {
        let (h, w) = frame.shape();
        if h == 0 || w == 0 {
            return Err(StabilizationError::InvalidInput(
                "cannot track an empty frame".into(),
            ));
        }

        let next_view = tracking_view(&frame.data, self.settings.tracking_resolution);
        let prev_view = std::mem::replace(&mut self.prev_view, next_view);

        // Pessimistic until this frame proves trackable.
        self.tracking_stability = 0.0;

        if self.first_frame {
            self.first_frame = false;
            return Ok(None);
        }

        // Detect in the previous view; this also returns every corner
        // propagated from the last tracked frame.
        self.keypoints.clear();
        self.detector.detect(&prev_view, &mut self.keypoints)?;
        if self.keypoints.len() < self.settings.minimum_tracking_points {
            debug!(
                corners = self.keypoints.len(),
                "tracking underflow at detection"
            );
            return Ok(None);
        }

        self.distribution_quality = exp_moving_average(
            self.distribution_quality,
            self.detector.distribution_quality(),
            METRIC_SMOOTHING_FACTOR,
        );

        // Match into the current view with pyramidal LK.
        self.tracked_points.clear();
        self.tracked_points
            .extend(self.keypoints.iter().map(|k| k.position));

        let prev_pyramid = Pyramid::build(&prev_view, LK_PYRAMID_LEVELS);
        let next_pyramid = Pyramid::build(&self.prev_view, LK_PYRAMID_LEVELS);
        let flow = track_points(&prev_pyramid, &next_pyramid, &self.tracked_points);

        let max_error = self.settings.max_tracking_error.unwrap_or(f32::MAX);
        let mut retained = 0;
        self.matched_points.clear();
        for (i, status) in flow.iter().enumerate() {
            if status.tracked && status.error <= max_error {
                let source = self.keypoints[i];
                self.keypoints[retained] = KeyPoint {
                    position: status.point,
                    ..source
                };
                self.tracked_points[retained] = self.tracked_points[i];
                self.matched_points.push(status.point);
                retained += 1;
            }
        }
        self.keypoints.truncate(retained);
        self.tracked_points.truncate(retained);

        if self.matched_points.len() < self.settings.minimum_tracking_points {
            debug!(
                matches = self.matched_points.len(),
                "tracking underflow at optical flow"
            );
            return Ok(None);
        }

        // Robust global motion. A poorly distributed point set forces the
        // partial-affine model so dominant local motion cannot masquerade
        // as projective distortion.
        let profile = if self.settings.motion_resolution == MINIMUM_FIELD_SHAPE {
            EstimationProfile::Strict
        } else {
            EstimationProfile::Loose
        };
        let partial_affine = self.distribution_quality < GOOD_DISTRIBUTION_QUALITY;

        let Some(global_motion) = estimate_homography(
            &self.tracked_points,
            &self.matched_points,
            profile,
            partial_affine,
            &mut self.rng,
            &mut self.inlier_status,
        ) else {
            return Ok(None);
        };

        // Keep inliers only; propagated corners must agree with the
        // consensus motion so outliers age out of the tracked set.
        let total_points = self.tracked_points.len();
        let mut retained = 0;
        for i in 0..total_points {
            if self.inlier_status[i] {
                self.keypoints[retained] = self.keypoints[i];
                self.tracked_points[retained] = self.tracked_points[i];
                self.matched_points[retained] = self.matched_points[i];
                retained += 1;
            }
        }
        self.keypoints.truncate(retained);
        self.tracked_points.truncate(retained);
        self.matched_points.truncate(retained);

        self.detector.propagate(&self.keypoints);
        self.tracking_stability = self.detector.distribution_quality();

        self.frame_stability = exp_moving_average(
            self.frame_stability,
            retained as f64 / total_points as f64,
            METRIC_SMOOTHING_FACTOR,
        );

        let (track_h, track_w) = self.settings.tracking_resolution;
        let mut motion = WarpField::new(self.settings.motion_resolution);
        if self.settings.motion_resolution == MINIMUM_FIELD_SHAPE {
            motion.set_to(&global_motion, (track_w as f32, track_h as f32));
        } else {
            let region = Rect2f::new(0.0, 0.0, track_w as f32, track_h as f32);
            motion.fit_to(
                region,
                &self.tracked_points,
                &self.matched_points,
                Some(&global_motion),
            );
        }

        // Scale displacements from tracking to frame resolution.
        motion.scale_by((w as f32 / track_w as f32, h as f32 / track_h as f32));

        Ok(Some(motion))
    }
}
