use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::consts::{
    FAST_FEATURE_TOLERANCE, FAST_INITIAL_THRESHOLD, FAST_MAX_THRESHOLD, FAST_MIN_THRESHOLD,
    FAST_THRESHOLD_STEP,
};
use crate::data::SpatialMap;
use crate::error::{Result, StabilizationError};
use crate::geometry::Rect2f;

use super::fast::{detect_corners, KeyPoint};

/// Tuning for the grid-constrained corner detector.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeatureDetectorSettings {
    /// Input image shape `(rows, cols)`; equal to the tracking resolution.
    pub detection_resolution: (usize, usize),
    /// Shape `(rows, cols)` of the independent FAST detection zones.
    #[serde(default = "default_detection_regions")]
    pub detection_regions: (usize, usize),
    /// Shape `(rows, cols)` of the non-maximal suppression grid.
    #[serde(default = "default_feature_grid_shape")]
    pub feature_grid_shape: (usize, usize),
    /// Fraction of a zone's grid cells that propagated corners must fill
    /// before re-detection is skipped.
    #[serde(default = "default_min_feature_density")]
    pub min_feature_density: f32,
    /// Fraction of a zone's grid cells targeted by raw FAST detection.
    #[serde(default = "default_max_feature_density")]
    pub max_feature_density: f32,
    /// Run FAST in every zone regardless of propagated load.
    #[serde(default)]
    pub force_detection: bool,
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

impl Default for FeatureDetectorSettings {
    fn default() -> Self {
        Self {
            detection_resolution: (360, 640),
            detection_regions: default_detection_regions(),
            feature_grid_shape: default_feature_grid_shape(),
            min_feature_density: default_min_feature_density(),
            max_feature_density: default_max_feature_density(),
            force_detection: false,
        }
    }
}

impl FeatureDetectorSettings {
    pub fn validate(&self) -> Result<()> {
        let (rows, cols) = self.detection_resolution;
        let (zone_rows, zone_cols) = self.detection_regions;
        let (grid_rows, grid_cols) = self.feature_grid_shape;

        if rows == 0 || cols == 0 {
            return Err(StabilizationError::InvalidConfiguration(
                "detection_resolution must be non-zero".into(),
            ));
        }
        if zone_rows == 0 || zone_cols == 0 || zone_rows > rows || zone_cols > cols {
            return Err(StabilizationError::InvalidConfiguration(
                "detection_regions must be non-zero and fit the detection resolution".into(),
            ));
        }
        if grid_rows == 0 || grid_cols == 0 {
            return Err(StabilizationError::InvalidConfiguration(
                "feature_grid_shape must be non-zero".into(),
            ));
        }
        if self.min_feature_density <= 0.0
            || self.max_feature_density > 1.0
            || self.min_feature_density > self.max_feature_density
        {
            return Err(StabilizationError::InvalidConfiguration(
                "feature densities must satisfy 0 < min <= max <= 1".into(),
            ));
        }
        Ok(())
    }
}

/// One FAST detection zone with a self-regulating threshold.
#[derive(Clone, Debug)]
struct DetectionZone {
    bounds: Rect2f,
    threshold: u8,
    load: usize,
}

/// Grid-constrained FAST detector.
///
/// The image is split into detection zones, each running FAST with its own
/// adaptive threshold. Detected corners compete per suppression-grid cell,
/// keeping only the strongest response, which yields a spatially
/// well-distributed corner set. Corners propagated back after tracking
/// raise a zone's load and suppress re-detection while the tracked set
/// remains healthy.
pub struct FeatureDetector {
    settings: FeatureDetectorSettings,
    zones: SpatialMap<DetectionZone>,
    suppression_grid: SpatialMap<KeyPoint>,
    min_feature_load: usize,
    fast_target: usize,
    corner_buffer: Vec<KeyPoint>,
    last_quality: f64,
}

impl FeatureDetector {
    pub fn new(settings: FeatureDetectorSettings) -> Result<Self> {
        settings.validate()?;

        let region = Rect2f::of_frame(settings.detection_resolution);
        let zones = build_zones(&settings, region);
        let suppression_grid = SpatialMap::new(settings.feature_grid_shape, region);

        let zone_cells = suppression_grid.area() as f32 / zones.area() as f32;
        let min_feature_load = (settings.min_feature_density * zone_cells) as usize;
        let fast_target = (settings.max_feature_density * zone_cells) as usize;

        Ok(Self {
            settings,
            zones,
            suppression_grid,
            min_feature_load,
            fast_target,
            corner_buffer: Vec::new(),
            last_quality: 0.0,
        })
    }

    pub fn configure(&mut self, settings: FeatureDetectorSettings) -> Result<()> {
        *self = FeatureDetector::new(settings)?;
        Ok(())
    }

    pub fn settings(&self) -> &FeatureDetectorSettings {
        &self.settings
    }

    /// Largest corner set the suppression grid can produce.
    pub fn max_feature_capacity(&self) -> usize {
        self.suppression_grid.area()
    }

    /// Total propagated load below which zones re-detect.
    pub fn min_feature_capacity(&self) -> usize {
        self.min_feature_load * self.zones.area()
    }

    /// Distribution quality of the corner set from the last detection.
    pub fn distribution_quality(&self) -> f64 {
        self.last_quality
    }

    /// Detect up to one corner per suppression-grid cell in `frame`.
    ///
    /// Zones whose propagated load meets the minimum are skipped unless
    /// `force_detection` is set. Appends the surviving corners, tracked
    /// and fresh alike, to `features` and returns the distribution
    /// quality of the set. Grid and load state persist until the next
    /// [`FeatureDetector::propagate`] or [`FeatureDetector::reset`], so
    /// a failed tracking cycle keeps its corner continuity.
    pub fn detect(&mut self, frame: &Array2<u8>, features: &mut Vec<KeyPoint>) -> Result<f64> {
        if frame.dim() != self.settings.detection_resolution {
            return Err(StabilizationError::InvalidInput(format!(
                "detector expects a {:?} frame, got {:?}",
                self.settings.detection_resolution,
                frame.dim()
            )));
        }

        let force = self.settings.force_detection;
        let min_load = self.min_feature_load;
        let target = self.fast_target;

        let zones = &mut self.zones;
        let grid = &mut self.suppression_grid;
        let buffer = &mut self.corner_buffer;

        for (_, zone) in zones.iter_mut() {
            if force || zone.load <= min_load {
                buffer.clear();
                detect_corners(frame, zone.bounds, zone.threshold, buffer);

                for corner in buffer.iter() {
                    if let Some(key) = grid.try_key_of(corner.position) {
                        match grid.at(key) {
                            // A tracked corner keeps its cell until the
                            // next propagation replaces it.
                            Some(existing) if existing.propagated => {}
                            Some(existing) if existing.response > corner.response => {}
                            _ => grid.emplace_at(key, *corner),
                        }
                    }
                }

                // Self-regulate: aim the raw FAST corner count at the
                // per-zone target for the next pass.
                if buffer.len() > target + FAST_FEATURE_TOLERANCE {
                    zone.threshold =
                        (zone.threshold.saturating_add(FAST_THRESHOLD_STEP)).min(FAST_MAX_THRESHOLD);
                } else if buffer.len() + FAST_FEATURE_TOLERANCE < target {
                    zone.threshold =
                        (zone.threshold.saturating_sub(FAST_THRESHOLD_STEP)).max(FAST_MIN_THRESHOLD);
                }
            }
        }

        for (_, corner) in self.suppression_grid.iter() {
            features.push(*corner);
        }

        self.last_quality = self.suppression_grid.distribution_quality();
        Ok(self.last_quality)
    }

    /// Re-insert tracked corners ahead of the next detection pass.
    ///
    /// The suppression grid and zone loads describe exactly one
    /// propagation cycle, so both are rebuilt here: inlier corners from
    /// the current frame refill the grid and raise their zone's load,
    /// suppressing re-detection where the tracked set is still dense.
    /// When tracking fails and no propagation happens, the previous
    /// cycle's corners and loads stay in place for the next attempt.
    /// Out-of-bounds corners are ignored.
    pub fn propagate(&mut self, features: &[KeyPoint]) {
        self.suppression_grid.clear();
        for (_, zone) in self.zones.iter_mut() {
            zone.load = 0;
        }

        for feature in features {
            if let Some(key) = self.suppression_grid.try_key_of(feature.position) {
                self.suppression_grid.emplace_at(
                    key,
                    KeyPoint {
                        propagated: true,
                        ..*feature
                    },
                );
                if let Some(zone_key) = self.zones.try_key_of(feature.position) {
                    if let Some(zone) = self.zones.at_mut(zone_key) {
                        zone.load += 1;
                    }
                }
            }
        }
    }

    /// Clear all propagated state, forcing full detection next call.
    pub fn reset(&mut self) {
        self.suppression_grid.clear();
        self.last_quality = 0.0;
        for (_, zone) in self.zones.iter_mut() {
            zone.load = 0;
            zone.threshold = FAST_INITIAL_THRESHOLD;
        }
    }
}

fn build_zones(settings: &FeatureDetectorSettings, region: Rect2f) -> SpatialMap<DetectionZone> {
    let mut zones = SpatialMap::new(settings.detection_regions, region);
    let (zone_rows, zone_cols) = settings.detection_regions;
    let zone_w = region.w / zone_cols as f32;
    let zone_h = region.h / zone_rows as f32;

    for row in 0..zone_rows {
        for col in 0..zone_cols {
            zones.place_at(
                (col, row),
                DetectionZone {
                    bounds: Rect2f::new(col as f32 * zone_w, row as f32 * zone_h, zone_w, zone_h),
                    threshold: FAST_INITIAL_THRESHOLD,
                    load: 0,
                },
            );
        }
    }
    zones
}
