pub mod config;

use tracing::{debug, info};

use crate::consts::{QA_BLEND_STEP, QA_UPDATE_RATE};
use crate::data::StreamBuffer;
use crate::error::{Result, StabilizationError};
use crate::frame::Frame;
use crate::geometry::{exp_moving_average, step};
use crate::path::PathSmoother;
use crate::tracking::FrameTracker;
use crate::warp::WarpField;

pub use config::StabilizationSettings;

/// Real-time video stabilization with a fixed output delay.
///
/// Frames pushed through [`StabilizationPipeline::process`] come back out
/// in input order, `r + 1` frames later, warped onto a smoothed camera
/// path. Tracking failures never fault the pipeline: a quality-assurance
/// trust factor attenuates suspect motion so the output degrades toward
/// the unstabilized input instead.
pub struct StabilizationPipeline {
    settings: StabilizationSettings,
    tracker: FrameTracker,
    smoother: PathSmoother,
    frame_queue: StreamBuffer<Frame>,
    null_motion: WarpField,
    scene_quality: f64,
    trust_factor: f64,
    frame_shape: Option<(usize, usize)>,
}

impl StabilizationPipeline {
    pub fn new(settings: StabilizationSettings) -> Result<Self> {
        settings.validate()?;

        let tracker = FrameTracker::new(settings.tracker_settings())?;
        let smoother = PathSmoother::new(settings.smoother_settings())?;
        let frame_queue = StreamBuffer::new(smoother.frame_delay() + 1);
        let null_motion = WarpField::new(settings.motion_resolution);

        Ok(Self {
            settings,
            tracker,
            smoother,
            frame_queue,
            null_motion,
            scene_quality: 1.0,
            trust_factor: 0.0,
            frame_shape: None,
        })
    }

    /// Replace the configuration between frames.
    ///
    /// Turning stabilization off resets the tracking context so that
    /// re-enabling starts from a clean path with no discontinuity. A
    /// changed look-ahead radius resizes the delay queue, dropping frames
    /// whose correction timing no longer exists.
    pub fn configure(&mut self, settings: StabilizationSettings) -> Result<()> {
        settings.validate()?;

        if self.settings.stabilize_output && !settings.stabilize_output {
            info!("stabilization disabled, resetting tracking context");
            self.reset_context();
        }

        self.tracker.configure(settings.tracker_settings())?;
        self.smoother.configure(settings.smoother_settings())?;
        self.null_motion = WarpField::new(settings.motion_resolution);

        let new_capacity = self.smoother.frame_delay() + 1;
        let old_capacity = self.frame_queue.capacity();
        if new_capacity != old_capacity {
            let mut rebuilt = StreamBuffer::new(new_capacity);
            let preserved: Vec<Frame> = self.frame_queue.iter().cloned().collect();
            for frame in preserved {
                rebuilt.push(frame);
            }
            if new_capacity > old_capacity {
                // The grown window re-centres further in the past; the
                // oldest queued frames no longer line up with any path
                // position.
                rebuilt.skip(new_capacity - old_capacity);
            }
            self.frame_queue = rebuilt;
        }

        self.settings = settings;
        Ok(())
    }

    pub fn settings(&self) -> &StabilizationSettings {
        &self.settings
    }

    /// Fixed delay between a frame entering and leaving the pipeline.
    pub fn frame_delay(&self) -> usize {
        self.smoother.frame_delay()
    }

    /// EMA of the tracker's distribution quality, in [0, 1].
    pub fn scene_quality(&self) -> f64 {
        self.scene_quality
    }

    /// Fraction of newly tracked motion currently trusted, in [0, 1].
    pub fn trust_factor(&self) -> f64 {
        self.trust_factor
    }

    /// The displayable region of the current frame size, or `None` before
    /// the first frame.
    pub fn stable_region(&self) -> Option<crate::geometry::Rect2f> {
        self.frame_shape.map(|shape| self.smoother.scene_margins(shape))
    }

    /// Push one frame through the pipeline.
    ///
    /// Returns `None` while the delay queue warms up, then one output
    /// frame per call carrying the timestamp of the input received
    /// `r + 1` calls earlier. Misshapen input fails with `InvalidInput`
    /// and consumes nothing.
    pub fn process(&mut self, frame: Frame) -> Result<Option<Frame>> {
        let shape = frame.shape();
        if shape.0 == 0 || shape.1 == 0 {
            return Err(StabilizationError::InvalidInput(format!(
                "zero-sized frame: {}x{}",
                shape.0, shape.1
            )));
        }
        if let Some(expected) = self.frame_shape {
            if shape != expected {
                return Err(StabilizationError::InvalidInput(format!(
                    "frame size changed from {:?} to {:?}",
                    expected, shape
                )));
            }
        } else {
            self.frame_shape = Some(shape);
        }

        if !self.settings.stabilize_output {
            return self.process_passthrough(frame, shape);
        }

        let motion = self.tracker.track(&frame)?;
        let tracking_quality = self.tracker.tracking_stability();

        // Quality assurance: a sudden quality collapse is treated as a
        // scene discontinuity and zeroes the trust instantly; a slow
        // degradation blends it out, and clean tracking blends it back.
        self.scene_quality =
            exp_moving_average(self.scene_quality, tracking_quality, QA_UPDATE_RATE);
        if tracking_quality < self.settings.min_tracking_quality {
            if self.trust_factor > 0.0 {
                debug!(tracking_quality, "discontinuity detected, trust zeroed");
            }
            self.trust_factor = 0.0;
        } else if self.scene_quality < self.settings.min_scene_quality {
            self.trust_factor = step(self.trust_factor, 0.0, QA_BLEND_STEP);
        } else {
            self.trust_factor = step(self.trust_factor, 1.0, QA_BLEND_STEP);
        }

        let mut motion = motion.unwrap_or_else(|| self.null_motion.clone());
        motion *= self.trust_factor as f32;

        self.frame_queue.push(frame);
        let correction = self.smoother.next(&motion, shape)?;

        let (Some(correction), true) = (correction, self.frame_queue.is_full()) else {
            return Ok(None);
        };
        let Some(delayed) = self.frame_queue.pop_oldest() else {
            return Ok(None);
        };

        let stabilized = correction.apply(&delayed.data)?;
        Ok(Some(Frame::new(stabilized, delayed.timestamp_ns)))
    }

    /// Delay-preserving path used while stabilization is disabled.
    fn process_passthrough(&mut self, frame: Frame, shape: (usize, usize)) -> Result<Option<Frame>> {
        self.frame_queue.push(frame);
        if !self.frame_queue.is_full() {
            return Ok(None);
        }
        let Some(delayed) = self.frame_queue.pop_oldest() else {
            return Ok(None);
        };

        if self.settings.crop_frame_to_margins {
            let crop = self.smoother.scene_crop(shape);
            let cropped = crop.apply(&delayed.data)?;
            return Ok(Some(Frame::new(cropped, delayed.timestamp_ns)));
        }
        Ok(Some(delayed))
    }

    /// Return to the freshly constructed state.
    pub fn restart(&mut self) {
        self.frame_queue.clear();
        self.frame_shape = None;
        self.scene_quality = 1.0;
        self.trust_factor = 0.0;
        self.reset_context();
    }

    fn reset_context(&mut self) {
        self.tracker.restart();
        self.smoother.restart();
    }
}
