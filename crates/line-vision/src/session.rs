//! One follower run: every piece of state that carries from frame to frame.

use std::time::Instant;

use frame_source::Frame;
use image::RgbImage;
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    config::{CalibrationMap, ThresholdConfig},
    contour::LineContour,
    error::VisionError,
    intersection::{Decision, IntersectionResolver, IntersectionState},
    marker::{IgnoreMarkers, MARKER_MIN_PIXELS, MarkerHandler},
    motor::{Motor, MotorStatus},
    perception::{Crop, Masks, PerceptionPipeline},
    steering::{SteeringConfig, SteeringController, SteeringOutput},
    tracker::ContourTracker,
};

/// The contour the follower steered on.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ChosenLine {
    pub area: f64,
    pub center: (f64, f64),
    pub size: (f64, f64),
    pub angle: f64,
    pub distance: f64,
}

impl From<&LineContour> for ChosenLine {
    fn from(contour: &LineContour) -> Self {
        Self {
            area: contour.area,
            center: contour.rect.center,
            size: contour.rect.size,
            angle: contour.rect.angle,
            distance: contour.distance,
        }
    }
}

/// Debug record for one processed frame.
#[derive(Clone, Debug, Serialize)]
pub struct FrameReport {
    pub line_found: bool,
    pub chosen: Option<ChosenLine>,
    pub steering: Option<SteeringOutput>,
    pub state: IntersectionState,
    pub decision: Option<Decision>,
    pub marker_pixels: usize,
    /// The mask was cut but the cut left no line, so the uncut contours were used.
    pub cut_discarded: bool,
    pub command_sent: bool,
    pub motor: Option<MotorStatus>,
}

pub struct FollowerSession {
    perception: PerceptionPipeline,
    tracker: ContourTracker,
    resolver: IntersectionResolver,
    steering: SteeringController,
    markers: Box<dyn MarkerHandler>,
}

impl FollowerSession {
    pub fn new(
        calibration: CalibrationMap,
        thresholds: ThresholdConfig,
        crop: Crop,
        steering: SteeringConfig,
        now: Instant,
    ) -> Self {
        Self {
            perception: PerceptionPipeline::new(calibration, thresholds, crop),
            tracker: ContourTracker::new(),
            resolver: IntersectionResolver::new(),
            steering: SteeringController::new(steering, now),
            markers: Box::new(IgnoreMarkers),
        }
    }

    pub fn with_marker_handler(mut self, handler: Box<dyn MarkerHandler>) -> Self {
        self.markers = handler;
        self
    }

    pub fn perception(&self) -> &PerceptionPipeline {
        &self.perception
    }

    pub fn intersection_state(&self) -> IntersectionState {
        self.resolver.state()
    }

    pub fn last_line_position(&self) -> (f64, f64) {
        self.tracker.last_position()
    }

    /// Run one full cycle on a camera frame.
    pub fn step(
        &mut self,
        frame: &RgbImage,
        motor: &mut dyn Motor,
        now: Instant,
    ) -> Result<FrameReport, VisionError> {
        let masks = self.perception.process(frame)?;
        Ok(self.step_masks(&masks, motor, now))
    }

    /// Run one full cycle on a frame straight from a [`frame_source::FrameSource`].
    pub fn step_frame(
        &mut self,
        frame: &Frame,
        motor: &mut dyn Motor,
        now: Instant,
    ) -> Result<FrameReport, VisionError> {
        let image = frame.to_rgb_image().ok_or(VisionError::UndecodableFrame {
            sequence: frame.sequence,
            width: frame.width,
            height: frame.height,
        })?;
        self.step(&image, motor, now)
    }

    /// Run the cycle from already computed masks.
    pub fn step_masks(&mut self, masks: &Masks, motor: &mut dyn Motor, now: Instant) -> FrameReport {
        let mut line_contours = self.tracker.line_contours(&masks.line);
        let mut decision = None;
        let mut cut_discarded = false;

        if masks.marker_pixels > MARKER_MIN_PIXELS {
            self.markers.on_marker(&masks.marker, masks.marker_pixels);
        } else {
            let gaps = self.tracker.gap_contours(&masks.line);
            let resolution = self.resolver.resolve(&gaps, &masks.line, now);
            decision = resolution.decision;
            if let Some(cut) = resolution.mask {
                let recut = self.tracker.line_contours(&cut);
                if recut.is_empty() {
                    warn!("intersection cut removed every line contour, keeping the uncut mask");
                    cut_discarded = true;
                } else {
                    line_contours = recut;
                }
            }
        }

        let mut report = FrameReport {
            line_found: false,
            chosen: None,
            steering: None,
            state: self.resolver.state(),
            decision,
            marker_pixels: masks.marker_pixels,
            cut_discarded,
            command_sent: false,
            motor: None,
        };

        let chosen = match self.tracker.choose(line_contours) {
            Ok(chosen) => chosen,
            Err(err) => {
                metrics::counter!("line_vision_no_line_frames_total").increment(1);
                debug!("{err}, holding the last command");
                return report;
            }
        };

        let output = self.steering.steer(&chosen, masks.line.width(), now);
        if let Some(command) = output.command {
            report.motor = Some(motor.run_steer(
                command.speed,
                command.turn_intensity,
                command.steering,
            ));
            report.command_sent = true;
        }
        report.line_found = true;
        report.chosen = Some(ChosenLine::from(&chosen));
        report.steering = Some(output);
        report
    }
}
