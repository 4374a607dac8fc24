//! From the chosen contour to a steering command.
//!
//! The minimum-area rectangle only reports angles in `(0, 90]`, so the raw
//! angle is first disambiguated against the box geometry and the previous
//! frame. The corrected angle and the lateral offset are then blended into
//! a single position signal that drives the PID.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::trace;

use crate::{
    contour::LineContour,
    geometry::PixelPoint,
    pid::{Pid, PidGains},
};

/// Angle that maps to a full-scale position.
pub const MAX_ANGLE: f64 = 90.0;
/// Lateral offset in pixels that maps to a full-scale position.
pub const MAX_ERROR: f64 = 285.0;
pub const DEFAULT_SPEED: u8 = 40;
pub const DEFAULT_TURN_INTENSITY: u8 = 100;
pub const DEFAULT_ERROR_WEIGHT: f64 = 0.5;
pub const DEFAULT_ANGLE_WEIGHT: f64 = 1.0 - DEFAULT_ERROR_WEIGHT;
pub const DEFAULT_STARTUP_DELAY: Duration = Duration::from_secs(2);

/// Lower box corners within this many pixels of a side mark a big turn.
const BIG_TURN_MARGIN: i32 = 30;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct AngleReading {
    pub raw: i32,
    pub corrected: i32,
    pub big_turn: bool,
    pub flipped: bool,
}

/// Lower-left and upper-left corners of a rotated box.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LeftEdge {
    pub bottom: PixelPoint,
    pub top: PixelPoint,
}

/// Split the box into its lower and upper pairs, each ordered left to right.
fn corner_pairs(box_points: [PixelPoint; 4]) -> ([PixelPoint; 2], [PixelPoint; 2]) {
    let mut points = box_points;
    points.sort_by_key(|p| -p.y);
    let mut lower = [points[0], points[1]];
    let mut upper = [points[2], points[3]];
    lower.sort_by_key(|p| p.x);
    upper.sort_by_key(|p| p.x);
    (lower, upper)
}

impl LeftEdge {
    pub fn from_box(box_points: [PixelPoint; 4]) -> Self {
        let (lower, upper) = corner_pairs(box_points);
        Self {
            bottom: lower[0],
            top: upper[0],
        }
    }
}

/// A steep line whose lower corners reach a side of the frame.
pub fn is_big_turn(raw_angle: i32, box_points: [PixelPoint; 4], frame_width: u32) -> bool {
    let (lower, _) = corner_pairs(box_points);
    raw_angle > 85
        && (lower[0].x < BIG_TURN_MARGIN || lower[1].x > frame_width as i32 - BIG_TURN_MARGIN)
}

/// Whether `angle` is a quarter turn off and needs 90 subtracted.
pub fn needs_quarter_turn(angle: i32, last_angle: i32, edge: LeftEdge, big_turn: bool) -> bool {
    if big_turn {
        return false;
    }
    let leaning_left = edge.bottom.x > edge.top.x;
    let was_straight = -5 < last_angle && last_angle < 5 && angle > 80;
    let edge_vertical =
        edge.top.x - 2 < edge.bottom.x && edge.bottom.x < edge.top.x + 2 && angle > 80;
    leaning_left || was_straight || edge_vertical
}

/// Resolves the rectangle angle into a signed line angle using the previous
/// frame's result.
#[derive(Clone, Debug, Default)]
pub struct AngleCorrector {
    last_angle: i32,
}

impl AngleCorrector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_angle(&self) -> i32 {
        self.last_angle
    }

    pub fn correct(&mut self, chosen: &LineContour, frame_width: u32) -> AngleReading {
        let raw = chosen.rect.angle as i32;
        let box_points = chosen.rect.box_points();
        let big_turn = is_big_turn(raw, box_points, frame_width);

        let mut corrected = raw;
        if needs_quarter_turn(corrected, self.last_angle, LeftEdge::from_box(box_points), big_turn)
        {
            corrected -= 90;
        }

        let mut flipped = false;
        if let Some(bbox) = chosen.bounding_box() {
            let at_left = corrected > 70 && bbox.x == 0;
            let at_right = corrected < -70 && bbox.right() >= frame_width as i32 - 5;
            if at_left || at_right {
                corrected = -corrected;
                flipped = true;
            }
        }
        if !flipped
            && ((corrected > 80 && self.last_angle < -20) || (corrected < -80 && self.last_angle > 20))
        {
            corrected = -corrected;
            flipped = true;
        }

        self.last_angle = corrected;
        AngleReading {
            raw,
            corrected,
            big_turn,
            flipped,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SteeringConfig {
    pub speed: u8,
    pub turn_intensity: u8,
    /// Weight of the lateral offset in the position signal.
    pub error_weight: f64,
    /// Weight of the corrected angle in the position signal.
    pub angle_weight: f64,
    pub gains: PidGains,
    pub startup_delay: Duration,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            speed: DEFAULT_SPEED,
            turn_intensity: DEFAULT_TURN_INTENSITY,
            error_weight: DEFAULT_ERROR_WEIGHT,
            angle_weight: DEFAULT_ANGLE_WEIGHT,
            gains: PidGains::default(),
            startup_delay: DEFAULT_STARTUP_DELAY,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SteeringCommand {
    pub speed: u8,
    pub turn_intensity: u8,
    pub steering: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SteeringOutput {
    pub angle: AngleReading,
    /// Rectangle center minus frame center, in pixels.
    pub error: i32,
    /// Blended position in percent of full scale.
    pub position: f64,
    pub steering: f64,
    /// `None` while the startup delay is running.
    pub command: Option<SteeringCommand>,
}

/// Weighted sum of the normalised angle and lateral offset, in percent of
/// full scale.
pub fn blend_position(corrected_angle: i32, error: i32, config: &SteeringConfig) -> f64 {
    ((corrected_angle as f64 / MAX_ANGLE) * config.angle_weight
        + (error as f64 / MAX_ERROR) * config.error_weight)
        * 100.0
}

pub struct SteeringController {
    config: SteeringConfig,
    corrector: AngleCorrector,
    pid: Pid,
    started: Instant,
}

impl SteeringController {
    pub fn new(config: SteeringConfig, now: Instant) -> Self {
        Self {
            pid: Pid::new(config.gains, now),
            corrector: AngleCorrector::new(),
            config,
            started: now,
        }
    }

    pub fn config(&self) -> &SteeringConfig {
        &self.config
    }

    /// Commands are held back until the startup delay has passed.
    pub fn ready(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started) > self.config.startup_delay
    }

    pub fn steer(&mut self, chosen: &LineContour, frame_width: u32, now: Instant) -> SteeringOutput {
        let angle = self.corrector.correct(chosen, frame_width);
        let error = (chosen.rect.center.0 - frame_width as f64 / 2.0) as i32;

        let position = blend_position(angle.corrected, error, &self.config);
        let steering = self.pid.update(-position, now);
        trace!(
            "angle {} -> {}, error {error}, position {position:.1}, steering {steering:.1}",
            angle.raw, angle.corrected
        );

        let command = self.ready(now).then_some(SteeringCommand {
            speed: self.config.speed,
            turn_intensity: self.config.turn_intensity,
            steering,
        });
        SteeringOutput {
            angle,
            error,
            position,
            steering,
            command,
        }
    }
}
