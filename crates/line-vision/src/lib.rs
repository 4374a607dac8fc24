//! Perception and control for a camera line follower.
//!
//! Each frame goes through the same fixed chain:
//!
//! 1. [`PerceptionPipeline`] turns the camera image into a line mask and a
//!    marker mask.
//! 2. [`IntersectionResolver`] counts the floor regions around the line and,
//!    at a junction, cuts the mask down to a single path.
//! 3. [`ContourTracker`] picks the line contour closest to where the line
//!    was last seen.
//! 4. [`SteeringController`] turns that contour's angle and offset into a
//!    PID steering command for a [`Motor`].
//!
//! [`FollowerSession`] owns the state that carries between frames and runs
//! the chain.

pub mod color;
pub mod config;
pub mod contour;
pub mod error;
pub mod geometry;
pub mod intersection;
pub mod marker;
pub mod mask;
pub mod motor;
pub mod perception;
pub mod pid;
pub mod session;
pub mod steering;
pub mod tracker;

#[cfg(test)]
mod test_utils;

pub use config::{CalibrationMap, ThresholdConfig};
pub use contour::{Edges, LineContour};
pub use error::VisionError;
pub use intersection::{Decision, IntersectionResolver, IntersectionState, Resolution};
pub use marker::{IgnoreMarkers, MARKER_MIN_PIXELS, MarkerHandler};
pub use mask::{CutLine, Mask, Side};
pub use motor::{Motor, MotorStatus, tank_mix};
pub use perception::{Crop, Masks, PerceptionPipeline};
pub use pid::{Pid, PidGains};
pub use session::{ChosenLine, FollowerSession, FrameReport};
pub use steering::{AngleCorrector, AngleReading, SteeringCommand, SteeringConfig, SteeringController, SteeringOutput};
pub use tracker::{ContourTracker, NoLineFound};
