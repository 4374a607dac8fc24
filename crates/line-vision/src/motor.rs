//! Drive collaborator interface.

use serde::Serialize;

/// Per-side wheel speeds reported back by a [`Motor`], in percent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct MotorStatus {
    pub left: f64,
    pub right: f64,
}

/// Something that can drive the robot from a steering command.
pub trait Motor {
    /// `speed` and `turn_intensity` are percentages; `steering` is signed,
    /// positive turning right.
    fn run_steer(&mut self, speed: u8, turn_intensity: u8, steering: f64) -> MotorStatus;

    /// Stop both sides.
    fn stop(&mut self) -> MotorStatus {
        self.run_steer(0, 0, 0.0)
    }
}

/// Differential split of a steering command into left and right speeds,
/// each clamped to `[-100, 100]`.
pub fn tank_mix(speed: u8, turn_intensity: u8, steering: f64) -> MotorStatus {
    let speed = f64::from(speed);
    let turn = steering * f64::from(turn_intensity) / 100.0;
    MotorStatus {
        left: (speed + turn).clamp(-100.0, 100.0),
        right: (speed - turn).clamp(-100.0, 100.0),
    }
}
