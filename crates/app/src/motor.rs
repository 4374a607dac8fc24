//! Stand-in drive for runs without motor hardware.

use line_vision::{Motor, MotorStatus, tank_mix};
use tracing::debug;

/// Mixes each command into wheel speeds and logs it.
#[derive(Debug, Default)]
pub(crate) struct LoggingMotor {
    last: MotorStatus,
    commands: u64,
}

impl LoggingMotor {
    pub(crate) fn commands(&self) -> u64 {
        self.commands
    }
}

impl Motor for LoggingMotor {
    fn run_steer(&mut self, speed: u8, turn_intensity: u8, steering: f64) -> MotorStatus {
        let status = tank_mix(speed, turn_intensity, steering);
        if status != self.last {
            debug!(
                "drive speed={speed} turn={turn_intensity} steering={steering:.1} -> left {:.1} right {:.1}",
                status.left, status.right
            );
        }
        metrics::gauge!("line_follower_steering").set(steering);
        self.last = status;
        self.commands += 1;
        status
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn commands_are_mixed_and_counted() {
        let mut motor = LoggingMotor::default();
        let status = motor.run_steer(40, 100, 10.0);
        assert_abs_diff_eq!(status.left, 50.0);
        assert_abs_diff_eq!(status.right, 30.0);

        let stopped = motor.stop();
        assert_abs_diff_eq!(stopped.left, 0.0);
        assert_abs_diff_eq!(stopped.right, 0.0);
        assert_eq!(motor.commands(), 2);
    }
}
