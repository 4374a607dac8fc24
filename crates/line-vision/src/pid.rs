//! Wall-clock PID controller.

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Step used when two updates land on the same instant.
const FALLBACK_DT: f64 = 0.1;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: 1.0,
            ki: 0.0,
            kd: 0.1,
        }
    }
}

/// PID whose output is the negated sum of the three terms.
#[derive(Clone, Debug)]
pub struct Pid {
    gains: PidGains,
    integral: f64,
    last_error: f64,
    last_update: Instant,
}

impl Pid {
    pub fn new(gains: PidGains, now: Instant) -> Self {
        Self {
            gains,
            integral: 0.0,
            last_error: 0.0,
            last_update: now,
        }
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    pub fn update(&mut self, error: f64, now: Instant) -> f64 {
        let mut dt = now.saturating_duration_since(self.last_update).as_secs_f64();
        if dt == 0.0 {
            dt = FALLBACK_DT;
        }

        let proportional = self.gains.kp * error;
        self.integral += self.gains.ki * error * dt;
        let derivative = self.gains.kd * (error - self.last_error) / dt;

        self.last_error = error;
        self.last_update = now;
        -(proportional + self.integral + derivative)
    }
}
