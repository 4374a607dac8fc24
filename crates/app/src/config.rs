//! Command line parsing for the follower binary.
//!
//! Flags are collected by clap into [`FollowerCliArgs`] and validated once
//! into a [`FollowerConfig`] that the rest of the binary uses without
//! re-checking.

use std::{net::SocketAddr, path::PathBuf};

use anyhow::{Result, bail};
use clap::Parser;
use line_vision::{
    Crop, PidGains, SteeringConfig,
    perception::{DEFAULT_CROP_BOTTOM, DEFAULT_CROP_RIGHT},
    steering::{DEFAULT_ERROR_WEIGHT, DEFAULT_SPEED, DEFAULT_STARTUP_DELAY, DEFAULT_TURN_INTENSITY},
};

/// Where frames come from.
#[derive(Clone, Debug, PartialEq)]
pub enum FrameInput {
    /// Directory of still images played back as a camera.
    Replay(PathBuf),
    /// OpenCV capture URI or device index.
    Camera(String),
}

#[derive(Clone, Debug)]
/// Validated configuration for one follower run.
pub struct FollowerConfig {
    pub input: FrameInput,
    pub calibration_path: PathBuf,
    pub thresholds_path: PathBuf,
    /// Capture size; derived from the calibration map and crop when unset.
    pub capture_size: Option<(u32, u32)>,
    pub crop: Crop,
    pub steering: SteeringConfig,
    pub fps: f64,
    /// JSON-lines file receiving one report per processed frame.
    pub report_path: Option<PathBuf>,
    pub metrics_addr: Option<SocketAddr>,
    pub max_frames: Option<u64>,
    pub verbose: bool,
}

/// CLI arguments accepted by `line-follower`.
#[derive(Debug, Parser)]
#[command(name = "line-follower", version, about = "Follow a black line with a camera")]
pub struct FollowerCliArgs {
    /// Play back the images under this directory instead of using a camera.
    #[arg(long, value_name = "DIR", conflicts_with = "camera")]
    pub replay: Option<PathBuf>,
    /// Camera URI or device index (needs the `opencv` feature).
    #[arg(long, value_name = "URI")]
    pub camera: Option<String>,
    /// Calibration map JSON (`calibration_map_w`).
    #[arg(long, value_name = "PATH", default_value = "calibration.json")]
    pub calibration: PathBuf,
    /// Threshold JSON (`black_line_threshold`, `green_turn_hsv_threshold`).
    #[arg(long, value_name = "PATH", default_value = "config.json")]
    pub thresholds: PathBuf,
    /// Capture width in pixels.
    #[arg(long, value_name = "PX")]
    pub width: Option<u32>,
    /// Capture height in pixels.
    #[arg(long, value_name = "PX")]
    pub height: Option<u32>,
    /// Rows dropped from the bottom of every frame.
    #[arg(long = "crop-bottom", value_name = "PX", default_value_t = DEFAULT_CROP_BOTTOM)]
    pub crop_bottom: u32,
    /// Columns dropped from the right of every frame.
    #[arg(long = "crop-right", value_name = "PX", default_value_t = DEFAULT_CROP_RIGHT)]
    pub crop_right: u32,
    /// Forward speed in percent.
    #[arg(long, value_name = "PERCENT", default_value_t = DEFAULT_SPEED)]
    pub speed: u8,
    /// Turn intensity in percent.
    #[arg(long = "turn-intensity", value_name = "PERCENT", default_value_t = DEFAULT_TURN_INTENSITY)]
    pub turn_intensity: u8,
    /// Weight of the lateral offset against the line angle (0-1).
    #[arg(long = "error-weight", value_name = "W", default_value_t = DEFAULT_ERROR_WEIGHT)]
    pub error_weight: f64,
    /// Weight of the line angle (0-1); defaults to `1 - error-weight`.
    #[arg(long = "angle-weight", value_name = "W")]
    pub angle_weight: Option<f64>,
    #[arg(long, value_name = "GAIN", default_value_t = PidGains::default().kp)]
    pub kp: f64,
    #[arg(long, value_name = "GAIN", default_value_t = PidGains::default().ki)]
    pub ki: f64,
    #[arg(long, value_name = "GAIN", default_value_t = PidGains::default().kd)]
    pub kd: f64,
    /// Capture rate, also the replay pace.
    #[arg(long, value_name = "FPS", default_value_t = 30.0)]
    pub fps: f64,
    /// Write one JSON report per processed frame to this file.
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,
    /// Serve Prometheus metrics on this address.
    #[arg(long = "metrics-addr", value_name = "ADDR")]
    pub metrics_addr: Option<SocketAddr>,
    /// Stop after this many processed frames.
    #[arg(long = "max-frames", value_name = "N")]
    pub max_frames: Option<u64>,
    /// Debug-level logging.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub verbose: bool,
}

impl TryFrom<FollowerCliArgs> for FollowerConfig {
    type Error = anyhow::Error;

    fn try_from(args: FollowerCliArgs) -> Result<Self> {
        let input = match (args.replay, args.camera) {
            (Some(dir), None) => FrameInput::Replay(dir),
            (None, Some(uri)) => {
                if !cfg!(feature = "opencv") {
                    bail!("--camera needs a build with the `opencv` feature; use --replay <dir>");
                }
                FrameInput::Camera(uri)
            }
            (None, None) => bail!("Missing frame input. Provide --replay <dir> or --camera <uri>."),
            (Some(_), Some(_)) => bail!("--replay and --camera are mutually exclusive"),
        };

        let capture_size = match (args.width, args.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
            (None, None) => None,
            (Some(_), Some(_)) => bail!("Capture width and height must be positive integers"),
            _ => bail!("--width and --height must be given together"),
        };

        if args.speed > 100 || args.turn_intensity > 100 {
            bail!("--speed and --turn-intensity are percentages (0-100)");
        }
        if !(0.0..=1.0).contains(&args.error_weight) {
            bail!("--error-weight must be between 0 and 1");
        }
        let angle_weight = args.angle_weight.unwrap_or(1.0 - args.error_weight);
        if !(0.0..=1.0).contains(&angle_weight) {
            bail!("--angle-weight must be between 0 and 1");
        }
        if !(args.fps.is_finite() && args.fps > 0.0) {
            bail!("--fps must be a positive number");
        }
        if args.max_frames == Some(0) {
            bail!("--max-frames must be at least 1");
        }

        let steering = SteeringConfig {
            speed: args.speed,
            turn_intensity: args.turn_intensity,
            error_weight: args.error_weight,
            angle_weight,
            gains: PidGains {
                kp: args.kp,
                ki: args.ki,
                kd: args.kd,
            },
            startup_delay: DEFAULT_STARTUP_DELAY,
        };

        Ok(Self {
            input,
            calibration_path: args.calibration,
            thresholds_path: args.thresholds,
            capture_size,
            crop: Crop {
                bottom: args.crop_bottom,
                right: args.crop_right,
            },
            steering,
            fps: args.fps,
            report_path: args.report,
            metrics_addr: args.metrics_addr,
            max_frames: args.max_frames,
            verbose: args.verbose,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<FollowerConfig> {
        let cli = FollowerCliArgs::try_parse_from(
            std::iter::once("line-follower").chain(args.iter().copied()),
        )?;
        FollowerConfig::try_from(cli)
    }

    #[test]
    fn replay_with_defaults() {
        let config = parse(&["--replay", "frames"]).unwrap();
        assert_eq!(config.input, FrameInput::Replay(PathBuf::from("frames")));
        assert_eq!(config.calibration_path, PathBuf::from("calibration.json"));
        assert_eq!(config.crop, Crop::default());
        assert_eq!(config.steering, SteeringConfig::default());
        assert!(config.capture_size.is_none());
        assert!(!config.verbose);
    }

    #[test]
    fn tuning_flags_reach_the_steering_config() {
        let config = parse(&[
            "--replay",
            "frames",
            "--speed",
            "55",
            "--error-weight",
            "0.3",
            "--kp",
            "2",
            "--kd",
            "0",
            "--width",
            "448",
            "--height",
            "300",
            "--max-frames",
            "10",
            "--metrics-addr",
            "127.0.0.1:9000",
        ])
        .unwrap();
        assert_eq!(config.steering.speed, 55);
        assert_eq!(config.steering.error_weight, 0.3);
        assert_eq!(config.steering.angle_weight, 1.0 - 0.3);
        assert_eq!(config.steering.gains.kp, 2.0);
        assert_eq!(config.steering.gains.kd, 0.0);
        assert_eq!(config.capture_size, Some((448, 300)));
        assert_eq!(config.max_frames, Some(10));
        assert_eq!(config.metrics_addr, Some("127.0.0.1:9000".parse().unwrap()));
    }

    #[test]
    fn angle_weight_can_be_set_independently() {
        let config =
            parse(&["--replay", "f", "--error-weight", "0.4", "--angle-weight", "0.4"]).unwrap();
        assert_eq!(config.steering.error_weight, 0.4);
        assert_eq!(config.steering.angle_weight, 0.4);
        assert!(parse(&["--replay", "f", "--angle-weight", "1.5"]).is_err());
    }

    #[test]
    fn invalid_combinations_are_rejected() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["--replay", "a", "--camera", "0"]).is_err());
        assert!(parse(&["--replay", "a", "--width", "320"]).is_err());
        assert!(parse(&["--replay", "a", "--error-weight", "1.5"]).is_err());
        assert!(parse(&["--replay", "a", "--speed", "120"]).is_err());
        assert!(parse(&["--replay", "a", "--max-frames", "0"]).is_err());
    }
}
