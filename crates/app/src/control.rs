//! Follower control loop: newest frame in, one motor command out.

use std::{
    sync::{
        Arc, Once,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result, bail};
use frame_source::{CameraDevice, CaptureError, FrameSource, FrameSourceConfig, ImageSequenceDevice};
use line_vision::{CalibrationMap, FollowerSession, Motor, ThresholdConfig, VisionError};
use tracing::{debug, info, info_span, warn};

use crate::{
    config::{FollowerConfig, FrameInput},
    motor::LoggingMotor,
    report::ReportSink,
};

const FPS_LOG_INTERVAL: u64 = 20;
const IDLE_WAIT: Duration = Duration::from_millis(2);

/// Run until Ctrl+C, the frame limit, or a fatal capture error.
pub fn run(config: FollowerConfig) -> Result<()> {
    static CTRL_HANDLER: Once = Once::new();

    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_shutdown = shutdown.clone();
    CTRL_HANDLER.call_once(move || {
        if let Err(err) = ctrlc::set_handler(move || {
            handler_shutdown.store(true, Ordering::SeqCst);
        }) {
            warn!("Failed to install Ctrl+C handler: {err}");
        }
    });

    let calibration = CalibrationMap::load(&config.calibration_path).with_context(|| {
        format!("failed to load calibration {}", config.calibration_path.display())
    })?;
    let thresholds = ThresholdConfig::load(&config.thresholds_path).with_context(|| {
        format!("failed to load thresholds {}", config.thresholds_path.display())
    })?;

    let capture_size = capture_size(&config, calibration.dimensions())?;
    info!(
        "capture {}x{}, working region {}x{}",
        capture_size.0,
        capture_size.1,
        calibration.dimensions().0,
        calibration.dimensions().1
    );

    let mut source = FrameSource::new(opener(&config, capture_size)?, FrameSourceConfig::default());
    source.start().context("failed to start frame source")?;

    let mut session = FollowerSession::new(
        calibration,
        thresholds,
        config.crop,
        config.steering,
        Instant::now(),
    );
    let mut motor = LoggingMotor::default();
    let mut reports = config
        .report_path
        .as_deref()
        .map(ReportSink::create)
        .transpose()?;

    let outcome = drive(&config, &shutdown, &mut source, &mut session, &mut motor, reports.as_mut());

    motor.stop();
    source.stop();
    if let Some(sink) = reports {
        let lines = sink.lines();
        sink.finish()?;
        debug!("wrote {lines} frame reports");
    }
    info!(
        "follower stopped: {} frames captured, {} commands, {} restarts, {} escalations",
        source.frames_published(),
        motor.commands(),
        source.restarts(),
        source.escalations()
    );
    outcome
}

fn drive(
    config: &FollowerConfig,
    shutdown: &AtomicBool,
    source: &mut FrameSource,
    session: &mut FollowerSession,
    motor: &mut dyn Motor,
    mut reports: Option<&mut ReportSink>,
) -> Result<()> {
    let mut last_sequence = None;
    let mut processed: u64 = 0;
    let mut window_start = Instant::now();

    while !shutdown.load(Ordering::SeqCst) {
        source.check_health()?;

        let Some(frame) = source.latest_frame() else {
            thread::sleep(IDLE_WAIT);
            continue;
        };
        if last_sequence == Some(frame.sequence) {
            thread::sleep(IDLE_WAIT);
            continue;
        }
        last_sequence = Some(frame.sequence);

        let span = info_span!("follower.frame", sequence = frame.sequence);
        let _entered = span.enter();

        let report = match session.step_frame(&frame, motor, Instant::now()) {
            Ok(report) => report,
            Err(err @ VisionError::UndecodableFrame { .. }) => {
                warn!("skipping frame: {err}");
                continue;
            }
            Err(err) => return Err(err).context("frame does not match the calibration"),
        };
        if let Some(sink) = reports.as_deref_mut() {
            sink.write(frame.sequence, frame.timestamp_ms, &report)?;
        }

        processed += 1;
        metrics::counter!("line_follower_frames_processed_total").increment(1);
        if processed % FPS_LOG_INTERVAL == 0 {
            let elapsed = window_start.elapsed().as_secs_f64();
            if elapsed > 0.0 {
                let fps = FPS_LOG_INTERVAL as f64 / elapsed;
                debug!("{fps:.1} fps, state {}", report.state.label());
                metrics::gauge!("line_follower_fps").set(fps);
            }
            window_start = Instant::now();
        }

        if config.max_frames.is_some_and(|max| processed >= max) {
            info!("processed {processed} frames, stopping");
            break;
        }
    }
    Ok(())
}

/// Capture size: explicit, or the calibrated working region plus the crop.
/// An explicit size that does not crop down to the calibration is rejected.
fn capture_size(config: &FollowerConfig, calibrated: (u32, u32)) -> Result<(u32, u32)> {
    let derived = (calibrated.0 + config.crop.right, calibrated.1 + config.crop.bottom);
    match config.capture_size {
        None => Ok(derived),
        Some(size) if size == derived => Ok(size),
        Some((w, h)) => bail!(
            "capture size {w}x{h} minus crop {}x{} does not match the {}x{} calibration map",
            config.crop.right,
            config.crop.bottom,
            calibrated.0,
            calibrated.1
        ),
    }
}

fn opener(
    config: &FollowerConfig,
    capture_size: (u32, u32),
) -> Result<Box<dyn Fn() -> Result<Arc<dyn CameraDevice>, CaptureError> + Send + Sync>> {
    match &config.input {
        FrameInput::Replay(root) => {
            let root = root.clone();
            let interval = Duration::from_secs_f64(1.0 / config.fps);
            Ok(Box::new(move || {
                let device = ImageSequenceDevice::open(&root, interval)?;
                Ok(Arc::new(device) as Arc<dyn CameraDevice>)
            }))
        }
        #[cfg(feature = "opencv")]
        FrameInput::Camera(uri) => {
            use frame_source::{DeviceOpener, OpenCvOpener};

            let opener = OpenCvOpener {
                uri: uri.clone(),
                target_size: (capture_size.0 as i32, capture_size.1 as i32),
                fps: config.fps,
            };
            Ok(Box::new(move || opener.open()))
        }
        #[cfg(not(feature = "opencv"))]
        FrameInput::Camera(uri) => bail!(
            "camera {uri} at {}x{} needs a build with the `opencv` feature",
            capture_size.0,
            capture_size.1
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use line_vision::{Crop, SteeringConfig};

    use super::*;

    fn config(capture_size: Option<(u32, u32)>) -> FollowerConfig {
        FollowerConfig {
            input: FrameInput::Replay(PathBuf::from("frames")),
            calibration_path: PathBuf::from("calibration.json"),
            thresholds_path: PathBuf::from("config.json"),
            capture_size,
            crop: Crop::default(),
            steering: SteeringConfig::default(),
            fps: 30.0,
            report_path: None,
            metrics_addr: None,
            max_frames: None,
            verbose: false,
        }
    }

    #[test]
    fn capture_size_adds_the_crop_back() {
        let crop = Crop::default();
        assert_eq!(
            capture_size(&config(None), (378, 262)).unwrap(),
            (378 + crop.right, 262 + crop.bottom)
        );
        assert!(capture_size(&config(Some((448, 300))), (378, 262)).is_ok());
        assert!(capture_size(&config(Some((640, 480))), (378, 262)).is_err());
    }

    #[test]
    fn replay_input_builds_an_opener() {
        assert!(opener(&config(None), (448, 300)).is_ok());
    }

    #[cfg(not(feature = "opencv"))]
    #[test]
    fn camera_input_needs_the_opencv_build() {
        let mut camera = config(None);
        camera.input = FrameInput::Camera("0".to_string());
        match opener(&camera, (448, 300)) {
            Ok(_) => panic!("camera opener built without the opencv feature"),
            Err(err) => assert!(err.to_string().contains("448x300"), "{err}"),
        }
    }
}
