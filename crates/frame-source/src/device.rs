//! Device seam between the acquisition worker and camera backends.
//!
//! Every method takes `&self` because the supervisor may call `stop`/`close`
//! from a transient thread while the worker is still blocked in `capture`.

use std::sync::Arc;

use tracing::warn;

use crate::types::{CaptureError, CapturedBuffer};

/// A camera (or camera-like) backend.
pub trait CameraDevice: Send + Sync {
    /// Begin streaming. Called once after every (re)open.
    fn start(&self) -> Result<(), CaptureError>;

    /// Block until one buffer is available.
    fn capture(&self) -> Result<CapturedBuffer, CaptureError>;

    /// Stop streaming. May be called while `capture` is blocked elsewhere.
    fn stop(&self) -> Result<(), CaptureError>;

    /// Release the underlying hardware.
    fn close(&self) -> Result<(), CaptureError>;

    /// Human readable identifier for log messages.
    fn describe(&self) -> String {
        "camera".to_string()
    }
}

/// Opens a fresh device handle; used at start-up and for full reacquisition.
pub trait DeviceOpener: Send + Sync {
    fn open(&self) -> Result<Arc<dyn CameraDevice>, CaptureError>;
}

impl<F> DeviceOpener for F
where
    F: Fn() -> Result<Arc<dyn CameraDevice>, CaptureError> + Send + Sync,
{
    fn open(&self) -> Result<Arc<dyn CameraDevice>, CaptureError> {
        self()
    }
}

/// Open a device and start streaming; a device that fails to start is
/// closed before the error is returned.
pub(crate) fn open_and_start(
    opener: &dyn DeviceOpener,
) -> Result<Arc<dyn CameraDevice>, CaptureError> {
    let device = opener.open()?;
    if let Err(err) = device.start() {
        if let Err(close_err) = device.close() {
            warn!("failed to close {} after start error: {close_err}", device.describe());
        }
        return Err(err);
    }
    Ok(device)
}
