//! Supervised camera acquisition.
//!
//! A [`FrameSource`] owns a [`CameraDevice`], runs it on a generation-tagged
//! worker thread and keeps only the newest frame. A supervisor thread watches
//! for stalls, restarts the worker, and forces a full device reacquisition
//! when workers die too quickly. Consumers poll
//! [`FrameSource::latest_frame`] and never block on the hardware.

#[cfg(feature = "opencv")]
mod camera;
mod device;
mod mailbox;
mod replay;
mod source;
mod supervisor;
mod threads;
mod types;
mod watchdog;

#[cfg(feature = "opencv")]
pub use camera::{OpenCvCamera, OpenCvOpener};
pub use device::{CameraDevice, DeviceOpener};
pub use replay::ImageSequenceDevice;
pub use source::{
    DEFAULT_DEVICE_OP_TIMEOUT, DEFAULT_MAX_ESCALATIONS, DEFAULT_SHUTDOWN_GRACE, FrameSource,
    FrameSourceConfig,
};
pub use threads::spawn_thread;
pub use types::{CaptureError, CapturedBuffer, Frame, FrameFormat, SupervisorState};
pub use watchdog::{
    DEFAULT_MIN_RESTART_INTERVAL, DEFAULT_POLL_TIMEOUT, DEFAULT_STALL_TIMEOUT,
    DEFAULT_STARTUP_GRACE, WatchdogConfig,
};
