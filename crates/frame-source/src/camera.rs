//! OpenCV-backed camera device.

use std::sync::{
    Mutex,
    atomic::{AtomicBool, Ordering},
};

use anyhow::anyhow;
use opencv::{
    core::{self, MatTraitConstManual},
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTrait},
};
use tracing::{debug, warn};

use crate::{
    device::{CameraDevice, DeviceOpener},
    types::{CaptureError, CapturedBuffer, FrameFormat},
};

/// Camera opened through OpenCV's `videoio`, delivering BGR frames resized
/// to the configured stream size.
pub struct OpenCvCamera {
    uri: String,
    target_size: (i32, i32),
    capture: Mutex<VideoCapture>,
    streaming: AtomicBool,
}

impl OpenCvCamera {
    pub fn open(uri: &str, target_size: (i32, i32), fps: f64) -> Result<Self, CaptureError> {
        let mut cap = open_video_capture(uri)?;
        configure_camera(&mut cap, target_size, fps);
        Ok(Self {
            uri: uri.to_string(),
            target_size,
            capture: Mutex::new(cap),
            streaming: AtomicBool::new(false),
        })
    }
}

impl CameraDevice for OpenCvCamera {
    fn start(&self) -> Result<(), CaptureError> {
        self.streaming.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn capture(&self) -> Result<CapturedBuffer, CaptureError> {
        if !self.streaming.load(Ordering::SeqCst) {
            return Err(CaptureError::Other(anyhow!("camera {} is stopped", self.uri)));
        }
        let mut cap = self
            .capture
            .lock()
            .map_err(|_| CaptureError::Other(anyhow!("camera handle poisoned")))?;

        let mut frame = Mat::default();
        let mut scratch = Mat::default();
        let (target_w, target_h) = self.target_size;

        let grabbed = cap
            .read(&mut frame)
            .map_err(|e| CaptureError::Other(e.into()))?;
        let size = frame.size().map_err(|e| CaptureError::Other(e.into()))?;
        if !grabbed || size.width <= 0 {
            return Err(CaptureError::Other(anyhow!("camera {} returned an empty frame", self.uri)));
        }

        let working = if size.width != target_w || size.height != target_h {
            opencv::imgproc::resize(
                &frame,
                &mut scratch,
                core::Size {
                    width: target_w,
                    height: target_h,
                },
                0.0,
                0.0,
                opencv::imgproc::INTER_LINEAR,
            )
            .map_err(|e| CaptureError::Other(e.into()))?;
            &scratch
        } else {
            &frame
        };

        let data = working
            .data_bytes()
            .map_err(|e| CaptureError::Other(e.into()))?
            .to_vec();

        Ok(CapturedBuffer {
            data,
            width: target_w as u32,
            height: target_h as u32,
            format: FrameFormat::Bgr8,
        })
    }

    fn stop(&self) -> Result<(), CaptureError> {
        self.streaming.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) -> Result<(), CaptureError> {
        self.streaming.store(false, Ordering::SeqCst);
        let mut cap = self
            .capture
            .lock()
            .map_err(|_| CaptureError::Other(anyhow!("camera handle poisoned")))?;
        cap.release().map_err(|e| CaptureError::Other(e.into()))?;
        debug!("released camera {}", self.uri);
        Ok(())
    }

    fn describe(&self) -> String {
        format!("opencv:{}", self.uri)
    }
}

/// Opens a fresh [`OpenCvCamera`] each time the supervisor reacquires.
pub struct OpenCvOpener {
    pub uri: String,
    pub target_size: (i32, i32),
    pub fps: f64,
}

impl DeviceOpener for OpenCvOpener {
    fn open(&self) -> Result<std::sync::Arc<dyn CameraDevice>, CaptureError> {
        let camera = OpenCvCamera::open(&self.uri, self.target_size, self.fps)?;
        Ok(std::sync::Arc::new(camera))
    }
}

/// Parse a `/dev/videoX` style URI and return the zero-based index if present.
pub(crate) fn parse_device_index(uri: &str) -> Option<i32> {
    if let Ok(index) = uri.parse::<i32>() {
        return Some(index);
    }
    if let Some(stripped) = uri.strip_prefix("/dev/video") {
        if stripped.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(index) = stripped.parse::<i32>() {
                return Some(index);
            }
        }
    }
    None
}

/// Attempt to open a camera input either by index or URI.
fn open_video_capture(uri: &str) -> Result<VideoCapture, CaptureError> {
    if let Some(index) = parse_device_index(uri) {
        for backend in [videoio::CAP_V4L, videoio::CAP_ANY] {
            match VideoCapture::new(index, backend) {
                Ok(cap) => {
                    if cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? {
                        return Ok(cap);
                    }
                }
                Err(err) => {
                    warn!("failed to open device #{index} with backend {backend}: {err}");
                }
            }
        }
    }

    for backend in [videoio::CAP_V4L, videoio::CAP_ANY] {
        match VideoCapture::from_file(uri, backend) {
            Ok(cap) => {
                if cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? {
                    return Ok(cap);
                }
            }
            Err(err) => {
                warn!("failed to open {uri} with backend {backend}: {err}");
            }
        }
    }

    Err(CaptureError::Open {
        uri: uri.to_string(),
    })
}

/// Apply resolution, frame rate and preferred pixel format.
fn configure_camera(cap: &mut VideoCapture, target_size: (i32, i32), fps: f64) {
    let mut fourcc_set = false;
    if let Ok(mjpg) = videoio::VideoWriter::fourcc('M', 'J', 'P', 'G') {
        if matches!(cap.set(videoio::CAP_PROP_FOURCC, mjpg as f64), Ok(true)) {
            fourcc_set = true;
        }
    }
    if !fourcc_set {
        if let Ok(yuyv) = videoio::VideoWriter::fourcc('Y', 'U', 'Y', 'V') {
            let _ = cap.set(videoio::CAP_PROP_FOURCC, yuyv as f64);
        }
    }
    let _ = cap.set(videoio::CAP_PROP_FRAME_WIDTH, target_size.0 as f64);
    let _ = cap.set(videoio::CAP_PROP_FRAME_HEIGHT, target_size.1 as f64);
    let _ = cap.set(videoio::CAP_PROP_FPS, fps);
}
