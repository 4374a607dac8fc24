use std::time::Duration;

use image::RgbImage;
use thiserror::Error;

/// Pixel layout of a captured buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameFormat {
    Bgr8,
    Rgb8,
}

/// Raw buffer handed back by a [`CameraDevice`](crate::CameraDevice) before
/// the acquisition worker stamps it.
#[derive(Clone, Debug)]
pub struct CapturedBuffer {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: FrameFormat,
}

/// Frame published by the [`FrameSource`](crate::FrameSource).
///
/// Frames are immutable once published and shared as `Arc<Frame>`.
#[derive(Debug)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp_ms: i64,
    pub sequence: u64,
    pub format: FrameFormat,
}

impl Frame {
    /// Copy the pixels into an RGB image, swapping channels for BGR input.
    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        let expected = (self.width as usize) * (self.height as usize) * 3;
        if self.data.len() != expected {
            return None;
        }
        let data = match self.format {
            FrameFormat::Rgb8 => self.data.clone(),
            FrameFormat::Bgr8 => self
                .data
                .chunks_exact(3)
                .flat_map(|px| [px[2], px[1], px[0]])
                .collect(),
        };
        RgbImage::from_raw(self.width, self.height, data)
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open video source {uri:?}")]
    Open { uri: String },
    #[error("capture timed out after {0:?}")]
    Timeout(Duration),
    #[error("device gave up after {escalations} forced reacquisitions")]
    DeviceFatal { escalations: u32 },
    #[error("frame source was already stopped")]
    Stopped,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Supervisor life cycle, published for diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Starting,
    Running,
    Stalled,
    Restarting,
    Closing,
    Stopped,
    Failed,
}

impl SupervisorState {
    pub fn label(self) -> &'static str {
        match self {
            SupervisorState::Idle => "idle",
            SupervisorState::Starting => "starting",
            SupervisorState::Running => "running",
            SupervisorState::Stalled => "stalled",
            SupervisorState::Restarting => "restarting",
            SupervisorState::Closing => "closing",
            SupervisorState::Stopped => "stopped",
            SupervisorState::Failed => "failed",
        }
    }

    pub(crate) fn to_u8(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            1 => SupervisorState::Starting,
            2 => SupervisorState::Running,
            3 => SupervisorState::Stalled,
            4 => SupervisorState::Restarting,
            5 => SupervisorState::Closing,
            6 => SupervisorState::Stopped,
            7 => SupervisorState::Failed,
            _ => SupervisorState::Idle,
        }
    }
}
