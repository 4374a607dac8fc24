use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("failed to read config file {path:?}")]
    ConfigMissing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config file {path:?} is malformed")]
    ConfigMalformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("working region is {actual:?} but the calibration map is {expected:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("frame of {width}x{height} is too small to crop by {crop_right}x{crop_bottom}")]
    FrameTooSmall {
        width: u32,
        height: u32,
        crop_right: u32,
        crop_bottom: u32,
    },
    #[error("frame {sequence} ({width}x{height}) could not be decoded to RGB")]
    UndecodableFrame {
        sequence: u64,
        width: u32,
        height: u32,
    },
}
