//! JSON-backed perception configuration: binarisation thresholds and the
//! illumination calibration map.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::VisionError;

/// Threshold bounds read from the threshold config file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// `[low, high]`: a calibrated gray value `v` is floor when `low < v <= high`.
    pub black_line_threshold: [u8; 2],
    /// Lower and upper HSV bounds of the turn marker colour.
    pub green_turn_hsv_threshold: [[u8; 3]; 2],
}

impl ThresholdConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, VisionError> {
        let config: ThresholdConfig = read_json(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), VisionError> {
        let [low, high] = self.black_line_threshold;
        if low >= high {
            return Err(VisionError::InvalidConfig(format!(
                "black_line_threshold low ({low}) must be below high ({high})"
            )));
        }
        let [lower, upper] = self.green_turn_hsv_threshold;
        if (0..3).any(|c| lower[c] > upper[c]) {
            return Err(VisionError::InvalidConfig(format!(
                "green_turn_hsv_threshold lower bound {lower:?} exceeds upper bound {upper:?}"
            )));
        }
        Ok(())
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            black_line_threshold: [100, 255],
            green_turn_hsv_threshold: [[40, 80, 40], [80, 255, 255]],
        }
    }
}

#[derive(Deserialize)]
struct CalibrationFile {
    calibration_map_w: Vec<Vec<f64>>,
}

/// Per-pixel gain that flattens the recorded white level of the floor.
#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationMap {
    width: u32,
    height: u32,
    gains: Vec<f32>,
}

impl CalibrationMap {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, VisionError> {
        let path = path.as_ref();
        let file: CalibrationFile = read_json(path)?;
        let map = Self::from_white_levels(&file.calibration_map_w)?;
        info!(
            "loaded {}x{} calibration map from {}",
            map.width,
            map.height,
            path.display()
        );
        Ok(map)
    }

    /// Build the gain map `255 / max(white, 1)` from rows of white levels.
    pub fn from_white_levels(rows: &[Vec<f64>]) -> Result<Self, VisionError> {
        let height = rows.len();
        let width = rows.first().map_or(0, Vec::len);
        if width == 0 || height == 0 {
            return Err(VisionError::InvalidConfig(
                "calibration_map_w is empty".to_string(),
            ));
        }
        if let Some(row) = rows.iter().position(|row| row.len() != width) {
            return Err(VisionError::InvalidConfig(format!(
                "calibration_map_w row {row} has {} entries, expected {width}",
                rows[row].len()
            )));
        }

        let gains = rows
            .iter()
            .flatten()
            .map(|&white| (255.0 / white.max(1.0)) as f32)
            .collect();
        Ok(Self {
            width: width as u32,
            height: height as u32,
            gains,
        })
    }

    /// Map with unit gain everywhere, for uniformly lit scenes.
    pub fn uniform(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            gains: vec![1.0; (width * height) as usize],
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn gain(&self, x: u32, y: u32) -> f32 {
        self.gains[(y * self.width + x) as usize]
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, VisionError> {
    let text = fs::read_to_string(path).map_err(|source| VisionError::ConfigMissing {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| VisionError::ConfigMalformed {
        path: path.to_path_buf(),
        source,
    })
}
