//! Frame to mask conversion.
//!
//! Crop, gray, blur, flatten illumination, threshold, then clean up with
//! morphology. The marker colour is masked separately and removed from the
//! line mask so a coloured marker never reads as line.

use std::time::Instant;

use image::{GrayImage, ImageBuffer, Luma, RgbImage, imageops};
use imageproc::{
    distance_transform::Norm,
    filter::gaussian_blur_f32,
    morphology::{dilate, erode, open},
};
use tracing::trace;

use crate::{
    color::{hsv_in_range, to_gray},
    config::{CalibrationMap, ThresholdConfig},
    error::VisionError,
    mask::{BACKGROUND, FOREGROUND, Mask},
};

pub const DEFAULT_CROP_BOTTOM: u32 = 38;
pub const DEFAULT_CROP_RIGHT: u32 = 70;

const BLUR_SIGMA: f32 = 1.1;
/// 7x7 square opening.
const OPEN_RADIUS: u8 = 3;
/// 5x5 square erosion, one pass.
const MARKER_ERODE_RADIUS: u8 = 2;
/// Two 5x5 square dilations.
const LINE_DILATE_RADIUS: u8 = 4;

/// Pixels removed from the bottom and right of every frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Crop {
    pub bottom: u32,
    pub right: u32,
}

impl Default for Crop {
    fn default() -> Self {
        Self {
            bottom: DEFAULT_CROP_BOTTOM,
            right: DEFAULT_CROP_RIGHT,
        }
    }
}

/// Output of one perception pass.
#[derive(Clone, Debug)]
pub struct Masks {
    /// 255 = floor, 0 = line.
    pub line: Mask,
    /// 0 = marker colour, 255 elsewhere.
    pub marker: Mask,
    pub marker_pixels: usize,
}

pub struct PerceptionPipeline {
    calibration: CalibrationMap,
    thresholds: ThresholdConfig,
    crop: Crop,
}

impl PerceptionPipeline {
    pub fn new(calibration: CalibrationMap, thresholds: ThresholdConfig, crop: Crop) -> Self {
        Self {
            calibration,
            thresholds,
            crop,
        }
    }

    /// Size of the cropped working region, which is also the calibration
    /// map size.
    pub fn working_size(&self) -> (u32, u32) {
        self.calibration.dimensions()
    }

    pub fn crop(&self, frame: &RgbImage) -> Result<RgbImage, VisionError> {
        let (width, height) = frame.dimensions();
        if width <= self.crop.right || height <= self.crop.bottom {
            return Err(VisionError::FrameTooSmall {
                width,
                height,
                crop_right: self.crop.right,
                crop_bottom: self.crop.bottom,
            });
        }
        let (w, h) = (width - self.crop.right, height - self.crop.bottom);
        if (w, h) != self.calibration.dimensions() {
            return Err(VisionError::DimensionMismatch {
                expected: self.calibration.dimensions(),
                actual: (w, h),
            });
        }
        Ok(imageops::crop_imm(frame, 0, 0, w, h).to_image())
    }

    pub fn process(&self, frame: &RgbImage) -> Result<Masks, VisionError> {
        let started = Instant::now();
        let working = self.crop(frame)?;

        let calibrated = self.calibrated_gray(&working);
        let binary = open(&self.threshold(&calibrated), Norm::LInf, OPEN_RADIUS);

        let [lower, upper] = self.thresholds.green_turn_hsv_threshold;
        let marker = Mask::new(erode(
            Mask::new(hsv_in_range(&working, lower, upper))
                .inverted()
                .image(),
            Norm::LInf,
            MARKER_ERODE_RADIUS,
        ));

        let line = Mask::new(dilate(&binary, Norm::LInf, LINE_DILATE_RADIUS)).or(&marker.inverted());
        let marker_pixels = marker.count_value(BACKGROUND);

        let elapsed = started.elapsed();
        metrics::histogram!("line_vision_perception_seconds").record(elapsed.as_secs_f64());
        trace!("perception pass took {elapsed:?} ({marker_pixels} marker pixels)");

        Ok(Masks {
            line,
            marker,
            marker_pixels,
        })
    }

    /// Blurred gray scaled by the calibration gains and clipped to 8 bits.
    fn calibrated_gray(&self, working: &RgbImage) -> GrayImage {
        let gray = to_gray(working);
        let float: ImageBuffer<Luma<f32>, Vec<f32>> =
            ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
                Luma([gray.get_pixel(x, y)[0] as f32])
            });
        let blurred = gaussian_blur_f32(&float, BLUR_SIGMA);

        GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
            let smoothed = blurred.get_pixel(x, y)[0].round().clamp(0.0, 255.0);
            let scaled = (smoothed * self.calibration.gain(x, y)).clamp(0.0, 255.0);
            Luma([scaled as u8])
        })
    }

    fn threshold(&self, calibrated: &GrayImage) -> GrayImage {
        let [low, high] = self.thresholds.black_line_threshold;
        GrayImage::from_fn(calibrated.width(), calibrated.height(), |x, y| {
            let v = calibrated.get_pixel(x, y)[0];
            Luma([if v > low && v <= high {
                FOREGROUND
            } else {
                BACKGROUND
            }])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::stripe_frame;
    use image::Rgb;

    fn pipeline(w: u32, h: u32, crop: Crop) -> PerceptionPipeline {
        PerceptionPipeline::new(
            CalibrationMap::uniform(w - crop.right, h - crop.bottom),
            ThresholdConfig::default(),
            crop,
        )
    }

    #[test]
    fn stripe_becomes_thinner_line_region() {
        let crop = Crop { bottom: 0, right: 0 };
        let masks = pipeline(120, 80, crop).process(&stripe_frame(120, 80, 40, 40)).unwrap();
        let line = &masks.line;
        assert!(line.is_binary());
        assert_eq!((line.width(), line.height()), (120, 80));
        // Floor on both sides, line in the middle, thinned by the dilation.
        assert_eq!(line.get(10, 40), FOREGROUND);
        assert_eq!(line.get(110, 40), FOREGROUND);
        assert_eq!(line.get(60, 40), BACKGROUND);
        assert_eq!(line.get(41, 40), FOREGROUND);
        assert_eq!(masks.marker_pixels, 0);
    }

    #[test]
    fn marker_colour_is_removed_from_line() {
        let crop = Crop { bottom: 0, right: 0 };
        let mut frame = stripe_frame(100, 100, 40, 20);
        for y in 20..80 {
            for x in 10..90 {
                frame.put_pixel(x, y, Rgb([0, 100, 0]));
            }
        }
        let masks = pipeline(100, 100, crop).process(&frame).unwrap();
        assert!(masks.marker.is_binary());
        assert!(masks.marker_pixels > 2000);
        // The green square reads dark in gray but must not become line.
        assert_eq!(masks.line.get(50, 50), FOREGROUND);
        assert_eq!(masks.line.get(50, 5), BACKGROUND);
    }

    #[test]
    fn crop_must_match_calibration() {
        let crop = Crop::default();
        let pipeline = pipeline(400, 300, crop);
        assert_eq!(pipeline.working_size(), (330, 262));
        assert!(pipeline.crop(&stripe_frame(400, 300, 0, 10)).is_ok());
        assert!(matches!(
            pipeline.process(&stripe_frame(320, 240, 0, 10)),
            Err(VisionError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            pipeline.crop(&stripe_frame(60, 30, 0, 10)),
            Err(VisionError::FrameTooSmall { .. })
        ));
    }
}
