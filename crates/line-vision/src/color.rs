//! Colour conversions using the 8-bit conventions camera tooling expects:
//! BT.601 luma, and HSV with hue halved into `0..180`.

use image::{GrayImage, Luma, Rgb, RgbImage};

/// BT.601 luma of every pixel, rounded.
pub fn to_gray(image: &RgbImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let Rgb([r, g, b]) = *image.get_pixel(x, y);
        let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
        Luma([luma.round().clamp(0.0, 255.0) as u8])
    })
}

/// Convert one RGB pixel to 8-bit HSV (`h` in `0..180`, `s` and `v` in `0..=255`).
pub fn rgb_to_hsv([r, g, b]: [u8; 3]) -> [u8; 3] {
    let (rf, gf, bf) = (r as f32, g as f32, b as f32);
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let diff = max - min;

    let s = if max > 0.0 { diff * 255.0 / max } else { 0.0 };
    let mut h = if diff == 0.0 {
        0.0
    } else if max == rf {
        60.0 * (gf - bf) / diff
    } else if max == gf {
        120.0 + 60.0 * (bf - rf) / diff
    } else {
        240.0 + 60.0 * (rf - gf) / diff
    };
    if h < 0.0 {
        h += 360.0;
    }

    let h = (h / 2.0).round() as u32 % 180;
    [h as u8, s.round().clamp(0.0, 255.0) as u8, max as u8]
}

/// 255 where every HSV channel lies within `[lower, upper]`, 0 elsewhere.
pub fn hsv_in_range(image: &RgbImage, lower: [u8; 3], upper: [u8; 3]) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let hsv = rgb_to_hsv(image.get_pixel(x, y).0);
        let inside = (0..3).all(|c| hsv[c] >= lower[c] && hsv[c] <= upper[c]);
        Luma([if inside { 255 } else { 0 }])
    })
}
