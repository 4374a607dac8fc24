//! Synthetic masks and frames shared by the unit tests.

use image::{GrayImage, Luma, Rgb, RgbImage};

/// Build a `w`x`h` mask filled with `fill`, then let `draw` paint on it.
pub(crate) fn mask_with(w: u32, h: u32, fill: u8, draw: impl FnOnce(&mut GrayImage)) -> GrayImage {
    let mut img = GrayImage::from_pixel(w, h, Luma([fill]));
    draw(&mut img);
    img
}

/// Paint the `w`x`h` rectangle at (`x`, `y`), clipped to the image.
pub(crate) fn fill_rect(img: &mut GrayImage, x: u32, y: u32, w: u32, h: u32, value: u8) {
    let x_end = (x + w).min(img.width());
    let y_end = (y + h).min(img.height());
    for yy in y..y_end {
        for xx in x..x_end {
            img.put_pixel(xx, yy, Luma([value]));
        }
    }
}

/// White floor with a vertical black stripe of `stripe_width` columns
/// starting at `stripe_x`.
pub(crate) fn stripe_frame(w: u32, h: u32, stripe_x: u32, stripe_width: u32) -> RgbImage {
    RgbImage::from_fn(w, h, |x, _| {
        if x >= stripe_x && x < stripe_x + stripe_width {
            Rgb([0, 0, 0])
        } else {
            Rgb([255, 255, 255])
        }
    })
}

/// Line mask of a T-junction approached from below: a horizontal bar across
/// the full width with a stem running down to the bottom edge.
///
/// Floor is 255, line is 0.
pub(crate) fn t_junction_mask() -> GrayImage {
    mask_with(300, 200, 255, |img| {
        fill_rect(img, 0, 60, 300, 40, 0);
        fill_rect(img, 130, 100, 40, 100, 0);
    })
}

/// Line mask of a plus-shaped crossing: four floor squares on a black
/// background, two per column and two per row.
pub(crate) fn four_way_mask() -> GrayImage {
    mask_with(300, 300, 0, |img| {
        for (x, y) in [(20, 20), (180, 20), (20, 180), (180, 180)] {
            fill_rect(img, x, y, 100, 100, 255);
        }
    })
}
