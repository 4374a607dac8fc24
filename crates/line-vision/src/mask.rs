//! Binary masks and straight-line mask cutting.
//!
//! Masks are 0/255 `GrayImage`s. In the line mask 255 is open floor (gap)
//! and 0 is line; cutting always writes floor.

use image::{GrayImage, Luma};
use serde::Serialize;

use crate::geometry::PixelPoint;

pub const FOREGROUND: u8 = 255;
pub const BACKGROUND: u8 = 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

/// Infinite line through two pixels, never horizontal.
///
/// Construction moves the first point down one row when both points share a
/// row, so the per-row crossing is always defined.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CutLine {
    a: PixelPoint,
    b: PixelPoint,
}

impl CutLine {
    pub fn new(mut a: PixelPoint, b: PixelPoint) -> Self {
        if a.y == b.y {
            a.y += 1;
        }
        Self { a, b }
    }

    pub fn endpoints(&self) -> (PixelPoint, PixelPoint) {
        (self.a, self.b)
    }

    /// Column at which the line crosses row `y`.
    pub fn x_at(&self, y: f64) -> f64 {
        let (ax, ay) = (self.a.x as f64, self.a.y as f64);
        let (bx, by) = (self.b.x as f64, self.b.y as f64);
        ax + (y - ay) * (bx - ax) / (by - ay)
    }

    /// Which side of the line a point lies on; `None` when on the line.
    pub fn side_of(&self, x: f64, y: f64) -> Option<Side> {
        let crossing = self.x_at(y);
        if x < crossing {
            Some(Side::Left)
        } else if x > crossing {
            Some(Side::Right)
        } else {
            None
        }
    }
}

/// Owned binary mask.
#[derive(Clone, Debug, PartialEq)]
pub struct Mask {
    image: GrayImage,
}

impl Mask {
    pub fn new(image: GrayImage) -> Self {
        Self { image }
    }

    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self {
            image: GrayImage::from_pixel(width, height, Luma([value])),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &GrayImage {
        &self.image
    }

    pub fn into_image(self) -> GrayImage {
        self.image
    }

    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.image.get_pixel(x, y)[0]
    }

    pub fn inverted(&self) -> Mask {
        let mut image = self.image.clone();
        for px in image.pixels_mut() {
            px[0] = FOREGROUND - px[0];
        }
        Mask { image }
    }

    /// Pixel-wise OR of two masks of the same size.
    pub fn or(&self, other: &Mask) -> Mask {
        let mut image = self.image.clone();
        for (px, rhs) in image.pixels_mut().zip(other.image.pixels()) {
            px[0] |= rhs[0];
        }
        Mask { image }
    }

    pub fn count_value(&self, value: u8) -> usize {
        self.image.pixels().filter(|px| px[0] == value).count()
    }

    pub fn is_binary(&self) -> bool {
        self.image
            .pixels()
            .all(|px| px[0] == FOREGROUND || px[0] == BACKGROUND)
    }

    /// Set every pixel strictly on `side` of `line` to floor.
    pub fn cut(&mut self, line: &CutLine, side: Side) {
        let width = self.image.width();
        for y in 0..self.image.height() {
            let crossing = line.x_at(y as f64);
            let columns = match side {
                Side::Left => {
                    // Columns x with x < crossing.
                    let end = crossing.ceil().clamp(0.0, width as f64) as u32;
                    0..end
                }
                Side::Right => {
                    let start = (crossing.floor() + 1.0).clamp(0.0, width as f64) as u32;
                    start..width
                }
            };
            for x in columns {
                self.image.put_pixel(x, y, Luma([FOREGROUND]));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imageproc::point::Point;

    #[test]
    fn flat_lines_are_nudged_apart() {
        let line = CutLine::new(Point::new(10, 50), Point::new(90, 50));
        let (a, b) = line.endpoints();
        assert!((a.y - b.y).abs() >= 1);
        assert!(line.x_at(20.0).is_finite());
    }

    #[test]
    fn coincident_points_make_a_vertical_line() {
        let line = CutLine::new(Point::new(7, 7), Point::new(7, 7));
        assert_eq!(line.x_at(100.0), 7.0);
    }

    #[test]
    fn side_is_decided_per_row() {
        let line = CutLine::new(Point::new(0, 0), Point::new(10, 10));
        assert_eq!(line.side_of(2.0, 5.0), Some(Side::Left));
        assert_eq!(line.side_of(8.0, 5.0), Some(Side::Right));
        assert_eq!(line.side_of(5.0, 5.0), None);
    }

    #[test]
    fn vertical_cut_erases_one_side_only() {
        let mut mask = Mask::filled(10, 4, BACKGROUND);
        let line = CutLine::new(Point::new(4, 3), Point::new(4, 0));
        mask.cut(&line, Side::Left);
        for y in 0..4 {
            for x in 0..10 {
                let expected = if x < 4 { FOREGROUND } else { BACKGROUND };
                assert_eq!(mask.get(x, y), expected, "pixel ({x},{y})");
            }
        }

        let mut mask = Mask::filled(10, 4, BACKGROUND);
        mask.cut(&line, Side::Right);
        assert_eq!(mask.get(4, 0), BACKGROUND);
        assert_eq!(mask.get(5, 0), FOREGROUND);
        assert!(mask.is_binary());
    }

    #[test]
    fn invert_and_or_stay_binary() {
        let mut a = Mask::filled(3, 1, BACKGROUND);
        a.cut(&CutLine::new(Point::new(1, 0), Point::new(1, 5)), Side::Left);
        let b = a.inverted();
        assert_eq!(b.count_value(FOREGROUND), 2);
        let merged = a.or(&b);
        assert_eq!(merged.count_value(FOREGROUND), 3);
        assert!(merged.is_binary());
    }
}
