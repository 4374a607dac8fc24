//! Contour extraction and the per-contour record used by the tracker and the
//! intersection resolver.

use image::GrayImage;
use imageproc::{
    contours::{BorderType, find_contours},
    geometry::{approximate_polygon_dp, arc_length},
};
use serde::Serialize;

use crate::geometry::{
    BoundingBox, PixelPoint, RotatedRect, min_area_rect, polygon_area, polygon_centroid,
};

/// Image borders a contour touches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Edges {
    pub top: bool,
    pub bottom: bool,
    pub left: bool,
    pub right: bool,
}

impl Edges {
    pub const BOTTOM_LEFT_RIGHT: Edges = Edges {
        top: false,
        bottom: true,
        left: true,
        right: true,
    };
    pub const LEFT_RIGHT_TOP: Edges = Edges {
        top: true,
        bottom: false,
        left: true,
        right: true,
    };

    pub fn count(&self) -> usize {
        [self.top, self.bottom, self.left, self.right]
            .iter()
            .filter(|touched| **touched)
            .count()
    }
}

/// A closed outer border with its derived measurements.
#[derive(Clone, Debug)]
pub struct LineContour {
    pub polygon: Vec<PixelPoint>,
    pub area: f64,
    pub rect: RotatedRect,
    /// Area centroid, truncated to pixels.
    pub center: PixelPoint,
    /// Distance from the rectangle center to the tracker's last position.
    /// Zero until ranked.
    pub distance: f64,
}

impl LineContour {
    pub fn new(polygon: Vec<PixelPoint>) -> Self {
        let area = polygon_area(&polygon);
        let rect = min_area_rect(&polygon);
        let center = polygon_centroid(&polygon);
        Self {
            polygon,
            area,
            rect,
            center,
            distance: 0.0,
        }
    }

    /// Douglas-Peucker simplification with `epsilon` as a fraction of the
    /// perimeter.
    pub fn simplified(&self, epsilon_fraction: f64) -> Vec<PixelPoint> {
        if self.polygon.len() < 3 {
            return self.polygon.clone();
        }
        let epsilon = epsilon_fraction * arc_length(&self.polygon, true);
        if epsilon <= 0.0 {
            return self.polygon.clone();
        }
        let simplified = drop_adjacent(approximate_polygon_dp(&self.polygon, epsilon, true));
        if simplified.is_empty() {
            self.polygon.clone()
        } else {
            simplified
        }
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(&self.polygon)
    }

    pub fn touching_edges(&self, width: u32, height: u32) -> Edges {
        touching_edges(&self.polygon, width, height)
    }
}

pub fn touching_edges(points: &[PixelPoint], width: u32, height: u32) -> Edges {
    let (max_x, max_y) = (width as i32 - 1, height as i32 - 1);
    let mut edges = Edges::default();
    for p in points {
        edges.left |= p.x == 0;
        edges.right |= p.x == max_x;
        edges.top |= p.y == 0;
        edges.bottom |= p.y == max_y;
    }
    edges
}

/// Remove vertices that sit next to the previously kept one, including the
/// wrap-around from last to first.
fn drop_adjacent(points: Vec<PixelPoint>) -> Vec<PixelPoint> {
    let adjacent = |a: PixelPoint, b: PixelPoint| (a.x - b.x).abs() <= 1 && (a.y - b.y).abs() <= 1;
    let mut kept: Vec<PixelPoint> = Vec::with_capacity(points.len());
    for p in points {
        if kept.last().is_some_and(|&q| adjacent(p, q)) {
            continue;
        }
        kept.push(p);
    }
    while kept.len() > 2 && adjacent(kept[0], kept[kept.len() - 1]) {
        kept.pop();
    }
    kept
}

/// Outer borders of the non-zero regions of `mask`.
pub fn outer_contours(mask: &GrayImage) -> Vec<LineContour> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|contour| contour.border_type == BorderType::Outer)
        .map(|contour| LineContour::new(contour.points))
        .collect()
}

/// Keep contours whose area strictly exceeds `min_area`.
pub fn filter_by_area(contours: Vec<LineContour>, min_area: f64) -> Vec<LineContour> {
    contours
        .into_iter()
        .filter(|contour| contour.area > min_area)
        .collect()
}
