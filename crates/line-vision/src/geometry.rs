//! Planar helpers over integer pixel polygons: area, centroid, bounding
//! boxes and the minimum-area enclosing rectangle.

use imageproc::{geometry, point::Point};
use serde::Serialize;

pub type PixelPoint = Point<i32>;

/// Axis-aligned bounding box in pixel coordinates (inclusive origin,
/// exclusive far edge).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub fn from_points(points: &[PixelPoint]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Self {
            x: min_x,
            y: min_y,
            width: max_x - min_x + 1,
            height: max_y - min_y + 1,
        })
    }

    /// Column of the rightmost pixel.
    pub fn right(&self) -> i32 {
        self.x + self.width - 1
    }
}

/// Oriented rectangle returned by [`min_area_rect`].
///
/// `angle` is in degrees within `(0, 90]`; an axis-aligned rectangle reports
/// 90.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct RotatedRect {
    pub center: (f64, f64),
    pub size: (f64, f64),
    pub angle: f64,
}

impl RotatedRect {
    /// Corner points in floating point coordinates.
    pub fn corners(&self) -> [(f64, f64); 4] {
        let (u, v) = axes(self.angle);
        let (hw, hh) = (self.size.0 / 2.0, self.size.1 / 2.0);
        let (cx, cy) = self.center;
        let corner = |su: f64, sv: f64| {
            (
                cx + su * hw * u.0 + sv * hh * v.0,
                cy + su * hw * u.1 + sv * hh * v.1,
            )
        };
        [
            corner(-1.0, 1.0),
            corner(-1.0, -1.0),
            corner(1.0, -1.0),
            corner(1.0, 1.0),
        ]
    }

    /// Corner points truncated to integer pixels.
    pub fn box_points(&self) -> [PixelPoint; 4] {
        self.corners().map(|(x, y)| Point::new(x as i32, y as i32))
    }
}

/// Absolute polygon area by the shoelace formula.
pub fn polygon_area(points: &[PixelPoint]) -> f64 {
    signed_area(points).abs()
}

fn signed_area(points: &[PixelPoint]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice = 0i64;
    for (i, p) in points.iter().enumerate() {
        let q = points[(i + 1) % points.len()];
        twice += p.x as i64 * q.y as i64 - q.x as i64 * p.y as i64;
    }
    twice as f64 / 2.0
}

/// Centroid of the polygon's enclosed area, truncated to pixels.
///
/// Falls back to the mean of the vertices when the polygon has no area.
pub fn polygon_centroid(points: &[PixelPoint]) -> PixelPoint {
    if points.is_empty() {
        return Point::new(0, 0);
    }
    let area = signed_area(points);
    if area.abs() < f64::EPSILON {
        let n = points.len() as f64;
        let sx: f64 = points.iter().map(|p| p.x as f64).sum();
        let sy: f64 = points.iter().map(|p| p.y as f64).sum();
        return Point::new((sx / n) as i32, (sy / n) as i32);
    }

    let (mut cx, mut cy) = (0.0f64, 0.0f64);
    for (i, p) in points.iter().enumerate() {
        let q = points[(i + 1) % points.len()];
        let cross = p.x as f64 * q.y as f64 - q.x as f64 * p.y as f64;
        cx += (p.x + q.x) as f64 * cross;
        cy += (p.y + q.y) as f64 * cross;
    }
    let scale = 1.0 / (6.0 * area);
    Point::new((cx * scale) as i32, (cy * scale) as i32)
}

pub fn distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

pub fn point_distance(a: PixelPoint, b: PixelPoint) -> f64 {
    distance((a.x as f64, a.y as f64), (b.x as f64, b.y as f64))
}

/// Midpoint of two pixels, truncated.
pub fn midpoint(a: PixelPoint, b: PixelPoint) -> PixelPoint {
    Point::new(
        ((a.x as f64 + b.x as f64) / 2.0) as i32,
        ((a.y as f64 + b.y as f64) / 2.0) as i32,
    )
}

/// Smallest-area rectangle enclosing `points`.
///
/// Corners come from imageproc's rotating calipers, rounded outwards to whole
/// pixels; center, size and angle are read back from them.
pub fn min_area_rect(points: &[PixelPoint]) -> RotatedRect {
    let Some(&seed) = points.first() else {
        return RotatedRect {
            center: (0.0, 0.0),
            size: (0.0, 0.0),
            angle: 90.0,
        };
    };
    let corners = geometry::min_area_rect(points);
    let first = corners[0];
    // The diagonal is the longest span, so the nearest distinct corner is a side.
    let side = corners[1..]
        .iter()
        .filter(|p| **p != first)
        .min_by_key(|p| squared_distance(first, **p));
    match side {
        Some(p) => rect_along_edge(
            &corners,
            ((p.y - first.y) as f64).atan2((p.x - first.x) as f64),
        ),
        None => RotatedRect {
            center: (seed.x as f64, seed.y as f64),
            size: (0.0, 0.0),
            angle: 90.0,
        },
    }
}

fn squared_distance(a: PixelPoint, b: PixelPoint) -> i64 {
    let (dx, dy) = ((b.x - a.x) as i64, (b.y - a.y) as i64);
    dx * dx + dy * dy
}

/// Bounding rectangle of `corners` with one side along direction `theta`
/// (radians), reported with its angle folded into `(0, 90]`.
fn rect_along_edge(corners: &[PixelPoint], theta: f64) -> RotatedRect {
    let mut angle = theta.to_degrees().rem_euclid(90.0);
    if angle < 1e-6 || angle > 90.0 - 1e-6 {
        angle = 90.0;
    }
    let (u, v) = axes(angle);

    let (mut min_u, mut max_u) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut min_v, mut max_v) = (f64::INFINITY, f64::NEG_INFINITY);
    for p in corners {
        let (x, y) = (p.x as f64, p.y as f64);
        let pu = x * u.0 + y * u.1;
        let pv = x * v.0 + y * v.1;
        min_u = min_u.min(pu);
        max_u = max_u.max(pu);
        min_v = min_v.min(pv);
        max_v = max_v.max(pv);
    }

    let (mu, mv) = ((min_u + max_u) / 2.0, (min_v + max_v) / 2.0);
    RotatedRect {
        center: (mu * u.0 + mv * v.0, mu * u.1 + mv * v.1),
        size: (max_u - min_u, max_v - min_v),
        angle,
    }
}

/// Unit vectors along and across a rectangle at `angle` degrees.
fn axes(angle: f64) -> ((f64, f64), (f64, f64)) {
    if angle == 90.0 {
        return ((0.0, 1.0), (-1.0, 0.0));
    }
    let rad = angle.to_radians();
    ((rad.cos(), rad.sin()), (-rad.sin(), rad.cos()))
}
