//! Picks the line contour to follow, anchored on where the line was last
//! seen.

use thiserror::Error;

use crate::{
    contour::{LineContour, filter_by_area, outer_contours},
    geometry::distance,
    mask::Mask,
};

/// Minimum area of a line (black) contour.
pub const LINE_MIN_AREA: f64 = 5000.0;
/// Minimum area of a floor (gap) contour.
pub const GAP_MIN_AREA: f64 = 1000.0;
/// Starting anchor before any line has been seen.
pub const INITIAL_LINE_POSITION: (f64, f64) = (100.0, 100.0);

/// No line contour survived the area filter.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("no line contour above the area threshold")]
pub struct NoLineFound;

pub struct ContourTracker {
    last_position: (f64, f64),
}

impl Default for ContourTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ContourTracker {
    pub fn new() -> Self {
        Self {
            last_position: INITIAL_LINE_POSITION,
        }
    }

    pub fn last_position(&self) -> (f64, f64) {
        self.last_position
    }

    /// Floor regions of the line mask.
    pub fn gap_contours(&self, line_mask: &Mask) -> Vec<LineContour> {
        filter_by_area(outer_contours(line_mask.image()), GAP_MIN_AREA)
    }

    /// Line regions of the line mask, unfiltered.
    pub fn line_contours(&self, line_mask: &Mask) -> Vec<LineContour> {
        outer_contours(line_mask.inverted().image())
    }

    /// Drop contours at or below the line area threshold and order the rest
    /// by distance from the last position. Ties keep their input order.
    pub fn rank(&self, contours: Vec<LineContour>) -> Vec<LineContour> {
        let mut ranked: Vec<LineContour> = filter_by_area(contours, LINE_MIN_AREA)
            .into_iter()
            .map(|mut contour| {
                contour.distance = distance(contour.rect.center, self.last_position);
                contour
            })
            .collect();
        ranked.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        ranked
    }

    /// Choose the best contour and move the anchor to its rectangle center.
    pub fn choose(&mut self, contours: Vec<LineContour>) -> Result<LineContour, NoLineFound> {
        let chosen = self.rank(contours).into_iter().next().ok_or(NoLineFound)?;
        self.last_position = chosen.rect.center;
        Ok(chosen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{fill_rect, mask_with};

    fn line_mask(draw: impl FnOnce(&mut image::GrayImage)) -> Mask {
        Mask::new(mask_with(320, 240, 255, draw))
    }

    #[test]
    fn no_line_when_every_contour_is_small() {
        let mask = line_mask(|img| {
            fill_rect(img, 10, 10, 30, 30, 0);
            fill_rect(img, 200, 100, 50, 50, 0);
        });
        let mut tracker = ContourTracker::new();
        let contours = tracker.line_contours(&mask);
        assert_eq!(contours.len(), 2);
        assert_eq!(tracker.choose(contours).unwrap_err(), NoLineFound);
        assert_eq!(tracker.last_position(), INITIAL_LINE_POSITION);
    }

    #[test]
    fn ranking_is_sorted_and_filtered() {
        let mask = line_mask(|img| {
            fill_rect(img, 0, 0, 60, 240, 0);
            fill_rect(img, 100, 20, 10, 10, 0);
            fill_rect(img, 150, 0, 40, 240, 0);
            fill_rect(img, 260, 0, 60, 240, 0);
        });
        let tracker = ContourTracker::new();
        let ranked = tracker.rank(tracker.line_contours(&mask));
        assert_eq!(ranked.len(), 3);
        assert!(ranked.iter().all(|c| c.area > LINE_MIN_AREA));
        assert!(ranked.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn choice_follows_previous_position() {
        let mask = line_mask(|img| {
            fill_rect(img, 20, 0, 40, 240, 0);
            fill_rect(img, 240, 0, 40, 240, 0);
        });
        let mut tracker = ContourTracker::new();
        let first = tracker.choose(tracker.line_contours(&mask)).unwrap();
        assert!(first.rect.center.0 < 100.0);

        tracker.last_position = (300.0, 120.0);
        let second = tracker.choose(tracker.line_contours(&mask)).unwrap();
        assert!(second.rect.center.0 > 200.0);
        assert_eq!(tracker.last_position(), second.rect.center);
    }

    #[test]
    fn gaps_use_their_own_threshold() {
        let mask = line_mask(|img| fill_rect(img, 150, 0, 40, 240, 0));
        let tracker = ContourTracker::new();
        assert_eq!(tracker.gap_contours(&mask).len(), 2);
    }
}
