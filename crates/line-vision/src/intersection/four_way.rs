//! Four gap regions: a plus crossing. The robot always goes straight, so
//! both side arms are cut away.

use super::{
    Decision, IntersectionResolver, IntersectionState, SIMPLIFY_EPSILON, SPLIT_EDGE_MARGIN, Step,
    centroid_of, nearest_to,
};
use crate::{
    contour::LineContour,
    geometry::PixelPoint,
    mask::{CutLine, Mask, Side},
};

impl IntersectionResolver {
    pub(super) fn four_way(&mut self, gaps: [&LineContour; 4], mask: &mut Mask) -> Option<Step> {
        let mut gaps = gaps;
        gaps.sort_by_key(|gap| gap.center.x);
        let center = centroid_of(&gaps);
        let height = mask.height() as i32;

        let (left_bottom, left_top) = inner_corners([gaps[0], gaps[1]], center, height)?;
        let (right_bottom, right_top) = inner_corners([gaps[2], gaps[3]], center, height)?;

        mask.cut(&CutLine::new(left_bottom, left_top), Side::Left);
        mask.cut(&CutLine::new(right_bottom, right_top), Side::Right);
        self.state = IntersectionState::FourWay;
        Step::cut(Decision::FourWay)
    }
}

/// Bottom and top corners nearest `center` for one column of the crossing.
///
/// A top corner on the top edge is replaced by the bottom corner, which in
/// turn becomes the next bottom-gap corner in x. The bottom edge is handled
/// the same way in reverse.
fn inner_corners(
    pair: [&LineContour; 2],
    center: PixelPoint,
    height: i32,
) -> Option<(PixelPoint, PixelPoint)> {
    let mut pair = pair;
    pair.sort_by(|a, b| b.center.y.cmp(&a.center.y));
    let [bottom_gap, top_gap] = pair;

    let bottom_corners = bottom_gap.simplified(SIMPLIFY_EPSILON);
    let top_corners = top_gap.simplified(SIMPLIFY_EPSILON);
    let mut bottom = nearest_to(&bottom_corners, center)?;
    let mut top = nearest_to(&top_corners, center)?;

    if top.y < SPLIT_EDGE_MARGIN {
        if let Some(next) = nth_nearest_in_x(&bottom_corners, bottom.x, 1) {
            top = bottom;
            bottom = next;
        }
    } else if bottom.y > height - SPLIT_EDGE_MARGIN {
        if let Some(next) = nth_nearest_in_x(&top_corners, top.x, 1) {
            bottom = top;
            top = next;
        }
    }
    Some((bottom, top))
}

fn nth_nearest_in_x(points: &[PixelPoint], x: i32, n: usize) -> Option<PixelPoint> {
    let mut sorted = points.to_vec();
    sorted.sort_by_key(|p| (p.x - x).abs());
    sorted.get(n).copied()
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::{
        mask::{BACKGROUND, FOREGROUND},
        test_utils::{fill_rect, four_way_mask, mask_with},
        tracker::ContourTracker,
    };

    #[test]
    fn crossing_leaves_one_straight_path() {
        let mask = Mask::new(four_way_mask());
        let tracker = ContourTracker::new();
        let gaps = tracker.gap_contours(&mask);
        assert_eq!(gaps.len(), 4);

        let mut resolver = IntersectionResolver::new();
        let resolution = resolver.resolve(&gaps, &mask, Instant::now());
        assert_eq!(resolution.decision, Some(Decision::FourWay));
        assert_eq!(resolver.state(), IntersectionState::FourWay);

        let cut = resolution.mask.unwrap();
        assert_eq!(tracker.line_contours(&cut).len(), 1);
        // Side arms gone, vertical path kept.
        assert_eq!(cut.get(5, 150), FOREGROUND);
        assert_eq!(cut.get(295, 150), FOREGROUND);
        assert_eq!(cut.get(150, 5), BACKGROUND);
        assert_eq!(cut.get(150, 295), BACKGROUND);
    }

    #[test]
    fn top_edge_corner_is_swapped_for_the_bottom_corner() {
        // One column: the top gap touches the top edge.
        let mask = Mask::new(mask_with(300, 300, 0, |img| {
            fill_rect(img, 20, 0, 100, 60, 255);
            fill_rect(img, 20, 180, 100, 100, 255);
        }));
        let gaps = ContourTracker::new().gap_contours(&mask);
        assert_eq!(gaps.len(), 2);
        let (bottom, top) =
            inner_corners([&gaps[0], &gaps[1]], PixelPoint::new(150, 0), 300).unwrap();
        assert_eq!(top, PixelPoint::new(119, 180));
        assert_eq!(bottom.x, 119);
    }

    #[test]
    fn nth_nearest_orders_by_horizontal_distance() {
        let points = [
            PixelPoint::new(50, 0),
            PixelPoint::new(12, 0),
            PixelPoint::new(9, 0),
        ];
        assert_eq!(nth_nearest_in_x(&points, 10, 0), Some(PixelPoint::new(9, 0)));
        assert_eq!(nth_nearest_in_x(&points, 10, 1), Some(PixelPoint::new(12, 0)));
        assert_eq!(nth_nearest_in_x(&points, 10, 3), None);
    }
}
