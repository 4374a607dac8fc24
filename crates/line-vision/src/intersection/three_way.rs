//! Three gap regions: a T or Y junction.
//!
//! The two gap corners nearest the junction center define the split line;
//! the remaining gap is the "through" region whose shape decides which side
//! of the split gets erased.

use super::{
    Decision, IntersectionResolver, IntersectionState, SIMPLIFY_EPSILON, SMALL_THROUGH_AREA,
    SPLIT_EDGE_MARGIN, Step, centroid_of, nearest_to,
};
use crate::{
    contour::{Edges, LineContour},
    geometry::{PixelPoint, point_distance},
    mask::{CutLine, Mask, Side},
};

/// A split point and the index of the gap it came from.
type Anchor = (PixelPoint, usize);

impl IntersectionResolver {
    pub(super) fn three_way(&mut self, gaps: [&LineContour; 3], mask: &mut Mask) -> Option<Step> {
        self.state = match self.state {
            IntersectionState::None => IntersectionState::ThreeWayEntering,
            two_way if two_way.is_two_way() => IntersectionState::ThreeWayEntering,
            IntersectionState::FourWay => IntersectionState::ThreeWayExitingFourWay,
            three_way => three_way,
        };

        let mut gaps = gaps;
        gaps.sort_by_key(|gap| gap.center.x);
        let corners: Vec<Vec<PixelPoint>> = gaps
            .iter()
            .map(|gap| gap.simplified(SIMPLIFY_EPSILON))
            .collect();
        let center = centroid_of(&gaps);

        let mut anchors = corners
            .iter()
            .enumerate()
            .map(|(index, points)| nearest_to(points, center).map(|p| (p, index)))
            .collect::<Option<Vec<Anchor>>>()?;
        anchors.sort_by(|a, b| point_distance(a.0, center).total_cmp(&point_distance(b.0, center)));
        let through = gaps[anchors[2].1];

        let split = away_from_edges([anchors[0], anchors[1]], &corners, mask.height() as i32);
        let line = CutLine::new(split[0].0, split[1].0);

        let mut side = majority_side(&line, &gaps);
        let edges = through.touching_edges(mask.width(), mask.height());
        let invert = match self.state {
            IntersectionState::ThreeWayEntering if edges.count() >= 2 && !edges.bottom => true,
            IntersectionState::ThreeWayExitingFourWay => true,
            _ => {
                self.state = IntersectionState::ThreeWay;
                edges == Edges::BOTTOM_LEFT_RIGHT
                    || edges == Edges::LEFT_RIGHT_TOP
                    || (through.area < SMALL_THROUGH_AREA && edges.bottom)
            }
        };
        if invert {
            side = opposite(side);
        }

        mask.cut(&line, side);
        Step::cut(Decision::ThreeWay)
    }
}

/// Ordered top to bottom. A point hugging the top or bottom edge is replaced
/// by the corner of the other gap closest to the other point in x. Edge
/// checks use the points as they were before any replacement.
fn away_from_edges(mut split: [Anchor; 2], corners: &[Vec<PixelPoint>], height: i32) -> [Anchor; 2] {
    split.sort_by_key(|(p, _)| p.y);
    let initial = split;
    for (i, (point, _)) in initial.into_iter().enumerate() {
        if point.y >= SPLIT_EDGE_MARGIN && point.y <= height - SPLIT_EDGE_MARGIN {
            continue;
        }
        let (other, other_gap) = split[1 - i];
        let replacement = corners[other_gap]
            .iter()
            .copied()
            .filter(|p| *p != split[0].0 && *p != split[1].0)
            .min_by_key(|p| (p.x - other.x).abs());
        if let Some(replacement) = replacement {
            split[i] = (replacement, other_gap);
            split.sort_by_key(|(p, _)| p.y);
        }
    }
    split
}

/// Side of `line` holding more gap centers. Ties and centers on the line
/// count as right.
fn majority_side(line: &CutLine, gaps: &[&LineContour]) -> Side {
    let left = gaps
        .iter()
        .filter(|gap| {
            line.side_of(gap.center.x as f64, gap.center.y as f64) == Some(Side::Left)
        })
        .count();
    if left * 2 > gaps.len() {
        Side::Left
    } else {
        Side::Right
    }
}

fn opposite(side: Side) -> Side {
    match side {
        Side::Left => Side::Right,
        Side::Right => Side::Left,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mask::{BACKGROUND, FOREGROUND},
        test_utils::t_junction_mask,
        tracker::ContourTracker,
    };
    use std::time::Instant;

    #[test]
    fn t_junction_from_none_is_entering() {
        let mask = Mask::new(t_junction_mask());
        let gaps = ContourTracker::new().gap_contours(&mask);
        assert_eq!(gaps.len(), 3);

        let mut resolver = IntersectionResolver::new();
        let resolution = resolver.resolve(&gaps, &mask, Instant::now());
        assert_eq!(resolution.decision, Some(Decision::ThreeWay));
        assert_eq!(resolver.state(), IntersectionState::ThreeWayEntering);

        // Entering follows the stem: the bar above the split is erased.
        let cut = resolution.mask.unwrap();
        assert_eq!(cut.get(20, 80), FOREGROUND);
        assert_eq!(cut.get(150, 80), FOREGROUND);
        assert_eq!(cut.get(280, 80), FOREGROUND);
        assert_eq!(cut.get(150, 150), BACKGROUND);
        assert_eq!(cut.get(150, 199), BACKGROUND);
    }

    #[test]
    fn coming_out_of_a_four_way() {
        let mask = Mask::new(t_junction_mask());
        let gaps = ContourTracker::new().gap_contours(&mask);
        let mut resolver = IntersectionResolver::new();
        resolver.state = IntersectionState::FourWay;
        resolver.resolve(&gaps, &mask, Instant::now());
        assert_eq!(resolver.state(), IntersectionState::ThreeWayExitingFourWay);

        resolver.state = IntersectionState::TwoWayBranch;
        resolver.resolve(&gaps, &mask, Instant::now());
        assert_eq!(resolver.state(), IntersectionState::ThreeWayEntering);
    }

    #[test]
    fn settled_three_way_inverts_for_a_bar_through_region() {
        let mask = Mask::new(t_junction_mask());
        let gaps = ContourTracker::new().gap_contours(&mask);
        let mut resolver = IntersectionResolver::new();
        resolver.state = IntersectionState::ThreeWay;
        let resolution = resolver.resolve(&gaps, &mask, Instant::now());
        assert_eq!(resolver.state(), IntersectionState::ThreeWay);
        assert_eq!(resolution.mask.unwrap().get(20, 80), FOREGROUND);
    }

    #[test]
    fn edge_points_are_replaced() {
        let corners = vec![
            vec![PixelPoint::new(0, 0), PixelPoint::new(100, 5), PixelPoint::new(100, 60)],
            vec![PixelPoint::new(120, 40), PixelPoint::new(140, 150), PixelPoint::new(300, 40)],
        ];
        let split = away_from_edges(
            [(PixelPoint::new(100, 5), 0), (PixelPoint::new(120, 40), 1)],
            &corners,
            200,
        );
        assert_eq!(split, [(PixelPoint::new(120, 40), 1), (PixelPoint::new(140, 150), 1)]);
    }

    #[test]
    fn points_inside_the_margin_are_kept() {
        let corners = vec![vec![PixelPoint::new(10, 50)], vec![PixelPoint::new(60, 80)]];
        let split = [(PixelPoint::new(10, 50), 0), (PixelPoint::new(60, 80), 1)];
        assert_eq!(away_from_edges(split, &corners, 200), split);
    }
}
