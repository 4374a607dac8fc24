//! Two gap regions: either a branch leaving the line or the tail end of a
//! larger junction.

use std::time::Instant;

use super::{
    Decision, EDGE_MARGIN, IntersectionResolver, IntersectionState, SIMPLIFY_EPSILON, Step,
    TWO_WAY_COOLDOWN,
};
use crate::{
    contour::LineContour,
    geometry::{PixelPoint, midpoint},
    mask::{CutLine, Mask, Side},
};

/// The corner pairs that bound the line between two gaps, each ordered
/// top to bottom.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Cutters {
    /// Leftmost corners of the right-hand gap.
    left: [PixelPoint; 2],
    /// Rightmost corners of the left-hand gap.
    right: [PixelPoint; 2],
}

impl Cutters {
    fn new(left_gap: &[PixelPoint], right_gap: &[PixelPoint]) -> Option<Self> {
        Some(Self {
            left: extreme_pair(right_gap, |p| p.x)?,
            right: extreme_pair(left_gap, |p| -p.x)?,
        })
    }

    /// The gaps have swapped sides: the right gap's inner edge lies left of
    /// the left gap's inner edge.
    fn crossed(&self) -> bool {
        midpoint(self.left[0], self.left[1]).x < midpoint(self.right[0], self.right[1]).x
    }

    fn tops(&self) -> (i32, i32) {
        (self.left[0].y, self.right[0].y)
    }

    fn bottoms(&self) -> (i32, i32) {
        (self.left[1].y, self.right[1].y)
    }

    /// Erase everything right of the left cutter and left of the right cutter.
    fn cut(&self, mask: &mut Mask) {
        mask.cut(&CutLine::new(self.left[1], self.left[0]), Side::Right);
        mask.cut(&CutLine::new(self.right[0], self.right[1]), Side::Left);
    }
}

/// The two points with the smallest `key`, in input order among equals,
/// then ordered by row.
fn extreme_pair(points: &[PixelPoint], key: impl Fn(&PixelPoint) -> i32) -> Option<[PixelPoint; 2]> {
    let mut sorted = points.to_vec();
    sorted.sort_by_key(|p| key(p));
    let mut pair = [*sorted.first()?, *sorted.get(1)?];
    pair.sort_by_key(|p| p.y);
    Some(pair)
}

impl IntersectionResolver {
    pub(super) fn two_way(
        &mut self,
        gaps: [&LineContour; 2],
        mask: &mut Mask,
        now: Instant,
    ) -> Option<Step> {
        let [mut left, mut right] = gaps;
        if (left.center.x, left.center.y) > (right.center.x, right.center.y) {
            std::mem::swap(&mut left, &mut right);
        }
        let cutters = Cutters::new(
            &left.simplified(SIMPLIFY_EPSILON),
            &right.simplified(SIMPLIFY_EPSILON),
        )?;

        let bottom_row = mask.height() as i32 - EDGE_MARGIN;
        let crossed = cutters.crossed();
        let (left_top, right_top) = cutters.tops();
        let (left_bottom, right_bottom) = cutters.bottoms();

        if self.state == IntersectionState::None {
            let one_side_at_top = (left_top > EDGE_MARGIN && right_top < EDGE_MARGIN)
                || (left_top < EDGE_MARGIN && right_top > EDGE_MARGIN);
            if one_side_at_top && !crossed {
                let started = *self.cooldown_started.get_or_insert(now);
                if now.saturating_duration_since(started) < TWO_WAY_COOLDOWN {
                    cutters.cut(mask);
                    self.state = IntersectionState::TwoWayEntering;
                    return Step::cut(Decision::TwoWayEntering);
                }
                return Step::keep(Decision::TwoWayCooldownExpired);
            }
            if left_top > EDGE_MARGIN && right_top > EDGE_MARGIN {
                cutters.cut(mask);
                self.state = IntersectionState::TwoWayBranch;
                self.cooldown_started = None;
                return Step::cut(Decision::TwoWayBranch);
            }
            return None;
        }

        if (left_bottom < bottom_row || right_bottom < bottom_row) && self.state.derives_from_larger()
        {
            self.state = match self.state {
                IntersectionState::ThreeWayEntering
                | IntersectionState::ThreeWay
                | IntersectionState::ThreeWayExitingFourWay => {
                    IntersectionState::TwoWayExitingThreeWay
                }
                IntersectionState::FourWay => IntersectionState::TwoWayExitingFourWay,
                exiting => exiting,
            };
            cutters.cut(mask);
            return Step::cut(Decision::TwoWayExitingLarger);
        }

        let both_at_top = left_top < EDGE_MARGIN && right_top < EDGE_MARGIN;
        let both_at_bottom = left_bottom > bottom_row && right_bottom > bottom_row;
        if both_at_top || both_at_bottom {
            self.state = IntersectionState::None;
            self.cooldown_started = None;
            return Step::keep(Decision::TwoWayExited);
        }
        if crossed {
            self.state = IntersectionState::None;
            self.cooldown_started = None;
            return Step::keep(Decision::TwoWayForked);
        }

        cutters.cut(mask);
        Step::cut(Decision::TwoWayHolding)
    }
}
