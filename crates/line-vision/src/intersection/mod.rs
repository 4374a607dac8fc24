//! Intersection handling.
//!
//! The number of floor (gap) regions in the line mask tells how many
//! branches meet in view. When there is more than one candidate branch the
//! resolver erases part of the mask along a straight line so the tracker is
//! left with a single unambiguous path. State carries across frames so that
//! entering, holding and leaving a junction are handled consistently.

mod four_way;
mod three_way;
mod two_way;

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

use crate::{
    contour::LineContour,
    geometry::{PixelPoint, point_distance},
    mask::Mask,
};

/// Gap regions at or below this area are ignored when counting branches.
pub const INTERSECTION_GAP_MIN_AREA: f64 = 500.0;
/// Time a one-sided 2-way entry keeps cutting before it is abandoned.
pub const TWO_WAY_COOLDOWN: Duration = Duration::from_secs(2);
/// Douglas-Peucker epsilon as a fraction of the perimeter.
pub const SIMPLIFY_EPSILON: f64 = 0.03;

/// Cutter points closer than this to the top or bottom row count as touching it.
pub(crate) const EDGE_MARGIN: i32 = 3;
/// Split points closer than this to the top or bottom row get substituted.
pub(crate) const SPLIT_EDGE_MARGIN: i32 = 10;
/// Through regions smaller than this that touch the bottom flip the cut.
pub(crate) const SMALL_THROUGH_AREA: f64 = 7000.0;

/// Where the robot is relative to a junction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum IntersectionState {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "2-way-entering")]
    TwoWayEntering,
    #[serde(rename = "2-way-branch")]
    TwoWayBranch,
    #[serde(rename = "2-way-exiting-3-way")]
    TwoWayExitingThreeWay,
    #[serde(rename = "2-way-exiting-4-way")]
    TwoWayExitingFourWay,
    #[serde(rename = "3-way-entering")]
    ThreeWayEntering,
    #[serde(rename = "3-way")]
    ThreeWay,
    #[serde(rename = "3-way-exiting-4-way")]
    ThreeWayExitingFourWay,
    #[serde(rename = "4-way")]
    FourWay,
}

impl IntersectionState {
    pub fn label(&self) -> &'static str {
        match self {
            IntersectionState::None => "none",
            IntersectionState::TwoWayEntering => "2-way-entering",
            IntersectionState::TwoWayBranch => "2-way-branch",
            IntersectionState::TwoWayExitingThreeWay => "2-way-exiting-3-way",
            IntersectionState::TwoWayExitingFourWay => "2-way-exiting-4-way",
            IntersectionState::ThreeWayEntering => "3-way-entering",
            IntersectionState::ThreeWay => "3-way",
            IntersectionState::ThreeWayExitingFourWay => "3-way-exiting-4-way",
            IntersectionState::FourWay => "4-way",
        }
    }

    /// States reached from a 3-way or 4-way junction, or on the way out of one.
    pub fn derives_from_larger(&self) -> bool {
        !matches!(
            self,
            IntersectionState::None
                | IntersectionState::TwoWayEntering
                | IntersectionState::TwoWayBranch
        )
    }

    pub fn is_two_way(&self) -> bool {
        matches!(
            self,
            IntersectionState::TwoWayEntering
                | IntersectionState::TwoWayBranch
                | IntersectionState::TwoWayExitingThreeWay
                | IntersectionState::TwoWayExitingFourWay
        )
    }
}

/// What the resolver did on one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Decision {
    #[serde(rename = "2-way-entering")]
    TwoWayEntering,
    #[serde(rename = "2-way-cooldown-expired")]
    TwoWayCooldownExpired,
    #[serde(rename = "2-way-branch")]
    TwoWayBranch,
    #[serde(rename = "2-way-exiting-larger")]
    TwoWayExitingLarger,
    #[serde(rename = "2-way-exited")]
    TwoWayExited,
    #[serde(rename = "2-way-forked")]
    TwoWayForked,
    #[serde(rename = "2-way-holding")]
    TwoWayHolding,
    #[serde(rename = "3-way")]
    ThreeWay,
    #[serde(rename = "4-way")]
    FourWay,
}

impl Decision {
    pub fn label(&self) -> &'static str {
        match self {
            Decision::TwoWayEntering => "2-way-entering",
            Decision::TwoWayCooldownExpired => "2-way-cooldown-expired",
            Decision::TwoWayBranch => "2-way-branch",
            Decision::TwoWayExitingLarger => "2-way-exiting-larger",
            Decision::TwoWayExited => "2-way-exited",
            Decision::TwoWayForked => "2-way-forked",
            Decision::TwoWayHolding => "2-way-holding",
            Decision::ThreeWay => "3-way",
            Decision::FourWay => "4-way",
        }
    }
}

/// Outcome of [`IntersectionResolver::resolve`].
#[derive(Clone, Debug, Default)]
pub struct Resolution {
    pub decision: Option<Decision>,
    /// The line mask after cutting, present only when a cut was made.
    pub mask: Option<Mask>,
}

/// Result of one junction handler: the decision taken and whether the
/// working mask was cut.
pub(crate) struct Step {
    decision: Decision,
    cut: bool,
}

impl Step {
    fn cut(decision: Decision) -> Option<Step> {
        Some(Step {
            decision,
            cut: true,
        })
    }

    fn keep(decision: Decision) -> Option<Step> {
        Some(Step {
            decision,
            cut: false,
        })
    }
}

#[derive(Debug, Default)]
pub struct IntersectionResolver {
    state: IntersectionState,
    cooldown_started: Option<Instant>,
}

impl IntersectionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> IntersectionState {
        self.state
    }

    pub fn cooldown_started(&self) -> Option<Instant> {
        self.cooldown_started
    }

    /// Inspect the gap contours of `line_mask` and cut the mask when they
    /// describe a junction.
    pub fn resolve(&mut self, gaps: &[LineContour], line_mask: &Mask, now: Instant) -> Resolution {
        let gaps: Vec<&LineContour> = gaps
            .iter()
            .filter(|gap| gap.area > INTERSECTION_GAP_MIN_AREA)
            .collect();

        let mut mask = line_mask.clone();
        let previous = self.state;
        let step = match gaps.as_slice() {
            &[a, b] => self.two_way([a, b], &mut mask, now),
            &[a, b, c] => self.three_way([a, b, c], &mut mask),
            &[a, b, c, d] => self.four_way([a, b, c, d], &mut mask),
            _ => None,
        };

        let Some(step) = step else {
            return Resolution::default();
        };
        if self.state != previous {
            debug!(
                "intersection state {} -> {} ({})",
                previous.label(),
                self.state.label(),
                step.decision.label()
            );
        }
        if step.cut {
            metrics::counter!("line_vision_intersection_cuts_total", "decision" => step.decision.label())
                .increment(1);
        }
        Resolution {
            decision: Some(step.decision),
            mask: step.cut.then_some(mask),
        }
    }
}

/// Integer mean of the gap centers.
fn centroid_of(gaps: &[&LineContour]) -> PixelPoint {
    let n = gaps.len().max(1) as f64;
    let (sx, sy) = gaps.iter().fold((0.0, 0.0), |(sx, sy), gap| {
        (sx + gap.center.x as f64, sy + gap.center.y as f64)
    });
    PixelPoint::new((sx / n) as i32, (sy / n) as i32)
}

/// First point of `points` nearest to `target`.
fn nearest_to(points: &[PixelPoint], target: PixelPoint) -> Option<PixelPoint> {
    points
        .iter()
        .copied()
        .reduce(|best, p| {
            if point_distance(p, target) < point_distance(best, target) {
                p
            } else {
                best
            }
        })
}
