//! Coloured turn markers.
//!
//! A frame with enough marker pixels is handed to a [`MarkerHandler`]
//! instead of the intersection resolver. Turning on markers is left to the
//! handler; the default only records the sighting.

use tracing::debug;

use crate::mask::Mask;

/// Marker pixel count above which a frame counts as showing a marker.
pub const MARKER_MIN_PIXELS: usize = 2000;

pub trait MarkerHandler: Send {
    /// Called once per frame in which a marker is visible. `marker` is 0
    /// where the marker colour was found.
    fn on_marker(&mut self, marker: &Mask, marker_pixels: usize);
}

/// Handler that logs and otherwise does nothing.
#[derive(Debug, Default)]
pub struct IgnoreMarkers;

impl MarkerHandler for IgnoreMarkers {
    fn on_marker(&mut self, _marker: &Mask, marker_pixels: usize) {
        debug!("marker in view ({marker_pixels} px), intersection cutting suspended");
        metrics::counter!("line_vision_marker_frames_total").increment(1);
    }
}
