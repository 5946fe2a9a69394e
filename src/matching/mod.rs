//! Epipolar matching interface.

use nalgebra::Vector2;

use crate::frame::{Feature, Frame};

/// Result of a successful epipolar search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpipolarMatch {
    /// Depth of the matched point along the reference feature's bearing.
    pub depth: f64,
    /// Matched pixel position in the current frame (level 0 coordinates).
    pub px_cur: Vector2<f64>,
    /// Pyramid level the match was found on.
    pub search_level: usize,
}

/// Epipolar matching collaborator.
///
/// Searches along the epipolar line in `cur_frame` for the patch around
/// `ref_feature`, constrained to the depth interval `[depth_min, depth_max]`
/// around the estimate `depth_est`. Implementations hold internal scratch
/// state (warped patches, zero-mean templates) and are not reentrant; the
/// filter drives them from a single thread.
pub trait Matcher: Send {
    fn find_epipolar_match(
        &mut self,
        ref_frame: &Frame,
        cur_frame: &Frame,
        ref_feature: &Feature,
        depth_est: f64,
        depth_min: f64,
        depth_max: f64,
    ) -> Option<EpipolarMatch>;
}
