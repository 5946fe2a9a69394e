//! Depth filter configuration.

/// Static configuration of the depth filter. All options are fixed after
/// construction.
#[derive(Debug, Clone)]
pub struct DepthFilterConfig {
    /// Seeds older than this many keyframe batches are discarded.
    /// Bounds the memory held by seeds that never converge.
    pub max_seed_age_keyframes: u64,

    /// Convergence threshold: a seed graduates once
    /// `sqrt(sigma2) < z_range / convergence_sigma2_thresh`.
    /// Lower values converge earlier but produce looser landmarks.
    pub convergence_sigma2_thresh: f32,

    /// Emit per-operation diagnostic logs.
    pub verbose: bool,
}

impl Default for DepthFilterConfig {
    fn default() -> Self {
        Self {
            max_seed_age_keyframes: 10,
            convergence_sigma2_thresh: 200.0,
            verbose: false,
        }
    }
}
