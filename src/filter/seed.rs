//! Seed - A probabilistic inverse-depth hypothesis.
//!
//! Each seed models the inverse depth of one 2D feature observation with a
//! Gaussian estimate `(mu, sigma2)` and a Beta-distributed inlier ratio
//! `(a, b)`, following Vogiatzis & Hernández, "Video-based, real-time
//! multi-view stereo".

use crate::frame::Feature;

/// Unique identifier for a Seed, assigned monotonically per filter instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeedId(pub u64);

impl std::fmt::Display for SeedId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "S{}", self.0)
    }
}

/// Identifier of the keyframe-initialization batch a seed belongs to.
///
/// Batches are numbered monotonically; the difference between the current
/// batch counter and a seed's batch id is the seed's age in keyframes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchId(pub u64);

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "B{}", self.0)
    }
}

/// A depth hypothesis attached to a reference-frame feature.
///
/// The estimate state is single precision on purpose; the update was tuned
/// in single precision and double precision shifts convergence behaviour
/// slightly.
#[derive(Debug, Clone)]
pub struct Seed {
    pub id: SeedId,
    pub batch_id: BatchId,
    /// The 2D observation this hypothesis refines. Exclusively owned by the
    /// seed; the embedded `Arc` keeps the reference frame alive.
    pub feature: Feature,
    /// Beta parameter: accumulated inlier evidence.
    pub a: f32,
    /// Beta parameter: accumulated outlier evidence.
    pub b: f32,
    /// Mean of the inverse-depth estimate.
    pub mu: f32,
    /// Prior range of inverse depth; width of the uniform outlier component.
    pub z_range: f32,
    /// Variance of the inverse-depth estimate.
    pub sigma2: f32,
}

impl Seed {
    /// Create a seed from a fresh observation and the keyframe's depth prior.
    pub fn new(
        id: SeedId,
        batch_id: BatchId,
        feature: Feature,
        depth_mean: f64,
        depth_min: f64,
    ) -> Self {
        let z_range = (1.0 / depth_min) as f32;
        Self {
            id,
            batch_id,
            feature,
            a: 10.0,
            b: 10.0,
            mu: (1.0 / depth_mean) as f32,
            z_range,
            sigma2: z_range * z_range / 36.0,
        }
    }

    /// Whether the estimate state satisfies the filter invariants.
    pub fn is_healthy(&self) -> bool {
        self.a > 0.0 && self.b > 0.0 && self.sigma2 > 0.0 && self.mu.is_finite()
    }
}
