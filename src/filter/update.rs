//! Vogiatzis-Hernández seed update.
//!
//! Moment-matched posterior of the Gaussian x Beta-Uniform mixture model: a
//! measurement is either an inlier drawn from a Gaussian around the true
//! inverse depth, or an outlier drawn uniformly from the prior range. All
//! arithmetic is single precision; the filter was tuned that way and double
//! precision shifts the convergence behaviour slightly.

use super::seed::Seed;

/// Gaussian probability density at `x`.
fn gaussian_pdf(mean: f32, sigma: f32, x: f32) -> f32 {
    let e = x - mean;
    (-e * e / (2.0 * sigma * sigma)).exp() / (sigma * (2.0 * std::f32::consts::PI).sqrt())
}

/// Fuse one measurement `x` with variance `tau2` into the seed's estimate.
///
/// If the combined scale `sqrt(sigma2 + tau2)` is NaN the seed is left
/// unmodified; the caller skips the measurement.
pub fn update_seed(seed: &mut Seed, x: f32, tau2: f32) {
    let norm_scale = (seed.sigma2 + tau2).sqrt();
    if norm_scale.is_nan() {
        return;
    }

    let s2 = 1.0 / (1.0 / seed.sigma2 + 1.0 / tau2);
    let m = s2 * (seed.mu / seed.sigma2 + x / tau2);
    let mut c1 = seed.a / (seed.a + seed.b) * gaussian_pdf(seed.mu, norm_scale, x);
    let mut c2 = seed.b / (seed.a + seed.b) * (1.0 / seed.z_range);
    let normalization_constant = c1 + c2;
    c1 /= normalization_constant;
    c2 /= normalization_constant;

    let f = c1 * (seed.a + 1.0) / (seed.a + seed.b + 1.0)
        + c2 * seed.a / (seed.a + seed.b + 1.0);
    let e = c1 * (seed.a + 1.0) * (seed.a + 2.0)
        / ((seed.a + seed.b + 1.0) * (seed.a + seed.b + 2.0))
        + c2 * seed.a * (seed.a + 1.0) / ((seed.a + seed.b + 1.0) * (seed.a + seed.b + 2.0));

    let mu_new = c1 * m + c2 * seed.mu;
    seed.sigma2 = c1 * (s2 + m * m) + c2 * (seed.sigma2 + seed.mu * seed.mu) - mu_new * mu_new;
    seed.mu = mu_new;
    seed.a = (e - f) / (f - e / f);
    seed.b = seed.a * (1.0 - f) / f;
}
