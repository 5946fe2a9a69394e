//! Inverse-depth measurement model.
//!
//! Converts a matched epipolar observation into a measurement for the seed
//! update: the inverse depth `x = 1/z` and its variance `tau_inv^2`, where
//! `tau` is the one-sigma depth uncertainty caused by a one-pixel
//! reprojection error under the current epipolar geometry.

use nalgebra::Vector3;

use crate::geometry::SE3;

/// Floor for `z - tau` before inversion, keeps the variance finite when the
/// uncertainty interval reaches through zero depth.
const MIN_DEPTH: f64 = 1e-7;

/// An inverse-depth measurement ready for the seed update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InverseDepthMeasurement {
    /// Measured inverse depth, `1/z`.
    pub x: f32,
    /// Measurement variance, `tau_inv^2`.
    pub tau2: f32,
}

/// Angular error of one pixel: `2 * atan(1 / (2 * focal))`, the angle
/// subtended by a one-pixel chord at the focal distance.
pub fn px_error_angle(focal_length: f64) -> f64 {
    let px_noise = 1.0;
    (px_noise / (2.0 * focal_length)).atan() * 2.0
}

/// One-sigma depth uncertainty of a triangulated depth `z` along bearing `f`,
/// by the law of sines on the epipolar triangle.
///
/// `t_ref_cur` places current-frame points in reference-frame coordinates;
/// its translation is the baseline seen from the reference frame.
pub fn compute_tau(t_ref_cur: &SE3, f: &Vector3<f64>, z: f64, px_error_angle: f64) -> f64 {
    let t = t_ref_cur.translation;
    let a = f * z - t;
    let t_norm = t.norm();
    let a_norm = a.norm();
    let alpha = (f.dot(&t) / t_norm).acos();
    let beta = (a.dot(&-t) / (t_norm * a_norm)).acos();
    let beta_plus = beta + px_error_angle;
    let gamma_plus = std::f64::consts::PI - alpha - beta_plus;
    let z_plus = t_norm * beta_plus.sin() / gamma_plus.sin();
    z_plus - z
}

/// One-sigma uncertainty of the *inverse* depth for a depth uncertainty `tau`.
pub fn inverse_depth_sigma(z: f64, tau: f64) -> f64 {
    0.5 * (1.0 / MIN_DEPTH.max(z - tau) - 1.0 / (z + tau))
}

/// Build the full measurement for a matched depth `z`.
pub fn measure_inverse_depth(
    t_ref_cur: &SE3,
    f: &Vector3<f64>,
    z: f64,
    px_error_angle: f64,
) -> InverseDepthMeasurement {
    let tau = compute_tau(t_ref_cur, f, z, px_error_angle);
    let tau_inv = inverse_depth_sigma(z, tau);
    InverseDepthMeasurement {
        x: (1.0 / z) as f32,
        tau2: (tau_inv * tau_inv) as f32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    #[test]
    fn test_tau_matches_law_of_sines_closed_form() {
        let t_ref_cur = SE3::from_translation(Vector3::new(0.1, 0.0, 0.0));
        let f = Vector3::new(0.0, 0.0, 1.0);
        let z = 5.0;
        let angle = 1e-3;

        let tau = compute_tau(&t_ref_cur, &f, z, angle);

        // Recompute from the triangle: for this geometry alpha = 90 deg and
        // beta = atan(z / |t|).
        let t_norm = 0.1_f64;
        let alpha = std::f64::consts::FRAC_PI_2;
        let beta = (z / t_norm).atan();
        let beta_plus = beta + angle;
        let gamma_plus = std::f64::consts::PI - alpha - beta_plus;
        let expected = t_norm * beta_plus.sin() / gamma_plus.sin() - z;

        assert_relative_eq!(tau, expected, max_relative = 1e-9);
        assert!(tau > 0.0);
    }

    #[test]
    fn test_tau_shrinks_with_longer_baseline() {
        let f = Vector3::new(0.0, 0.0, 1.0);
        let angle = px_error_angle(320.0);
        let short = compute_tau(&SE3::from_translation(Vector3::new(0.05, 0.0, 0.0)), &f, 3.0, angle);
        let long = compute_tau(&SE3::from_translation(Vector3::new(0.5, 0.0, 0.0)), &f, 3.0, angle);
        assert!(long < short);
    }

    #[test]
    fn test_inverse_depth_sigma_is_symmetric_interval_halfwidth() {
        let z = 2.0;
        let tau = 0.1;
        let sigma = inverse_depth_sigma(z, tau);
        let expected = 0.5 * (1.0 / (z - tau) - 1.0 / (z + tau));
        assert_relative_eq!(sigma, expected, epsilon = 1e-15);
        assert!(sigma > 0.0);
    }

    #[test]
    fn test_inverse_depth_sigma_clamps_near_zero_depth() {
        // tau exceeds z: the near bound would cross zero depth.
        let sigma = inverse_depth_sigma(0.5, 1.0);
        assert!(sigma.is_finite());
        assert!(sigma > 0.0);
    }

    #[test]
    fn test_px_error_angle_small_angle() {
        // For focal lengths in the hundreds the chord angle is ~1/focal.
        let angle = px_error_angle(320.0);
        assert_relative_eq!(angle, 1.0 / 320.0, max_relative = 1e-5);
    }

    #[test]
    fn test_measurement_bundles_x_and_variance() {
        let t_ref_cur = SE3::from_translation(Vector3::new(0.2, 0.0, 0.0));
        let f = Vector3::new(0.0, 0.0, 1.0);
        let m = measure_inverse_depth(&t_ref_cur, &f, 2.0, px_error_angle(320.0));
        assert_relative_eq!(m.x, 0.5, epsilon = 1e-6);
        assert!(m.tau2 > 0.0);
    }
}
