//! SE(3) rigid-body transforms.
//!
//! Poses follow the `T_target_source` naming convention: `T_f_w` maps a point
//! from world coordinates into frame coordinates, `p_f = T_f_w * p_w`.

use nalgebra::{UnitQuaternion, Vector3};

/// A rigid-body transform: rotation followed by translation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SE3 {
    pub rotation: UnitQuaternion<f64>,
    pub translation: Vector3<f64>,
}

impl SE3 {
    /// Create a transform from a rotation and a translation.
    pub fn new(rotation: UnitQuaternion<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// The identity transform.
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// A pure translation.
    pub fn from_translation(translation: Vector3<f64>) -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation,
        }
    }

    /// Compose two transforms: `self * other`.
    ///
    /// Applying the result to a point first applies `other`, then `self`.
    pub fn compose(&self, other: &SE3) -> SE3 {
        SE3 {
            rotation: self.rotation * other.rotation,
            translation: self.rotation * other.translation + self.translation,
        }
    }

    /// The inverse transform.
    pub fn inverse(&self) -> SE3 {
        let rot_inv = self.rotation.inverse();
        SE3 {
            rotation: rot_inv,
            translation: -(rot_inv * self.translation),
        }
    }

    /// Transform a point: `R * p + t`.
    pub fn transform_point(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * p + self.translation
    }
}
