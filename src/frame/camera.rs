//! Pinhole camera model.

use nalgebra::{Vector2, Vector3};

/// Pinhole camera intrinsics with image bounds.
///
/// No distortion model: frames handed to the depth filter are expected to be
/// undistorted upstream.
#[derive(Debug, Clone, Copy)]
pub struct PinholeCamera {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub width: usize,
    pub height: usize,
}

impl PinholeCamera {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64, width: usize, height: usize) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            width,
            height,
        }
    }

    /// Focal length used to convert a pixel error into an angular error.
    pub fn focal_length(&self) -> f64 {
        self.fx
    }

    /// Project a camera-frame 3D point to pixel coordinates.
    ///
    /// The caller is responsible for checking `xyz.z > 0` first; projection of
    /// a point at or behind the camera plane is meaningless.
    pub fn project(&self, xyz: &Vector3<f64>) -> Vector2<f64> {
        Vector2::new(
            self.fx * xyz.x / xyz.z + self.cx,
            self.fy * xyz.y / xyz.z + self.cy,
        )
    }

    /// Back-project a pixel to a unit bearing vector in the camera frame.
    pub fn unproject(&self, px: &Vector2<f64>) -> Vector3<f64> {
        Vector3::new((px.x - self.cx) / self.fx, (px.y - self.cy) / self.fy, 1.0).normalize()
    }

    /// Whether a pixel lies inside the image, `margin` pixels from the border.
    pub fn is_in_frame(&self, px: &Vector2<f64>, margin: f64) -> bool {
        px.x >= margin
            && px.y >= margin
            && px.x < self.width as f64 - margin
            && px.y < self.height as f64 - margin
    }
}
