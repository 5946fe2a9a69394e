//! Frames and their 2D feature observations.
//!
//! A [`Frame`] is the unit of work submitted to the depth filter: an image
//! pyramid with a camera model and a fixed pose. Frames are shared between
//! the front-end and the filter worker as `Arc<Frame>`; the pose is immutable
//! after construction so no lock is needed to read it in the per-seed loop.

pub mod camera;
pub mod pyramid;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nalgebra::{Vector2, Vector3};
use parking_lot::Mutex;

use crate::geometry::SE3;

pub use camera::PinholeCamera;
pub use pyramid::{GrayImage, ImagePyramid};

/// Unique identifier for a Frame.
///
/// FrameIds are assigned by the front-end. They serve as lightweight handles
/// for cross-referencing without needing pointer identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u64);

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "F{}", self.0)
    }
}

/// A captured frame: image pyramid, camera model, and world-to-frame pose.
pub struct Frame {
    pub id: FrameId,
    pub cam: PinholeCamera,
    pub pyramid: ImagePyramid,

    /// Pose: transform from world to this frame, `p_f = T_f_w * p_w`.
    t_f_w: SE3,

    /// Whether the front-end selected this frame as a keyframe.
    keyframe: AtomicBool,

    /// Pixel positions of features the front-end already tracks on this
    /// frame. Read by the filter at keyframe initialization to pre-occupy
    /// the detector grid; mutated only by the front-end.
    features: Mutex<Vec<Vector2<f64>>>,
}

impl Frame {
    pub fn new(id: FrameId, cam: PinholeCamera, pyramid: ImagePyramid, t_f_w: SE3) -> Arc<Self> {
        Arc::new(Self {
            id,
            cam,
            pyramid,
            t_f_w,
            keyframe: AtomicBool::new(false),
            features: Mutex::new(Vec::new()),
        })
    }

    /// The world-to-frame transform.
    pub fn t_f_w(&self) -> &SE3 {
        &self.t_f_w
    }

    pub fn is_keyframe(&self) -> bool {
        self.keyframe.load(Ordering::SeqCst)
    }

    /// Mark this frame as a keyframe.
    pub fn set_keyframe(&self) {
        self.keyframe.store(true, Ordering::SeqCst);
    }

    /// Project a point given in this frame's coordinates to pixel coordinates.
    pub fn project(&self, xyz_f: &Vector3<f64>) -> Vector2<f64> {
        self.cam.project(xyz_f)
    }

    /// Record a tracked feature position (front-end side).
    pub fn add_feature(&self, px: Vector2<f64>) {
        self.features.lock().push(px);
    }

    /// Snapshot of the tracked feature positions.
    pub fn feature_pixels(&self) -> Vec<Vector2<f64>> {
        self.features.lock().clone()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("id", &self.id)
            .field("keyframe", &self.is_keyframe())
            .finish()
    }
}

/// A 2D observation on a reference frame.
///
/// Holds the pixel position, the unit bearing vector through it, the pyramid
/// level it was detected at, and a handle to the owning frame. The handle
/// keeps the reference frame alive for as long as any seed observes it.
#[derive(Clone)]
pub struct Feature {
    pub frame: Arc<Frame>,
    pub px: Vector2<f64>,
    /// Unit bearing vector through `px` in the frame's camera coordinates.
    pub f: Vector3<f64>,
    pub level: usize,
}

impl Feature {
    pub fn new(frame: Arc<Frame>, px: Vector2<f64>, level: usize) -> Self {
        let f = frame.cam.unproject(&px);
        Self {
            frame,
            px,
            f,
            level,
        }
    }
}

impl std::fmt::Debug for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Feature")
            .field("frame", &self.frame.id)
            .field("px", &self.px)
            .field("level", &self.level)
            .finish()
    }
}
