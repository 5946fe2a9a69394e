//! Synthetic collaborators for driving the depth filter end to end.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;
use nalgebra::Vector3;
use parking_lot::Mutex;

use rust_depthfilter::detect::{FeatureDetector, FeaturePoint, OccupancyGrid};
use rust_depthfilter::frame::{Feature, Frame, FrameId, GrayImage, ImagePyramid, PinholeCamera};
use rust_depthfilter::geometry::SE3;
use rust_depthfilter::matching::{EpipolarMatch, Matcher};

pub fn test_camera() -> PinholeCamera {
    PinholeCamera::new(320.0, 320.0, 320.0, 240.0, 640, 480)
}

/// A frame whose camera center sits at `(cam_x, 0, 0)` looking down +z.
pub fn frame_at(id: u64, cam_x: f64) -> Arc<Frame> {
    let pyramid = ImagePyramid::build(GrayImage::filled(64, 48, 127), 3);
    let t_f_w = SE3::from_translation(Vector3::new(-cam_x, 0.0, 0.0));
    Frame::new(FrameId(id), test_camera(), pyramid, t_f_w)
}

/// Detector returning a fixed script of points on every call.
pub struct ScriptedDetector {
    points: Vec<FeaturePoint>,
    grid: OccupancyGrid,
}

impl ScriptedDetector {
    pub fn new(points: Vec<FeaturePoint>) -> Self {
        let cam = test_camera();
        Self {
            points,
            grid: OccupancyGrid::new(cam.width, cam.height, 32),
        }
    }

    /// `n` points spread over the central image region.
    pub fn with_n_points(n: usize) -> Self {
        let points = (0..n)
            .map(|i| FeaturePoint {
                x: 40.0 + 11.0 * (i % 50) as f64,
                y: 60.0 + 19.0 * (i / 50) as f64,
                level: 0,
            })
            .collect();
        Self::new(points)
    }
}

impl FeatureDetector for ScriptedDetector {
    fn detect(&mut self, _pyramid: &ImagePyramid) -> Vec<FeaturePoint> {
        self.points.clone()
    }
    fn grid_mut(&mut self) -> &mut OccupancyGrid {
        &mut self.grid
    }
}

/// Matcher reporting the exact depth of a known world point along the
/// reference bearing, as an ideal epipolar search would.
pub struct PointMatcher {
    pub point_world: Vector3<f64>,
}

impl Matcher for PointMatcher {
    fn find_epipolar_match(
        &mut self,
        ref_frame: &Frame,
        cur_frame: &Frame,
        ref_feature: &Feature,
        _depth_est: f64,
        _depth_min: f64,
        _depth_max: f64,
    ) -> Option<EpipolarMatch> {
        let p_ref = ref_frame.t_f_w().transform_point(&self.point_world);
        let depth = ref_feature.f.dot(&p_ref);
        if depth <= 0.0 {
            return None;
        }

        let p_cur = cur_frame.t_f_w().transform_point(&self.point_world);
        if p_cur.z <= 0.0 {
            return None;
        }
        let px_cur = cur_frame.project(&p_cur);
        if !cur_frame.cam.is_in_frame(&px_cur, 0.0) {
            return None;
        }
        Some(EpipolarMatch {
            depth,
            px_cur,
            search_level: 0,
        })
    }
}

/// Matcher that never finds a match.
pub struct NeverMatcher;

impl Matcher for NeverMatcher {
    fn find_epipolar_match(
        &mut self,
        _ref_frame: &Frame,
        _cur_frame: &Frame,
        _ref_feature: &Feature,
        _depth_est: f64,
        _depth_min: f64,
        _depth_max: f64,
    ) -> Option<EpipolarMatch> {
        None
    }
}

/// Per-frame call counts shared between a matcher and the test body.
pub type CallCounts = Arc<Mutex<HashMap<u64, usize>>>;

/// Wraps a matcher with per-current-frame call counting, an optional fixed
/// delay, and an optional gate channel blocking each call until a token
/// arrives. Used to observe pre-emption and queue behaviour from outside.
pub struct InstrumentedMatcher {
    inner: Box<dyn Matcher>,
    pub calls: CallCounts,
    delay: Option<Duration>,
    gate: Option<Receiver<()>>,
}

impl InstrumentedMatcher {
    pub fn new(inner: Box<dyn Matcher>) -> Self {
        Self {
            inner,
            calls: Arc::new(Mutex::new(HashMap::new())),
            delay: None,
            gate: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_gate(mut self, gate: Receiver<()>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn call_counts(&self) -> CallCounts {
        Arc::clone(&self.calls)
    }
}

impl Matcher for InstrumentedMatcher {
    fn find_epipolar_match(
        &mut self,
        ref_frame: &Frame,
        cur_frame: &Frame,
        ref_feature: &Feature,
        depth_est: f64,
        depth_min: f64,
        depth_max: f64,
    ) -> Option<EpipolarMatch> {
        *self.calls.lock().entry(cur_frame.id.0).or_insert(0) += 1;
        if let Some(gate) = &self.gate {
            let _ = gate.recv();
        }
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.inner.find_epipolar_match(
            ref_frame,
            cur_frame,
            ref_feature,
            depth_est,
            depth_min,
            depth_max,
        )
    }
}

/// Spin until `pred` holds, panicking after `timeout`.
pub fn wait_until(timeout: Duration, mut pred: impl FnMut() -> bool) {
    let deadline = std::time::Instant::now() + timeout;
    while !pred() {
        assert!(
            std::time::Instant::now() < deadline,
            "condition not reached within {:?}",
            timeout
        );
        std::thread::sleep(Duration::from_millis(1));
    }
}
