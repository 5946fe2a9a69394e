use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::unbounded;
use nalgebra::Vector3;
use tracing::info;

use rust_depthfilter::detect::{FeatureDetector, FeaturePoint, OccupancyGrid};
use rust_depthfilter::filter::{ConvergedPoint, DepthFilter, DepthFilterConfig};
use rust_depthfilter::frame::{Feature, Frame, FrameId, GrayImage, ImagePyramid, PinholeCamera};
use rust_depthfilter::geometry::SE3;
use rust_depthfilter::matching::{EpipolarMatch, Matcher};

/// Depth of the synthetic fronto-parallel wall the camera observes.
const WALL_DEPTH: f64 = 3.0;

/// Sideways camera motion per frame, in meters.
const STEP: f64 = 0.02;

/// Detector that proposes a regular grid of corners in free grid cells.
struct GridDetector {
    grid: OccupancyGrid,
    cam: PinholeCamera,
}

impl FeatureDetector for GridDetector {
    fn detect(&mut self, _pyramid: &ImagePyramid) -> Vec<FeaturePoint> {
        let mut points = Vec::new();
        let mut y = 40.0;
        while y < self.cam.height as f64 - 40.0 {
            let mut x = 40.0;
            while x < self.cam.width as f64 - 40.0 {
                if !self.grid.is_occupied(x, y) {
                    points.push(FeaturePoint { x, y, level: 0 });
                }
                x += 40.0;
            }
            y += 40.0;
        }
        points
    }

    fn grid_mut(&mut self) -> &mut OccupancyGrid {
        &mut self.grid
    }
}

/// Matcher that intersects the reference bearing with the wall plane and
/// reports the exact depth, as an ideal epipolar search would.
struct WallMatcher;

impl Matcher for WallMatcher {
    fn find_epipolar_match(
        &mut self,
        ref_frame: &Frame,
        cur_frame: &Frame,
        ref_feature: &Feature,
        _depth_est: f64,
        _depth_min: f64,
        _depth_max: f64,
    ) -> Option<EpipolarMatch> {
        // Reference ray in world coordinates.
        let t_w_ref = ref_frame.t_f_w().inverse();
        let origin = t_w_ref.transform_point(&Vector3::zeros());
        let dir = t_w_ref.rotation * ref_feature.f;
        if dir.z.abs() < 1e-9 {
            return None;
        }
        let depth = (WALL_DEPTH - origin.z) / dir.z;
        if depth <= 0.0 {
            return None;
        }

        let p_world = origin + dir * depth;
        let p_cur = cur_frame.t_f_w().transform_point(&p_world);
        if p_cur.z <= 0.0 {
            return None;
        }
        let px_cur = cur_frame.project(&p_cur);
        if !cur_frame.cam.is_in_frame(&px_cur, 8.0) {
            return None;
        }
        Some(EpipolarMatch {
            depth,
            px_cur,
            search_level: 0,
        })
    }
}

fn make_frame(id: u64, cam: PinholeCamera) -> Arc<Frame> {
    let pyramid = ImagePyramid::build(GrayImage::filled(640, 480, 127), 3);
    // Camera slides along +x; T_f_w maps world into the frame.
    let t_f_w = SE3::from_translation(Vector3::new(-STEP * id as f64, 0.0, 0.0));
    Frame::new(FrameId(id), cam, pyramid, t_f_w)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cam = PinholeCamera::new(320.0, 320.0, 320.0, 240.0, 640, 480);

    let (point_tx, point_rx) = unbounded::<ConvergedPoint>();
    let sink = Box::new(move |point: ConvergedPoint| {
        let _ = point_tx.send(point);
    });

    let mut filter = DepthFilter::new(
        Box::new(GridDetector {
            grid: OccupancyGrid::new(cam.width, cam.height, 32),
            cam,
        }),
        Box::new(WallMatcher),
        sink,
        DepthFilterConfig {
            verbose: true,
            ..DepthFilterConfig::default()
        },
    );
    filter.start();

    let n_frames = 80u64;
    let mut history: Vec<Arc<Frame>> = Vec::new();

    for id in 0..n_frames {
        let frame = make_frame(id, cam);

        if id % 25 == 0 {
            filter.submit_keyframe(frame.clone(), WALL_DEPTH, 1.0, history.clone());
        } else {
            filter.submit_frame(frame.clone());
        }

        history.push(frame);
        if history.len() > 5 {
            history.remove(0);
        }

        if id % 10 == 0 {
            info!(
                "frame {}/{}: {} live seeds, {} converged so far",
                id,
                n_frames,
                filter.num_seeds(),
                point_rx.len()
            );
        }

        // Pace the synthetic camera so the worker keeps up.
        std::thread::sleep(Duration::from_millis(2));
    }

    // Let the worker drain the tail of the queue, then join it.
    std::thread::sleep(Duration::from_millis(100));
    filter.stop();

    let converged: Vec<ConvergedPoint> = point_rx.try_iter().collect();
    let mean_abs_error = if converged.is_empty() {
        0.0
    } else {
        converged
            .iter()
            .map(|p| (p.xyz_world.z - WALL_DEPTH).abs())
            .sum::<f64>()
            / converged.len() as f64
    };

    info!(
        "done: {} points converged, {} seeds still live, mean |z - wall| = {:.4} m",
        converged.len(),
        filter.num_seeds(),
        mean_abs_error
    );

    Ok(())
}
