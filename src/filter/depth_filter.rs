//! DepthFilter - Asynchronous refinement of depth seeds.
//!
//! Owns the worker thread that drains the frame intake:
//! 1. Every frame updates the live seeds along its epipolar geometry
//! 2. Keyframes additionally spawn a new batch of seeds from fresh detections
//! 3. New batches get a head start from recent history frames
//! 4. Converged seeds graduate to 3D points via the sink callback
//!
//! With no worker running, submissions execute the same work inline on the
//! caller thread; semantics are identical in both modes.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use nalgebra::Vector3;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::detect::{occupy_pixels, FeatureDetector};
use crate::frame::{Feature, Frame};
use crate::matching::Matcher;

use super::config::DepthFilterConfig;
use super::intake::{FrameIntake, WorkItem};
use super::measurement::{measure_inverse_depth, px_error_angle};
use super::store::{SeedSnapshot, SeedStore, SeedUpdate};
use super::update::update_seed;

/// A seed that reached the convergence threshold, ready to become a landmark.
#[derive(Debug, Clone)]
pub struct ConvergedPoint {
    /// Triangulated 3D position in world coordinates.
    pub xyz_world: Vector3<f64>,
    /// The reference observation the seed refined.
    pub feature: Feature,
    /// Final inverse-depth variance of the estimate.
    pub sigma2: f32,
}

/// Receives converged points on the worker thread, under the store lock.
///
/// Implementations must be thread-safe and must not call back into the depth
/// filter synchronously.
pub type ConvergedPointSink = Box<dyn Fn(ConvergedPoint) + Send + Sync>;

/// Everything guarded by the store lock: the seeds, the counters inside the
/// store, and the non-reentrant collaborators the update sweep drives.
struct FilterCore {
    store: SeedStore,
    detector: Box<dyn FeatureDetector>,
    matcher: Box<dyn Matcher>,
}

struct Shared {
    core: Mutex<FilterCore>,
    intake: FrameIntake,
    sink: ConvergedPointSink,
    config: DepthFilterConfig,
}

/// Probabilistic depth filter over a population of seeds.
pub struct DepthFilter {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl DepthFilter {
    pub fn new(
        detector: Box<dyn FeatureDetector>,
        matcher: Box<dyn Matcher>,
        sink: ConvergedPointSink,
        config: DepthFilterConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                core: Mutex::new(FilterCore {
                    store: SeedStore::new(),
                    detector,
                    matcher,
                }),
                intake: FrameIntake::new(),
                sink,
                config,
            }),
            worker: None,
        }
    }

    /// Spawn the worker thread. Until this is called (or after `stop`),
    /// submissions run inline on the caller thread.
    pub fn start(&mut self) {
        if self.worker.is_some() {
            return;
        }
        self.shared.intake.reopen();
        let shared = Arc::clone(&self.shared);
        self.worker = Some(thread::spawn(move || {
            debug!("depth filter worker started");
            while let Some(item) = shared.intake.drain_next() {
                shared.process(item);
            }
            debug!("depth filter worker exiting");
        }));
    }

    /// Interrupt the current sweep, wake the worker, and join it.
    pub fn stop(&mut self) {
        if let Some(handle) = self.worker.take() {
            self.shared.intake.request_halt();
            self.shared.intake.terminate();
            let _ = handle.join();
            info!("depth filter worker stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Hand a regular frame to the filter: all live seeds are measured
    /// against it. Under load the oldest queued frame is dropped.
    pub fn submit_frame(&self, frame: Arc<Frame>) {
        if self.worker.is_some() {
            self.shared.intake.submit_frame(frame);
        } else {
            self.shared.update_seeds(&frame, 0);
        }
    }

    /// Hand a keyframe to the filter: seeds are updated against it, then a
    /// new batch is initialized from fresh detections. `history` frames give
    /// the new batch a head start. Pre-empts any in-flight update sweep.
    pub fn submit_keyframe(
        &self,
        frame: Arc<Frame>,
        depth_mean: f64,
        depth_min: f64,
        history: Vec<Arc<Frame>>,
    ) {
        frame.set_keyframe();
        if self.worker.is_some() {
            self.shared
                .intake
                .submit_keyframe(frame, depth_mean, depth_min, history);
        } else {
            self.shared
                .process_keyframe(&frame, depth_mean, depth_min, &history);
        }
    }

    /// Erase all seeds referencing `frame`, e.g. when the front-end drops a
    /// keyframe from its map. Returns the number of seeds removed.
    pub fn remove_frame(&self, frame: &Frame) -> usize {
        self.shared.intake.request_halt();
        let n_removed = {
            let mut core = self.shared.core.lock();
            core.store.remove_by_frame(frame.id)
        };
        self.shared.intake.clear_halt();
        debug!(frame = %frame.id, n_removed, "removed seeds by frame");
        n_removed
    }

    /// Drop all seeds and queued frames. The id counters keep counting.
    pub fn reset(&self) {
        self.shared.intake.request_halt();
        self.shared.core.lock().store.clear();
        self.shared.intake.clear_queue();
        self.shared.intake.clear_halt();
        if self.shared.config.verbose {
            info!("depth filter reset");
        }
    }

    pub fn num_seeds(&self) -> usize {
        self.shared.core.lock().store.len()
    }

    /// Copies of the per-seed estimate state, for tests and visualization.
    pub fn seed_snapshots(&self) -> Vec<SeedSnapshot> {
        self.shared.core.lock().store.snapshots()
    }
}

impl Drop for DepthFilter {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Shared {
    fn process(&self, item: WorkItem) {
        match item {
            WorkItem::Frame(frame) => self.update_seeds(&frame, 0),
            WorkItem::Keyframe {
                frame,
                depth_mean,
                depth_min,
                history,
            } => self.process_keyframe(&frame, depth_mean, depth_min, &history),
        }
    }

    fn process_keyframe(
        &self,
        frame: &Arc<Frame>,
        depth_mean: f64,
        depth_min: f64,
        history: &[Arc<Frame>],
    ) {
        self.update_seeds(frame, 0);
        let (old_size, n_new) = self.initialize_seeds(frame, depth_mean, depth_min);
        if n_new > 0 {
            // Replay recent frames over the fresh batch only; older seeds
            // have already seen them.
            for past in history {
                self.update_seeds(past, old_size);
            }
        }
    }

    /// Detect new features on the keyframe and seed one hypothesis per
    /// detection. Returns the store size before insertion and the number of
    /// seeds added.
    fn initialize_seeds(
        &self,
        frame: &Arc<Frame>,
        depth_mean: f64,
        depth_min: f64,
    ) -> (usize, usize) {
        self.intake.request_halt();
        let mut core = self.core.lock();
        let FilterCore {
            store, detector, ..
        } = &mut *core;

        // Features the front-end already tracks block their grid cells, so
        // detection yields only genuinely new locations.
        occupy_pixels(detector.grid_mut(), &frame.feature_pixels());
        let points = detector.detect(&frame.pyramid);

        let old_size = store.len();
        let n_new = store.initialize_batch(frame, &points, depth_mean, depth_min);

        // Leave the grid clean for the next keyframe; matches found while
        // sweeping that keyframe will re-occupy cells before detection.
        detector.grid_mut().reset();

        if self.config.verbose {
            info!(frame = %frame.id, batch = %store.current_batch(), n_new, "initialized new seeds");
        }
        self.intake.clear_halt();
        (old_size, n_new)
    }

    /// One update sweep: measure every seed from `start_index` on against
    /// `frame` and fuse the measurement into its estimate.
    fn update_seeds(&self, frame: &Arc<Frame>, start_index: usize) {
        let mut core = self.core.lock();
        let FilterCore {
            store,
            detector,
            matcher,
        } = &mut *core;

        let px_error_angle = px_error_angle(frame.cam.focal_length());
        let current_batch = store.current_batch();
        let is_keyframe = frame.is_keyframe();
        let max_age = self.config.max_seed_age_keyframes;
        let sigma_thresh = self.config.convergence_sigma2_thresh;

        let mut n_updated = 0usize;
        let mut n_failed_matches = 0usize;

        store.update_range(start_index, |seed| {
            // A newly submitted keyframe pre-empts the sweep; the remaining
            // seeds keep their state for the next frame.
            if self.intake.halt_requested() {
                return SeedUpdate::Halt;
            }

            if current_batch.0 - seed.batch_id.0 > max_age {
                return SeedUpdate::Erase;
            }

            // Visibility: project the current mean hypothesis into `frame`.
            let t_ref_cur = seed
                .feature
                .frame
                .t_f_w()
                .compose(&frame.t_f_w().inverse());
            let xyz_cur = t_ref_cur
                .inverse()
                .transform_point(&(seed.feature.f * (1.0 / f64::from(seed.mu))));
            if xyz_cur.z < 0.0 {
                return SeedUpdate::Keep; // behind the camera
            }
            if !frame.cam.is_in_frame(&frame.project(&xyz_cur), 0.0) {
                return SeedUpdate::Keep; // does not project into the image
            }

            // Search interval: one sigma around the mean, in inverse depth.
            let z_inv_min = seed.mu + seed.sigma2.sqrt();
            let z_inv_max = (seed.mu - seed.sigma2.sqrt()).max(1e-8);

            let found = matcher.find_epipolar_match(
                &seed.feature.frame,
                frame,
                &seed.feature,
                1.0 / f64::from(seed.mu),
                1.0 / f64::from(z_inv_min),
                1.0 / f64::from(z_inv_max),
            );
            let epi_match = match found {
                Some(m) => m,
                None => {
                    // No match: evidence for the outlier hypothesis.
                    seed.b += 1.0;
                    n_failed_matches += 1;
                    return SeedUpdate::Keep;
                }
            };

            let meas =
                measure_inverse_depth(&t_ref_cur, &seed.feature.f, epi_match.depth, px_error_angle);
            update_seed(seed, meas.x, meas.tau2);
            n_updated += 1;

            if !seed.is_healthy() {
                debug!(seed = %seed.id, "estimate degenerate after update, dropping seed");
                return SeedUpdate::Erase;
            }

            if is_keyframe {
                // The detector must not re-seed the location just matched.
                detector
                    .grid_mut()
                    .set_occupied(epi_match.px_cur.x, epi_match.px_cur.y);
            }

            if seed.sigma2.sqrt() < seed.z_range / sigma_thresh {
                let xyz_world = seed
                    .feature
                    .frame
                    .t_f_w()
                    .inverse()
                    .transform_point(&(seed.feature.f * (1.0 / f64::from(seed.mu))));
                (self.sink)(ConvergedPoint {
                    xyz_world,
                    feature: seed.feature.clone(),
                    sigma2: seed.sigma2,
                });
                return SeedUpdate::Erase;
            }

            if z_inv_min.is_nan() {
                warn!(seed = %seed.id, "z_inv_min is NaN");
                return SeedUpdate::Erase;
            }

            SeedUpdate::Keep
        });

        debug!(frame = %frame.id, n_updated, n_failed_matches, "seed update sweep");
    }
}
