//! SeedStore - The ordered collection of live seeds.
//!
//! Insertion order is preserved and iteration order is deterministic, so two
//! runs over identical inputs touch seeds in the same order. The store also
//! owns the two monotonic counters; both are instance state so that tests
//! get fresh counters by constructing a fresh filter.

use std::sync::Arc;

use crate::detect::FeaturePoint;
use crate::frame::{Feature, Frame, FrameId};

use super::seed::{BatchId, Seed, SeedId};

/// Verdict returned by an [`SeedStore::update_range`] closure for one seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedUpdate {
    /// Keep the seed and advance to the next one.
    Keep,
    /// Erase the seed and continue with its successor.
    Erase,
    /// Stop iterating; the remaining seeds are left untouched.
    Halt,
}

/// Copy of one seed's estimate state, for inspection outside the store lock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeedSnapshot {
    pub id: SeedId,
    pub batch_id: BatchId,
    pub ref_frame: FrameId,
    pub a: f32,
    pub b: f32,
    pub mu: f32,
    pub z_range: f32,
    pub sigma2: f32,
}

/// Ordered container of live seeds plus the id counters.
#[derive(Debug, Default)]
pub struct SeedStore {
    seeds: Vec<Seed>,
    next_seed_id: u64,
    next_batch_id: u64,
}

impl SeedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.seeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seeds.is_empty()
    }

    /// The most recently assigned batch id.
    pub fn current_batch(&self) -> BatchId {
        BatchId(self.next_batch_id)
    }

    /// Append one seed per detected point, all tagged with a fresh batch id.
    ///
    /// The batch counter is bumped exactly once, before any seed of the batch
    /// is inserted. Returns the number of seeds added.
    pub fn initialize_batch(
        &mut self,
        frame: &Arc<Frame>,
        points: &[FeaturePoint],
        depth_mean: f64,
        depth_min: f64,
    ) -> usize {
        self.next_batch_id += 1;
        let batch = BatchId(self.next_batch_id);
        for pt in points {
            let feature = Feature::new(
                Arc::clone(frame),
                nalgebra::Vector2::new(pt.x, pt.y),
                pt.level,
            );
            let id = SeedId(self.next_seed_id);
            self.next_seed_id += 1;
            self.seeds
                .push(Seed::new(id, batch, feature, depth_mean, depth_min));
        }
        points.len()
    }

    /// Apply `apply` to each seed in `[start, len)`, in insertion order.
    ///
    /// The closure decides per seed whether it survives; `Halt` aborts the
    /// sweep and leaves the remainder for the next frame.
    pub fn update_range<F>(&mut self, start: usize, mut apply: F)
    where
        F: FnMut(&mut Seed) -> SeedUpdate,
    {
        let mut i = start;
        while i < self.seeds.len() {
            match apply(&mut self.seeds[i]) {
                SeedUpdate::Keep => i += 1,
                SeedUpdate::Erase => {
                    self.seeds.remove(i);
                }
                SeedUpdate::Halt => return,
            }
        }
    }

    /// Erase all seeds whose reference frame is `frame_id`. Returns the count.
    pub fn remove_by_frame(&mut self, frame_id: FrameId) -> usize {
        let before = self.seeds.len();
        self.seeds.retain(|s| s.feature.frame.id != frame_id);
        before - self.seeds.len()
    }

    pub fn clear(&mut self) {
        self.seeds.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Seed> {
        self.seeds.iter()
    }

    /// Per-seed state copies, for tests and visualization.
    pub fn snapshots(&self) -> Vec<SeedSnapshot> {
        self.seeds
            .iter()
            .map(|s| SeedSnapshot {
                id: s.id,
                batch_id: s.batch_id,
                ref_frame: s.feature.frame.id,
                a: s.a,
                b: s.b,
                mu: s.mu,
                z_range: s.z_range,
                sigma2: s.sigma2,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{GrayImage, ImagePyramid, PinholeCamera};
    use crate::geometry::SE3;

    fn test_frame(id: u64) -> Arc<Frame> {
        let cam = PinholeCamera::new(320.0, 320.0, 320.0, 240.0, 640, 480);
        let pyramid = ImagePyramid::build(GrayImage::filled(32, 24, 0), 1);
        Frame::new(FrameId(id), cam, pyramid, SE3::identity())
    }

    fn test_points(n: usize) -> Vec<FeaturePoint> {
        (0..n)
            .map(|i| FeaturePoint {
                x: 100.0 + i as f64,
                y: 120.0,
                level: 0,
            })
            .collect()
    }

    #[test]
    fn test_initialize_batch_bumps_counter_once() {
        let mut store = SeedStore::new();
        assert_eq!(store.current_batch(), BatchId(0));

        store.initialize_batch(&test_frame(1), &test_points(3), 2.0, 1.0);
        assert_eq!(store.current_batch(), BatchId(1));
        assert_eq!(store.len(), 3);
        assert!(store.iter().all(|s| s.batch_id == BatchId(1)));

        store.initialize_batch(&test_frame(2), &test_points(2), 2.0, 1.0);
        assert_eq!(store.current_batch(), BatchId(2));
        assert_eq!(store.len(), 5);
    }

    #[test]
    fn test_seed_ids_are_unique_and_monotonic() {
        let mut store = SeedStore::new();
        store.initialize_batch(&test_frame(1), &test_points(4), 2.0, 1.0);
        store.initialize_batch(&test_frame(2), &test_points(4), 2.0, 1.0);

        let ids: Vec<u64> = store.iter().map(|s| s.id.0).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_update_range_erase_and_keep() {
        let mut store = SeedStore::new();
        store.initialize_batch(&test_frame(1), &test_points(5), 2.0, 1.0);

        // Erase every second seed.
        let mut n = 0;
        store.update_range(0, |_| {
            n += 1;
            if n % 2 == 0 {
                SeedUpdate::Erase
            } else {
                SeedUpdate::Keep
            }
        });
        assert_eq!(store.len(), 3);
        let ids: Vec<u64> = store.iter().map(|s| s.id.0).collect();
        assert_eq!(ids, vec![0, 2, 4]);
    }

    #[test]
    fn test_update_range_halt_stops_sweep() {
        let mut store = SeedStore::new();
        store.initialize_batch(&test_frame(1), &test_points(5), 2.0, 1.0);

        let mut visited = 0;
        store.update_range(0, |_| {
            visited += 1;
            if visited == 2 {
                SeedUpdate::Halt
            } else {
                SeedUpdate::Keep
            }
        });
        assert_eq!(visited, 2);
        assert_eq!(store.len(), 5);
    }

    #[test]
    fn test_update_range_respects_start_index() {
        let mut store = SeedStore::new();
        store.initialize_batch(&test_frame(1), &test_points(5), 2.0, 1.0);

        let mut seen = Vec::new();
        store.update_range(3, |s| {
            seen.push(s.id.0);
            SeedUpdate::Keep
        });
        assert_eq!(seen, vec![3, 4]);
    }

    #[test]
    fn test_remove_by_frame() {
        let mut store = SeedStore::new();
        let f1 = test_frame(1);
        let f2 = test_frame(2);
        store.initialize_batch(&f1, &test_points(3), 2.0, 1.0);
        store.initialize_batch(&f2, &test_points(2), 2.0, 1.0);

        assert_eq!(store.remove_by_frame(f1.id), 3);
        assert_eq!(store.len(), 2);
        assert!(store.iter().all(|s| s.feature.frame.id == f2.id));
        assert_eq!(store.remove_by_frame(f1.id), 0);
    }

    #[test]
    fn test_clear_keeps_counters() {
        let mut store = SeedStore::new();
        store.initialize_batch(&test_frame(1), &test_points(2), 2.0, 1.0);
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.current_batch(), BatchId(1));

        store.initialize_batch(&test_frame(2), &test_points(1), 2.0, 1.0);
        assert_eq!(store.iter().next().unwrap().id, SeedId(2));
    }
}
