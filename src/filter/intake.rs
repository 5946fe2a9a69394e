//! FrameIntake - Bounded frame queue with keyframe pre-emption.
//!
//! The front-end pushes frames from its own thread; the worker drains them.
//! Non-keyframes go through a FIFO of capacity three that discards the oldest
//! entry under load (only the freshest frames are worth measuring against).
//! A keyframe bypasses the FIFO through a single pending slot, raises the
//! pre-empt flag so an in-flight update sweep bails out, and invalidates the
//! queued non-keyframes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::frame::Frame;

/// Maximum number of queued non-keyframes.
const QUEUE_CAPACITY: usize = 3;

/// One unit of work for the filter loop.
#[derive(Debug)]
pub enum WorkItem {
    /// A regular frame: update existing seeds only.
    Frame(Arc<Frame>),
    /// A keyframe: update seeds, then initialize a new batch.
    Keyframe {
        frame: Arc<Frame>,
        depth_mean: f64,
        depth_min: f64,
        /// Recent past frames used to give the new batch a head start.
        history: Vec<Arc<Frame>>,
    },
}

#[derive(Debug)]
struct PendingKeyframe {
    frame: Arc<Frame>,
    depth_mean: f64,
    depth_min: f64,
    history: Vec<Arc<Frame>>,
}

#[derive(Debug, Default)]
struct IntakeState {
    queue: VecDeque<Arc<Frame>>,
    pending_keyframe: Option<PendingKeyframe>,
    terminated: bool,
}

/// Producer/consumer hand-off between the front-end and the filter worker.
#[derive(Debug)]
pub struct FrameIntake {
    state: Mutex<IntakeState>,
    cond: Condvar,
    /// Pre-empt flag: readable inside the per-seed loop without taking any
    /// lock. Raised by keyframe submission, removal, and reset; cleared when
    /// the pre-empting operation has been handed to the worker.
    halt: AtomicBool,
}

impl FrameIntake {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(IntakeState::default()),
            cond: Condvar::new(),
            halt: AtomicBool::new(false),
        }
    }

    /// Enqueue a non-keyframe, discarding the oldest queued frame when full.
    pub fn submit_frame(&self, frame: Arc<Frame>) {
        {
            let mut state = self.state.lock();
            if state.queue.len() > QUEUE_CAPACITY - 1 {
                state.queue.pop_front();
            }
            state.queue.push_back(frame);
        }
        self.halt.store(false, Ordering::SeqCst);
        self.cond.notify_one();
    }

    /// Set the pending keyframe and pre-empt any in-flight update sweep.
    pub fn submit_keyframe(
        &self,
        frame: Arc<Frame>,
        depth_mean: f64,
        depth_min: f64,
        history: Vec<Arc<Frame>>,
    ) {
        {
            let mut state = self.state.lock();
            state.pending_keyframe = Some(PendingKeyframe {
                frame,
                depth_mean,
                depth_min,
                history,
            });
        }
        self.halt.store(true, Ordering::SeqCst);
        self.cond.notify_one();
    }

    /// Block until work or termination. A pending keyframe wins over the
    /// queue; taking it discards the queued non-keyframes, which are stale by
    /// then. Returns `None` once terminated.
    pub fn drain_next(&self) -> Option<WorkItem> {
        let mut state = self.state.lock();
        loop {
            if state.terminated {
                return None;
            }
            if let Some(kf) = state.pending_keyframe.take() {
                state.queue.clear();
                self.halt.store(false, Ordering::SeqCst);
                return Some(WorkItem::Keyframe {
                    frame: kf.frame,
                    depth_mean: kf.depth_mean,
                    depth_min: kf.depth_min,
                    history: kf.history,
                });
            }
            if let Some(frame) = state.queue.pop_front() {
                return Some(WorkItem::Frame(frame));
            }
            self.cond.wait(&mut state);
        }
    }

    /// Raise the pre-empt flag.
    pub fn request_halt(&self) {
        self.halt.store(true, Ordering::SeqCst);
    }

    /// Lower the pre-empt flag.
    pub fn clear_halt(&self) {
        self.halt.store(false, Ordering::SeqCst);
    }

    /// Whether the current update sweep should bail out.
    pub fn halt_requested(&self) -> bool {
        self.halt.load(Ordering::SeqCst)
    }

    /// Drop all queued non-keyframes.
    pub fn clear_queue(&self) {
        self.state.lock().queue.clear();
    }

    /// Wake the worker for shutdown; `drain_next` returns `None` from now on.
    pub fn terminate(&self) {
        self.state.lock().terminated = true;
        self.cond.notify_all();
    }

    /// Allow draining again after a `terminate`, for worker restarts.
    pub fn reopen(&self) {
        self.state.lock().terminated = false;
    }

    pub fn queue_len(&self) -> usize {
        self.state.lock().queue.len()
    }
}

impl Default for FrameIntake {
    fn default() -> Self {
        Self::new()
    }
}
