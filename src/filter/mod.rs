//! The probabilistic depth filter: seeds, measurement model, Bayesian
//! update, frame intake, and the worker loop.

pub mod config;
pub mod depth_filter;
pub mod intake;
pub mod measurement;
pub mod seed;
pub mod store;
pub mod update;

pub use config::DepthFilterConfig;
pub use depth_filter::{ConvergedPoint, ConvergedPointSink, DepthFilter};
pub use intake::{FrameIntake, WorkItem};
pub use seed::{BatchId, Seed, SeedId};
pub use store::{SeedSnapshot, SeedStore, SeedUpdate};
