//! # isegm-eval
//!
//! Number-of-clicks (NoC) evaluation of interactive segmentation checkpoints.
//!
//! A run resolves one checkpoint (or every checkpoint of an experiment), then for every
//! benchmark dataset simulates click trajectories against the ground truth, feeds them to
//! a [Segment Anything](segment_anything_rs) predictor and records how many clicks are
//! needed to reach the target IoU.

pub mod args;
pub mod checkpoints;
pub mod clicker;
pub mod config;
pub mod dataset;
pub mod driver;
pub mod error;
pub mod evaluation;
pub mod metrics;
pub mod model;
pub mod predictor;
pub mod results;
pub mod vis;

pub use args::{parse_args, Cli, EvalArgs, EvalMode};
pub use config::Config;
pub use driver::run;
pub use error::{EvalError, Result};
