//! Experiment matrix: every tier crossed with every query.

mod loader;
mod matrix;

pub use loader::prepare_tier;
pub use matrix::{ExecutionMode, ExperimentPlan, ExperimentResult, MatrixRunner, run_all};
