mod backend;
mod config;
mod experiment;
mod output;

pub use backend::{BackendConfig, BackendKind};
pub use config::Config;
pub use experiment::ExperimentConfig;
pub use output::{OutputConfig, OutputFormat};
