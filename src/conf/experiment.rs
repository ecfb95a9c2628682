use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::LogicalQuery;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ExperimentConfig {
    #[serde(default = "ExperimentConfig::default_dataset")]
    pub dataset: PathBuf,
    #[serde(default = "ExperimentConfig::default_tiers")]
    pub tiers: Vec<usize>,
    #[serde(default = "ExperimentConfig::default_repetitions")]
    pub repetitions: usize,
    #[serde(default = "ExperimentConfig::default_queries")]
    pub queries: Vec<LogicalQuery>,
    #[serde(default)]
    pub parallel_queries: bool,
}

impl ExperimentConfig {
    fn default_dataset() -> PathBuf {
        PathBuf::from("1_mil_records.csv")
    }

    pub fn default_tiers() -> Vec<usize> {
        vec![250_000, 500_000, 750_000, 1_000_000]
    }

    /// One cold run plus 30 steady-state runs.
    pub fn default_repetitions() -> usize {
        31
    }

    pub fn default_queries() -> Vec<LogicalQuery> {
        LogicalQuery::ALL.to_vec()
    }

    /// Rows the dataset must provide to cover every tier.
    pub fn max_tier(&self) -> usize {
        self.tiers.iter().copied().max().unwrap_or(0)
    }
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            dataset: Self::default_dataset(),
            tiers: Self::default_tiers(),
            repetitions: Self::default_repetitions(),
            queries: Self::default_queries(),
            parallel_queries: false,
        }
    }
}
