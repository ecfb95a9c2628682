use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::conf::BackendKind;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Parquet,
    Json,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Parquet => "parquet",
            OutputFormat::Json => "json",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub format: OutputFormat,
}

impl OutputConfig {
    /// Explicit path, or `output/<backend>_query_execution_times.<ext>`.
    pub fn resolve_path(&self, kind: BackendKind) -> PathBuf {
        match &self.path {
            Some(path) => path.clone(),
            None => PathBuf::from("output").join(format!(
                "{}_query_execution_times.{}",
                kind,
                self.format.extension()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_path_per_backend() {
        let conf = OutputConfig {
            path: None,
            format: OutputFormat::Parquet,
        };
        assert_eq!(
            conf.resolve_path(BackendKind::Mongodb),
            PathBuf::from("output/mongodb_query_execution_times.parquet")
        );
    }

    #[test]
    fn test_explicit_path_preserved() {
        let conf = OutputConfig {
            path: Some(PathBuf::from("/tmp/results.csv")),
            format: OutputFormat::Csv,
        };
        assert_eq!(
            conf.resolve_path(BackendKind::Redis),
            PathBuf::from("/tmp/results.csv")
        );
    }
}
