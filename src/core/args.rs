use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use log::kv::{ToValue, Value};

use crate::conf::{BackendKind, OutputFormat};
use crate::core::LogicalQuery;

#[derive(Parser, Debug, PartialEq)]
#[command(version, about)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Load the dataset at every tier and time the query battery against one backend
    Run(RunArgs),
    /// Write a synthetic course-management dataset as CSV
    Generate(GenerateArgs),
}

#[derive(Args, Debug, PartialEq, Default)]
pub struct RunArgs {
    /// Path to a TOML config file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Backend to benchmark
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,

    /// Connection endpoint (URL) of the backend
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Dataset CSV path
    #[arg(long)]
    pub dataset: Option<PathBuf>,

    /// Comma-separated record-count tiers, ascending
    #[arg(long, value_delimiter = ',')]
    pub tiers: Option<Vec<usize>>,

    /// Comma-separated queries to run, e.g. query_1,query_3
    #[arg(long, value_delimiter = ',')]
    pub queries: Option<Vec<LogicalQuery>>,

    /// Invocations per (tier, query) cell
    #[arg(short, long)]
    pub repetitions: Option<usize>,

    /// Records per bulk-load chunk
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Result file path
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Result file format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Run the query cells of a tier concurrently (distorts latencies)
    #[arg(long, default_value_t = false)]
    pub parallel: bool,
}

#[derive(Args, Debug, PartialEq)]
pub struct GenerateArgs {
    /// Number of generated records, excluding the fixed ones
    #[arg(long, default_value_t = 1_000_000)]
    pub records: usize,

    /// RNG seed
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Output CSV path
    #[arg(short, long, default_value = "1_mil_records.csv")]
    pub output: PathBuf,
}

impl ToValue for CliArgs {
    fn to_value(&self) -> Value<'_> {
        Value::from_debug(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_args_parsing() {
        let args = CliArgs::parse_from([
            "self",
            "run",
            "--config",
            "foo.toml",
            "--backend",
            "redis",
            "--tiers",
            "10,20",
            "--queries",
            "query_1,query_3",
            "-r",
            "5",
        ]);
        assert_eq!(
            args,
            CliArgs {
                command: Command::Run(RunArgs {
                    config: Some("foo.toml".to_string()),
                    backend: Some(BackendKind::Redis),
                    tiers: Some(vec![10, 20]),
                    queries: Some(vec![LogicalQuery::Q1, LogicalQuery::Q3]),
                    repetitions: Some(5),
                    ..RunArgs::default()
                })
            }
        );
    }

    #[test]
    fn test_generate_defaults() {
        let args = CliArgs::parse_from(["self", "generate"]);
        assert_eq!(
            args,
            CliArgs {
                command: Command::Generate(GenerateArgs {
                    records: 1_000_000,
                    seed: 42,
                    output: PathBuf::from("1_mil_records.csv"),
                })
            }
        );
    }
}
