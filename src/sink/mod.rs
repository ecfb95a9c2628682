//! Result export: one row per (tier, query) cell.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, StringArray, UInt64Array};
use arrow::csv::WriterBuilder;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::Utc;
use log::info;
use parquet::arrow::ArrowWriter;
use serde::Serialize;

use crate::conf::OutputFormat;
use crate::core::BenchError;
use crate::runner::ExperimentResult;

pub const RECORDS_COLUMN: &str = "Records";
pub const QUERY_COLUMN: &str = "Query";
pub const FIRST_COLUMN: &str = "First Execution Time (ms)";
pub const AVERAGE_COLUMN: &str = "Average Execution Time (ms)";

pub fn results_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new(RECORDS_COLUMN, DataType::UInt64, false),
        Field::new(QUERY_COLUMN, DataType::Utf8, false),
        Field::new(FIRST_COLUMN, DataType::Float64, false),
        Field::new(AVERAGE_COLUMN, DataType::Float64, false),
    ]))
}

/// Tabular form of the results. Failed cells carry NaN timings.
pub fn to_record_batch(results: &[ExperimentResult]) -> Result<RecordBatch, BenchError> {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(UInt64Array::from(
            results.iter().map(|r| r.records as u64).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            results.iter().map(|r| r.query.label()).collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(
            results.iter().map(|r| r.first_ms).collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(
            results.iter().map(|r| r.mean_rest_ms).collect::<Vec<_>>(),
        )),
    ];
    Ok(RecordBatch::try_new(results_schema(), columns)?)
}

#[derive(Serialize)]
struct RunReport<'a> {
    backend: &'a str,
    generated_at: String,
    results: &'a [ExperimentResult],
}

/// Write `results` to `path` in `format`, creating parent directories.
///
/// `json` keeps the raw samples and error messages; `csv` and `parquet`
/// carry the four summary columns only.
pub fn write_results(
    path: &Path,
    format: OutputFormat,
    backend: &str,
    results: &[ExperimentResult],
) -> Result<(), BenchError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            BenchError::SinkError(format!("creating {}: {}", parent.display(), e))
        })?;
    }
    let file = File::create(path)
        .map_err(|e| BenchError::SinkError(format!("creating {}: {}", path.display(), e)))?;

    match format {
        OutputFormat::Csv => {
            let batch = to_record_batch(results)?;
            let mut writer = WriterBuilder::new().with_header(true).build(file);
            writer.write(&batch)?;
        }
        OutputFormat::Parquet => {
            let batch = to_record_batch(results)?;
            let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
            writer.write(&batch)?;
            writer.close()?;
        }
        OutputFormat::Json => {
            let report = RunReport {
                backend,
                generated_at: Utc::now().to_rfc3339(),
                results,
            };
            serde_json::to_writer_pretty(BufWriter::new(file), &report)?;
        }
    }
    info!("results saved to {}", path.display());
    Ok(())
}

/// Log one line per cell.
pub fn log_summary(backend: &str, results: &[ExperimentResult]) {
    for r in results {
        match &r.error {
            None => info!(
                "{:<8} {:>9} {:<8} first {:>10.3}ms  mean {:>10.3}ms",
                backend, r.records, r.query, r.first_ms, r.mean_rest_ms
            ),
            Some(err) => info!(
                "{:<8} {:>9} {:<8} FAILED: {}",
                backend, r.records, r.query, err
            ),
        }
    }
}
