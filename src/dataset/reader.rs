use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, AsArray, Int64Array, StringArray};
use arrow::csv::ReaderBuilder;
use arrow::datatypes::{DataType, Field, Int64Type, Schema};
use arrow::record_batch::RecordBatch;

use crate::core::BenchError;
use crate::dataset::{DatasetRecord, SubmissionStatus};

const READ_BATCH_SIZE: usize = 8192;

/// Header names and types of the dataset file, in generator order.
pub const COLUMNS: [(&str, DataType); 13] = [
    ("course_id", DataType::Int64),
    ("course_name", DataType::Utf8),
    ("course_content", DataType::Utf8),
    ("student_id", DataType::Int64),
    ("student_name", DataType::Utf8),
    ("student_email_address", DataType::Utf8),
    ("professor_id", DataType::Int64),
    ("professor_name", DataType::Utf8),
    ("professor_email_address", DataType::Utf8),
    ("assignment_id", DataType::Int64),
    ("assignment_title", DataType::Utf8),
    ("submission_status", DataType::Utf8),
    ("score", DataType::Int64),
];

/// Reads dataset rows in file order, stopping after `limit` rows.
///
/// Columns may appear in any order; extra columns are read as text and ignored.
pub fn read_records(path: &Path, limit: Option<usize>) -> Result<Vec<DatasetRecord>, BenchError> {
    let header = read_header(path)?;
    let schema = Arc::new(schema_for_header(&header)?);

    let file = File::open(path).map_err(|e| {
        BenchError::DatasetError(format!("opening {}: {}", path.display(), e))
    })?;
    let reader = ReaderBuilder::new(schema)
        .with_header(true)
        .with_batch_size(READ_BATCH_SIZE)
        .build(file)?;

    let mut records = Vec::new();
    for batch in reader {
        let batch = batch?;
        append_batch(&batch, &mut records, limit)?;
        if limit.is_some_and(|limit| records.len() >= limit) {
            break;
        }
    }
    Ok(records)
}

fn read_header(path: &Path) -> Result<Vec<String>, BenchError> {
    let file = File::open(path).map_err(|e| {
        BenchError::DatasetError(format!("opening {}: {}", path.display(), e))
    })?;
    let mut line = String::new();
    BufReader::new(file).read_line(&mut line)?;
    let line = line.trim_start_matches('\u{feff}').trim_end();
    if line.is_empty() {
        return Err(BenchError::DatasetError(format!(
            "{} has no header row",
            path.display()
        )));
    }
    Ok(line
        .split(',')
        .map(|name| name.trim().trim_matches('"').to_string())
        .collect())
}

fn schema_for_header(header: &[String]) -> Result<Schema, BenchError> {
    for (name, _) in COLUMNS.iter() {
        if !header.iter().any(|h| h == name) {
            return Err(BenchError::DatasetError(format!(
                "missing column '{}'",
                name
            )));
        }
    }
    let fields: Vec<Field> = header
        .iter()
        .map(|name| {
            let dtype = COLUMNS
                .iter()
                .find(|(known, _)| known == name)
                .map(|(_, dtype)| dtype.clone())
                .unwrap_or(DataType::Utf8);
            Field::new(name, dtype, true)
        })
        .collect();
    Ok(Schema::new(fields))
}

fn int_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int64Array, BenchError> {
    batch
        .column_by_name(name)
        .and_then(|col| col.as_primitive_opt::<Int64Type>())
        .ok_or_else(|| BenchError::DatasetError(format!("column '{}' is not an integer", name)))
}

fn str_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, BenchError> {
    batch
        .column_by_name(name)
        .and_then(|col| col.as_string_opt::<i32>())
        .ok_or_else(|| BenchError::DatasetError(format!("column '{}' is not text", name)))
}

fn append_batch(
    batch: &RecordBatch,
    records: &mut Vec<DatasetRecord>,
    limit: Option<usize>,
) -> Result<(), BenchError> {
    let course_id = int_column(batch, "course_id")?;
    let course_name = str_column(batch, "course_name")?;
    let course_content = str_column(batch, "course_content")?;
    let student_id = int_column(batch, "student_id")?;
    let student_name = str_column(batch, "student_name")?;
    let student_email = str_column(batch, "student_email_address")?;
    let professor_id = int_column(batch, "professor_id")?;
    let professor_name = str_column(batch, "professor_name")?;
    let professor_email = str_column(batch, "professor_email_address")?;
    let assignment_id = int_column(batch, "assignment_id")?;
    let assignment_title = str_column(batch, "assignment_title")?;
    let submission_status = str_column(batch, "submission_status")?;
    let score = int_column(batch, "score")?;

    let offset = records.len();
    let rows = match limit {
        Some(limit) => batch.num_rows().min(limit.saturating_sub(offset)),
        None => batch.num_rows(),
    };

    for i in 0..rows {
        // Header is line 1.
        let line = offset + i + 2;
        let int = |array: &Int64Array, name: &str| -> Result<i64, BenchError> {
            if array.is_null(i) {
                return Err(BenchError::DatasetError(format!(
                    "line {}: '{}' is empty",
                    line, name
                )));
            }
            Ok(array.value(i))
        };
        let text = |array: &StringArray| -> String {
            if array.is_null(i) {
                String::new()
            } else {
                array.value(i).to_string()
            }
        };
        let status = if submission_status.is_null(i) {
            Err(format!("line {}: 'submission_status' is empty", line))
        } else {
            submission_status
                .value(i)
                .parse::<SubmissionStatus>()
                .map_err(|e| format!("line {}: {}", line, e))
        }
        .map_err(BenchError::DatasetError)?;

        records.push(DatasetRecord {
            course_id: int(course_id, "course_id")?,
            course_name: text(course_name),
            course_content: text(course_content),
            student_id: int(student_id, "student_id")?,
            student_name: text(student_name),
            student_email: text(student_email),
            professor_id: int(professor_id, "professor_id")?,
            professor_name: text(professor_name),
            professor_email: text(professor_email),
            assignment_id: int(assignment_id, "assignment_id")?,
            assignment_title: text(assignment_title),
            submission_status: status,
            score: int(score, "score")?,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    const SHUFFLED: &str = "\
score,submission_status,student_id,student_name,student_email_address,course_id,course_name,course_content,professor_id,professor_name,professor_email_address,assignment_id,assignment_title
28,yes,1,Ada Park,ada_park@example.com,100015,Data Analysis,\"Trends, insights\",9,Lee Chan,lee_chan@example.com,500,Big Data
0,No,2,Bo Diaz,bo_diaz@example.com,100002,Aerospace Engineering,Flight,9,Lee Chan,lee_chan@example.com,501,Aerodynamics
";

    fn write(dir: &TempDir, body: &str) -> std::path::PathBuf {
        let path = dir.path().join("records.csv");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_reads_columns_in_any_order() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, SHUFFLED);

        let records = read_records(&path, None).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].course_id, 100015);
        assert_eq!(records[0].course_content, "Trends, insights");
        assert_eq!(records[0].submission_status, SubmissionStatus::Yes);
        assert_eq!(records[0].score, 28);
        assert_eq!(records[1].student_email, "bo_diaz@example.com");
        assert_eq!(records[1].submission_status, SubmissionStatus::No);
    }

    #[test]
    fn test_limit_stops_early() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, SHUFFLED);

        let records = read_records(&path, Some(1)).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].student_id, 1);
    }

    #[test]
    fn test_missing_column_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "course_id,course_name\n1,Data Analysis\n");

        let err = read_records(&path, None).unwrap_err();
        assert!(matches!(err, BenchError::DatasetError(msg) if msg.contains("course_content")));
    }

    #[test]
    fn test_invalid_status_rejected() {
        let dir = TempDir::new().unwrap();
        let body = SHUFFLED.replace("yes", "pending");
        let path = write(&dir, &body);

        let err = read_records(&path, None).unwrap_err();
        assert!(matches!(err, BenchError::DatasetError(msg) if msg.contains("line 2")));
    }
}
