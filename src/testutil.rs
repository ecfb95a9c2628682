//! Test and benchmark utilities.
//!
//! Available to unit tests, and to integration tests and benches through the
//! `testutil` feature.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tempfile::TempDir;

use crate::backend::{Backend, MemoryBackend, QueryOutput, RecordCounts};
use crate::core::{BenchError, LogicalQuery, Q3_STUDENT_IDS, TARGET_COURSE_NAME};
use crate::dataset::{Dataset, DatasetRecord, SubmissionStatus, write_csv};

/// A dataset row with derived names, e-mails and professor.
pub fn record(
    course_id: i64,
    course_name: &str,
    student_id: i64,
    assignment_id: i64,
    submission_status: SubmissionStatus,
    score: i64,
) -> DatasetRecord {
    DatasetRecord {
        course_id,
        course_name: course_name.to_string(),
        course_content: format!("About {}", course_name),
        student_id,
        student_name: format!("Student {}", student_id),
        student_email: format!("student_{}@example.com", student_id),
        professor_id: course_id + 500_000,
        professor_name: format!("Professor {}", course_id),
        professor_email: format!("professor_{}@example.com", course_id),
        assignment_id,
        assignment_title: format!("Assignment {}", assignment_id),
        submission_status,
        score,
    }
}

/// `n` students of the target course. The first two are the Q3 students;
/// odd rows have a submitted assignment.
pub fn target_course_dataset(n: usize) -> Dataset {
    let records = (0..n)
        .map(|i| {
            let student_id = Q3_STUDENT_IDS.get(i).copied().unwrap_or(i as i64 + 1);
            let (status, score) = if i % 2 == 1 {
                (SubmissionStatus::Yes, 18 + (i as i64 % 13))
            } else {
                (SubmissionStatus::No, 0)
            };
            record(100_015, TARGET_COURSE_NAME, student_id, 1_000 + i as i64, status, score)
        })
        .collect();
    Dataset::from_records(records)
}

/// Four rows over two courses: the target course and one other.
pub fn four_row_dataset() -> Dataset {
    Dataset::from_records(vec![
        record(100_015, TARGET_COURSE_NAME, Q3_STUDENT_IDS[0], 2_001, SubmissionStatus::No, 0),
        record(100_003, "Supply Chain Management & Logistics", 11, 2_002, SubmissionStatus::Yes, 22),
        record(100_015, TARGET_COURSE_NAME, Q3_STUDENT_IDS[1], 2_003, SubmissionStatus::Yes, 28),
        record(100_003, "Supply Chain Management & Logistics", 12, 2_004, SubmissionStatus::No, 0),
    ])
}

/// Write `dataset` as CSV into a fresh temp dir. Keep the dir alive while reading.
pub fn write_dataset(dataset: &Dataset) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("records.csv");
    write_csv(&path, dataset.records()).unwrap();
    (dir, path)
}

/// Memory backend whose queries or loads can be made to fail, counting calls.
pub struct FlakyBackend {
    inner: MemoryBackend,
    failing_query: Option<LogicalQuery>,
    fail_load_at: Option<usize>,
    query_calls: AtomicUsize,
    load_calls: AtomicUsize,
    close_calls: AtomicUsize,
}

impl FlakyBackend {
    pub fn new() -> Self {
        Self {
            inner: MemoryBackend::new(2),
            failing_query: None,
            fail_load_at: None,
            query_calls: AtomicUsize::new(0),
            load_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
        }
    }

    /// Every invocation of `query` fails.
    pub fn failing_query(mut self, query: LogicalQuery) -> Self {
        self.failing_query = Some(query);
        self
    }

    /// The `n`-th bulk load (0-based) fails.
    pub fn failing_load(mut self, n: usize) -> Self {
        self.fail_load_at = Some(n);
        self
    }

    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

impl Default for FlakyBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for FlakyBackend {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn reset(&self) -> Result<(), BenchError> {
        self.inner.reset().await
    }

    async fn bulk_load(&self, dataset: &Dataset, tier_size: usize) -> Result<(), BenchError> {
        let call = self.load_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_load_at == Some(call) {
            return Err(BenchError::LoadError(format!("injected failure on load {call}")));
        }
        self.inner.bulk_load(dataset, tier_size).await
    }

    async fn run_query(&self, query: LogicalQuery) -> Result<QueryOutput, BenchError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_query == Some(query) {
            return Err(BenchError::QueryError(format!("injected failure in {query}")));
        }
        self.inner.run_query(query).await
    }

    async fn count_records(&self) -> Result<RecordCounts, BenchError> {
        self.inner.count_records().await
    }

    async fn close(&self) -> Result<(), BenchError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.close().await
    }
}
