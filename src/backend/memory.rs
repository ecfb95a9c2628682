//! In-process relational backend.
//!
//! Four tables keyed by primary key plus the secondary indexes the queries
//! need. Serves as the reference semantics for Q1..Q4.

use ahash::AHashMap;
use async_trait::async_trait;
use log::debug;
use tokio::sync::RwLock;

use crate::backend::entities::{Assignment, Course, Entities, Professor, Student};
use crate::backend::{Backend, QueryOutput, QueryRow, RecordCounts};
use crate::core::{
    BenchError, LogicalQuery, Q3_SCORE, Q3_STUDENT_IDS, Q4_SCORE_THRESHOLD, QUERY_LIMIT,
    TARGET_COURSE_NAME,
};
use crate::dataset::{Dataset, SubmissionStatus};

#[derive(Default)]
struct Tables {
    courses: AHashMap<i64, Course>,
    students: Vec<Student>,
    student_pos: AHashMap<i64, usize>,
    professors: AHashMap<i64, Professor>,
    assignments: Vec<Assignment>,
    assignment_pos: AHashMap<i64, usize>,

    // Secondary indexes, rebuilt after every load.
    courses_by_name: AHashMap<String, Vec<i64>>,
    students_by_course: AHashMap<i64, Vec<usize>>,
    assignments_by_student: AHashMap<i64, Vec<usize>>,
}

impl Tables {
    fn insert(&mut self, entities: Entities) {
        for course in entities.courses {
            self.courses.entry(course.course_id).or_insert(course);
        }
        for student in entities.students {
            if !self.student_pos.contains_key(&student.student_id) {
                self.student_pos
                    .insert(student.student_id, self.students.len());
                self.students.push(student);
            }
        }
        for professor in entities.professors {
            self.professors
                .entry(professor.professor_id)
                .or_insert(professor);
        }
        for assignment in entities.assignments {
            if !self.assignment_pos.contains_key(&assignment.assignment_id) {
                self.assignment_pos
                    .insert(assignment.assignment_id, self.assignments.len());
                self.assignments.push(assignment);
            }
        }
    }

    fn build_indexes(&mut self) {
        self.courses_by_name.clear();
        for course in self.courses.values() {
            self.courses_by_name
                .entry(course.course_name.clone())
                .or_default()
                .push(course.course_id);
        }
        for ids in self.courses_by_name.values_mut() {
            ids.sort_unstable();
        }

        self.students_by_course.clear();
        for (pos, student) in self.students.iter().enumerate() {
            self.students_by_course
                .entry(student.course_id)
                .or_default()
                .push(pos);
        }

        self.assignments_by_student.clear();
        for (pos, assignment) in self.assignments.iter().enumerate() {
            self.assignments_by_student
                .entry(assignment.student_id)
                .or_default()
                .push(pos);
        }
    }

    fn target_courses(&self) -> &[i64] {
        self.courses_by_name
            .get(TARGET_COURSE_NAME)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Students of the target course, in load order.
    fn target_students(&self) -> impl Iterator<Item = &Student> {
        self.target_courses()
            .iter()
            .filter_map(|id| self.students_by_course.get(id))
            .flatten()
            .map(|pos| &self.students[*pos])
    }

    fn assignments_of(&self, student_id: i64) -> impl Iterator<Item = &Assignment> {
        self.assignments_by_student
            .get(&student_id)
            .into_iter()
            .flatten()
            .map(|pos| &self.assignments[*pos])
    }

    fn joined_row(&self, student: &Student, course: &Course, assignment: &Assignment) -> QueryRow {
        QueryRow {
            student_id: student.student_id,
            student_name: student.student_name.clone(),
            course_id: Some(course.course_id),
            course_name: Some(course.course_name.clone()),
            assignment_id: Some(assignment.assignment_id),
            submission_status: Some(assignment.submission_status),
            score: Some(assignment.score),
        }
    }

    fn first_students(&self) -> Vec<QueryRow> {
        self.target_students()
            .take(QUERY_LIMIT)
            .map(|s| QueryRow::student(s.student_id, s.student_name.clone()))
            .collect()
    }

    fn submitted_students(&self) -> Vec<QueryRow> {
        self.target_students()
            .filter(|s| {
                self.assignments_of(s.student_id)
                    .any(|a| a.submission_status.is_submitted())
            })
            .take(QUERY_LIMIT)
            .map(|s| QueryRow::student(s.student_id, s.student_name.clone()))
            .collect()
    }

    fn mark_submitted(&mut self, student_ids: &[i64]) -> usize {
        let mut updated = 0;
        for student_id in student_ids {
            let Some(positions) = self.assignments_by_student.get(student_id) else {
                continue;
            };
            for pos in positions {
                let assignment = &mut self.assignments[*pos];
                assignment.submission_status = SubmissionStatus::Yes;
                assignment.score = Q3_SCORE;
                updated += 1;
            }
        }
        updated
    }

    fn students_with_assignments(&self, student_ids: &[i64]) -> Vec<QueryRow> {
        let mut rows = Vec::new();
        for student_id in student_ids {
            let Some(student) = self.student_pos.get(student_id).map(|p| &self.students[*p])
            else {
                continue;
            };
            let Some(course) = self.courses.get(&student.course_id) else {
                continue;
            };
            for assignment in self.assignments_of(*student_id) {
                rows.push(self.joined_row(student, course, assignment));
            }
        }
        rows.sort_by_key(|r| (r.student_id, r.assignment_id));
        rows
    }

    fn high_scorers(&self) -> Vec<QueryRow> {
        let mut rows = Vec::new();
        for student in self.target_students() {
            let Some(course) = self.courses.get(&student.course_id) else {
                continue;
            };
            for assignment in self.assignments_of(student.student_id) {
                if assignment.submission_status.is_submitted()
                    && assignment.score > Q4_SCORE_THRESHOLD
                {
                    rows.push(self.joined_row(student, course, assignment));
                }
            }
        }
        rows
    }

    fn counts(&self) -> RecordCounts {
        RecordCounts {
            courses: self.courses.len(),
            students: self.students.len(),
            professors: self.professors.len(),
            assignments: self.assignments.len(),
        }
    }
}

pub struct MemoryBackend {
    tables: RwLock<Tables>,
    batch_size: usize,
}

impl MemoryBackend {
    pub fn new(batch_size: usize) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            batch_size: batch_size.max(1),
        }
    }

    /// Primary keys of every loaded student, in load order.
    pub async fn student_ids(&self) -> Vec<i64> {
        let tables = self.tables.read().await;
        tables.students.iter().map(|s| s.student_id).collect()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn reset(&self) -> Result<(), BenchError> {
        *self.tables.write().await = Tables::default();
        Ok(())
    }

    async fn bulk_load(&self, dataset: &Dataset, tier_size: usize) -> Result<(), BenchError> {
        let records = dataset.prefix(tier_size);
        for chunk in records.chunks(self.batch_size) {
            let entities = Entities::split(chunk);
            self.tables.write().await.insert(entities);
        }
        let mut tables = self.tables.write().await;
        tables.build_indexes();
        debug!("memory backend loaded {:?}", tables.counts());
        Ok(())
    }

    async fn run_query(&self, query: LogicalQuery) -> Result<QueryOutput, BenchError> {
        let rows = match query {
            LogicalQuery::Q1 => self.tables.read().await.first_students(),
            LogicalQuery::Q2 => self.tables.read().await.submitted_students(),
            LogicalQuery::Q3 => {
                let mut tables = self.tables.write().await;
                tables.mark_submitted(&Q3_STUDENT_IDS);
                tables.students_with_assignments(&Q3_STUDENT_IDS)
            }
            LogicalQuery::Q4 => self.tables.read().await.high_scorers(),
        };
        Ok(QueryOutput::new(rows))
    }

    async fn count_records(&self) -> Result<RecordCounts, BenchError> {
        Ok(self.tables.read().await.counts())
    }

    async fn close(&self) -> Result<(), BenchError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{record, target_course_dataset};

    async fn loaded(dataset: &Dataset) -> MemoryBackend {
        let backend = MemoryBackend::new(2);
        backend.reset().await.unwrap();
        backend.bulk_load(dataset, dataset.len()).await.unwrap();
        backend
    }

    #[tokio::test]
    async fn test_q1_limits_to_ten_target_students() {
        let dataset = target_course_dataset(15);
        let backend = loaded(&dataset).await;

        let output = backend.run_query(LogicalQuery::Q1).await.unwrap();
        assert_eq!(output.len(), QUERY_LIMIT);
        let expected: Vec<i64> = dataset.records()[..QUERY_LIMIT]
            .iter()
            .map(|r| r.student_id)
            .collect();
        assert_eq!(output.student_ids(), expected);
    }

    #[tokio::test]
    async fn test_q1_without_target_course_is_empty() {
        let dataset = Dataset::from_records(vec![
            record(100_001, "Economics", 1, 10, SubmissionStatus::Yes, 28),
            record(100_002, "Nursing", 2, 11, SubmissionStatus::No, 0),
        ]);
        let backend = loaded(&dataset).await;

        for query in LogicalQuery::ALL {
            let output = backend.run_query(query).await.unwrap();
            assert!(output.is_empty(), "{query} returned {:?}", output);
        }
    }

    #[tokio::test]
    async fn test_q2_requires_submitted_assignment() {
        let dataset = Dataset::from_records(vec![
            record(100_015, TARGET_COURSE_NAME, 1, 10, SubmissionStatus::No, 0),
            record(100_015, TARGET_COURSE_NAME, 2, 11, SubmissionStatus::Yes, 20),
            record(100_001, "Economics", 3, 12, SubmissionStatus::Yes, 30),
        ]);
        let backend = loaded(&dataset).await;

        let output = backend.run_query(LogicalQuery::Q2).await.unwrap();
        assert_eq!(output.student_ids(), vec![2]);
        assert_eq!(output.rows[0].course_name, None);
    }

    #[tokio::test]
    async fn test_q3_mutation_visible_to_later_reads() {
        let dataset = Dataset::from_records(vec![
            record(100_015, TARGET_COURSE_NAME, Q3_STUDENT_IDS[0], 10, SubmissionStatus::No, 0),
            record(100_015, TARGET_COURSE_NAME, Q3_STUDENT_IDS[1], 11, SubmissionStatus::No, 0),
            record(100_015, TARGET_COURSE_NAME, 7, 12, SubmissionStatus::Yes, 20),
        ]);
        let backend = loaded(&dataset).await;

        let before = backend.run_query(LogicalQuery::Q4).await.unwrap();
        assert!(before.is_empty());

        let output = backend.run_query(LogicalQuery::Q3).await.unwrap();
        assert_eq!(output.len(), 2);
        for row in &output.rows {
            assert!(Q3_STUDENT_IDS.contains(&row.student_id));
            assert_eq!(row.course_name.as_deref(), Some(TARGET_COURSE_NAME));
            assert_eq!(row.submission_status, Some(SubmissionStatus::Yes));
            assert_eq!(row.score, Some(Q3_SCORE));
        }

        let after = backend.run_query(LogicalQuery::Q4).await.unwrap();
        let mut ids = after.student_ids();
        ids.sort_unstable();
        let mut expected = Q3_STUDENT_IDS.to_vec();
        expected.sort_unstable();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_q3_is_idempotent() {
        let dataset = target_course_dataset(4);
        let backend = loaded(&dataset).await;

        let first = backend.run_query(LogicalQuery::Q3).await.unwrap();
        let second = backend.run_query(LogicalQuery::Q3).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(
            backend.count_records().await.unwrap().assignments,
            Entities::split(dataset.records()).assignments.len()
        );
    }

    #[tokio::test]
    async fn test_q4_threshold_is_strict() {
        let dataset = Dataset::from_records(vec![
            record(100_015, TARGET_COURSE_NAME, 1, 10, SubmissionStatus::Yes, Q4_SCORE_THRESHOLD),
            record(100_015, TARGET_COURSE_NAME, 2, 11, SubmissionStatus::Yes, Q4_SCORE_THRESHOLD + 1),
            record(100_015, TARGET_COURSE_NAME, 3, 12, SubmissionStatus::No, 30),
        ]);
        let backend = loaded(&dataset).await;

        let output = backend.run_query(LogicalQuery::Q4).await.unwrap();
        assert_eq!(output.student_ids(), vec![2]);
        assert_eq!(output.rows[0].score, Some(Q4_SCORE_THRESHOLD + 1));
    }

    #[tokio::test]
    async fn test_reset_clears_everything() {
        let dataset = target_course_dataset(5);
        let backend = loaded(&dataset).await;
        assert_eq!(backend.count_records().await.unwrap().students, 5);

        backend.reset().await.unwrap();
        backend.reset().await.unwrap();
        assert_eq!(backend.count_records().await.unwrap(), RecordCounts::default());
        assert!(backend.run_query(LogicalQuery::Q1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_is_chunked_but_complete() {
        let dataset = target_course_dataset(9);
        let backend = MemoryBackend::new(4);
        backend.bulk_load(&dataset, 7).await.unwrap();

        let ids = backend.student_ids().await;
        let expected: Vec<i64> = dataset.prefix(7).iter().map(|r| r.student_id).collect();
        assert_eq!(ids, expected);
    }
}
