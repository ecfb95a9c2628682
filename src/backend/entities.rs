//! Normalized views of denormalized dataset rows.

use ahash::AHashSet;

use crate::dataset::{DatasetRecord, SubmissionStatus};

#[derive(Debug, Clone, PartialEq)]
pub struct Course {
    pub course_id: i64,
    pub course_name: String,
    pub course_content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Student {
    pub student_id: i64,
    pub student_name: String,
    pub student_email: String,
    pub course_id: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Professor {
    pub professor_id: i64,
    pub professor_name: String,
    pub professor_email: String,
    pub course_id: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub assignment_id: i64,
    pub assignment_title: String,
    pub submission_status: SubmissionStatus,
    pub score: i64,
    pub student_id: i64,
    pub course_id: i64,
}

/// Rows of the four entity tables, in order of first appearance.
///
/// A primary key seen twice keeps its first row, the way `INSERT IGNORE`
/// behaves on a relational store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entities {
    pub courses: Vec<Course>,
    pub students: Vec<Student>,
    pub professors: Vec<Professor>,
    pub assignments: Vec<Assignment>,
}

impl Entities {
    pub fn split(records: &[DatasetRecord]) -> Self {
        let mut entities = Entities::default();
        let mut course_ids = AHashSet::new();
        let mut student_ids = AHashSet::new();
        let mut professor_ids = AHashSet::new();
        let mut assignment_ids = AHashSet::new();

        for r in records {
            if course_ids.insert(r.course_id) {
                entities.courses.push(Course {
                    course_id: r.course_id,
                    course_name: r.course_name.clone(),
                    course_content: r.course_content.clone(),
                });
            }
            if student_ids.insert(r.student_id) {
                entities.students.push(Student {
                    student_id: r.student_id,
                    student_name: r.student_name.clone(),
                    student_email: r.student_email.clone(),
                    course_id: r.course_id,
                });
            }
            if professor_ids.insert(r.professor_id) {
                entities.professors.push(Professor {
                    professor_id: r.professor_id,
                    professor_name: r.professor_name.clone(),
                    professor_email: r.professor_email.clone(),
                    course_id: r.course_id,
                });
            }
            if assignment_ids.insert(r.assignment_id) {
                entities.assignments.push(Assignment {
                    assignment_id: r.assignment_id,
                    assignment_title: r.assignment_title.clone(),
                    submission_status: r.submission_status,
                    score: r.score,
                    student_id: r.student_id,
                    course_id: r.course_id,
                });
            }
        }
        entities
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::record;

    #[test]
    fn test_first_row_wins() {
        let mut duplicate = record(100_001, "Economics", 2, 10, SubmissionStatus::Yes, 25);
        duplicate.student_name = "Second Name".to_string();
        let records = vec![
            record(100_001, "Economics", 2, 11, SubmissionStatus::No, 0),
            duplicate,
            record(100_015, "Data Analysis", 3, 11, SubmissionStatus::Yes, 29),
        ];

        let entities = Entities::split(&records);
        assert_eq!(entities.courses.len(), 2);
        assert_eq!(entities.students.len(), 2);
        assert_eq!(entities.students[0].student_name, records[0].student_name);
        assert_eq!(entities.assignments.len(), 2);
        let first = &entities.assignments[0];
        assert_eq!((first.assignment_id, first.student_id), (11, 2));
        assert_eq!(first.submission_status, SubmissionStatus::No);
    }
}
