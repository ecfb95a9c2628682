use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Canonical submission status.
///
/// Source files disagree on casing ("Yes" vs "yes"); parsing is
/// case-insensitive and every backend stores and queries [`as_str`](Self::as_str).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubmissionStatus {
    Yes,
    No,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Yes => "Yes",
            SubmissionStatus::No => "No",
        }
    }

    pub fn is_submitted(&self) -> bool {
        matches!(self, SubmissionStatus::Yes)
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmissionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("yes") {
            Ok(SubmissionStatus::Yes)
        } else if s.eq_ignore_ascii_case("no") {
            Ok(SubmissionStatus::No)
        } else {
            Err(format!("invalid submission status '{s}'"))
        }
    }
}

/// One denormalized dataset row: a student enrolled in a course, the course's
/// professor, and one assignment of that student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub course_id: i64,
    pub course_name: String,
    pub course_content: String,
    pub student_id: i64,
    pub student_name: String,
    pub student_email: String,
    pub professor_id: i64,
    pub professor_name: String,
    pub professor_email: String,
    pub assignment_id: i64,
    pub assignment_title: String,
    pub submission_status: SubmissionStatus,
    pub score: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing_ignores_case() {
        assert_eq!("Yes".parse(), Ok(SubmissionStatus::Yes));
        assert_eq!("yes".parse(), Ok(SubmissionStatus::Yes));
        assert_eq!(" NO ".parse(), Ok(SubmissionStatus::No));
        assert!("maybe".parse::<SubmissionStatus>().is_err());
    }

    #[test]
    fn test_status_canonical_text() {
        assert_eq!(SubmissionStatus::Yes.to_string(), "Yes");
        assert_eq!(SubmissionStatus::No.as_str(), "No");
        assert!(SubmissionStatus::Yes.is_submitted());
    }
}
