//! Wide-column backend on Cassandra (or ScyllaDB) through the `scylla` driver.
//!
//! Base tables keyed by entity id, plus one table per access path so that
//! every query reads whole partitions:
//! - `courses_by_name`: course ids per name
//! - `students_by_course`: students clustered by load position
//! - `assignments_by_student`: a student's assignments
//! - `assignments_by_course`: every assignment of a course with its student
//!
//! Q3 updates each denormalized copy of an assignment.

use std::fmt::Display;
use std::sync::Arc;

use ahash::AHashMap;
use async_trait::async_trait;
use log::debug;
use scylla::QueryResult;
use scylla::batch::{Batch, BatchType};
use scylla::cql_to_rust::FromRow;
use scylla::serialize::row::SerializeRow;
use scylla::{Session, SessionBuilder};
use tokio::sync::RwLock;

use crate::backend::entities::Entities;
use crate::backend::{Backend, Endpoint, QueryOutput, QueryRow, RecordCounts};
use crate::conf::BackendConfig;
use crate::core::{
    BenchError, LogicalQuery, Q3_SCORE, Q3_STUDENT_IDS, Q4_SCORE_THRESHOLD, QUERY_LIMIT,
    TARGET_COURSE_NAME,
};
use crate::dataset::{Dataset, SubmissionStatus};

const TABLES: [&str; 8] = [
    "CREATE TABLE IF NOT EXISTS {ks}.courses (
        course_id bigint PRIMARY KEY,
        course_name text,
        course_content text)",
    "CREATE TABLE IF NOT EXISTS {ks}.students (
        student_id bigint PRIMARY KEY,
        student_name text,
        student_email_address text,
        course_id bigint)",
    "CREATE TABLE IF NOT EXISTS {ks}.professors (
        professor_id bigint PRIMARY KEY,
        professor_name text,
        professor_email_address text,
        course_id bigint)",
    "CREATE TABLE IF NOT EXISTS {ks}.assignments (
        assignment_id bigint PRIMARY KEY,
        assignment_title text,
        submission_status text,
        score bigint,
        student_id bigint,
        course_id bigint)",
    "CREATE TABLE IF NOT EXISTS {ks}.courses_by_name (
        course_name text,
        course_id bigint,
        PRIMARY KEY (course_name, course_id))",
    "CREATE TABLE IF NOT EXISTS {ks}.students_by_course (
        course_id bigint,
        position bigint,
        student_id bigint,
        student_name text,
        PRIMARY KEY (course_id, position))",
    "CREATE TABLE IF NOT EXISTS {ks}.assignments_by_student (
        student_id bigint,
        assignment_id bigint,
        course_id bigint,
        submission_status text,
        score bigint,
        PRIMARY KEY (student_id, assignment_id))",
    "CREATE TABLE IF NOT EXISTS {ks}.assignments_by_course (
        course_id bigint,
        student_id bigint,
        assignment_id bigint,
        student_name text,
        submission_status text,
        score bigint,
        PRIMARY KEY (course_id, student_id, assignment_id))",
];

fn err_with<E: Display>(
    ctor: fn(String) -> BenchError,
    what: &'static str,
) -> impl Fn(E) -> BenchError {
    move |e| ctor(format!("cassandra {}: {}", what, e))
}

/// Keyspace names are interpolated into CQL, so only plain identifiers pass.
fn keyspace_name(name: &str) -> Result<&str, BenchError> {
    let valid = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(name)
    } else {
        Err(BenchError::ConnectionError(format!(
            "cassandra: invalid keyspace name '{}'",
            name
        )))
    }
}

fn typed_rows<R: FromRow>(result: QueryResult) -> Result<Vec<R>, BenchError> {
    result
        .rows_typed::<R>()
        .map_err(err_with(BenchError::QueryError, "rows"))?
        .collect::<Result<Vec<R>, _>>()
        .map_err(err_with(BenchError::QueryError, "row type"))
}

pub struct CassandraBackend {
    session: RwLock<Option<Arc<Session>>>,
    keyspace: String,
    batch_size: usize,
}

impl CassandraBackend {
    /// Connects to the comma-separated contact points of
    /// `cassandra://host:port[,host:port...]`. The keyspace is `config.database`.
    pub async fn connect(config: &BackendConfig) -> Result<Self, BenchError> {
        let keyspace = keyspace_name(&config.database)?.to_string();
        let nodes = Endpoint::parse(config.endpoint())
            .map(|e| e.address)
            .unwrap_or(config.endpoint());

        let mut builder = SessionBuilder::new().connection_timeout(config.connect_timeout);
        for node in nodes.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            builder = builder.known_node(node);
        }
        let session = tokio::time::timeout(config.connect_timeout, builder.build())
            .await
            .map_err(|_| {
                BenchError::ConnectionError(format!(
                    "cassandra: no connection after {:?}",
                    config.connect_timeout
                ))
            })?
            .map_err(err_with(BenchError::ConnectionError, "connect"))?;

        Ok(Self {
            session: RwLock::new(Some(Arc::new(session))),
            keyspace,
            batch_size: config.batch_size(),
        })
    }

    async fn session(&self) -> Result<Arc<Session>, BenchError> {
        self.session
            .read()
            .await
            .clone()
            .ok_or_else(|| BenchError::ConnectionError("cassandra session is closed".to_string()))
    }

    fn cql(&self, statement: &str) -> String {
        statement.replace("{ks}", &self.keyspace)
    }

    async fn insert_batched<T>(
        &self,
        session: &Session,
        statement: &str,
        rows: Vec<T>,
    ) -> Result<(), BenchError>
    where
        T: SerializeRow + Clone + Send + Sync,
    {
        let load_err = err_with(BenchError::LoadError, "insert");
        let prepared = session
            .prepare(self.cql(statement))
            .await
            .map_err(&load_err)?;
        for chunk in rows.chunks(self.batch_size) {
            let mut batch = Batch::new(BatchType::Unlogged);
            for _ in chunk {
                batch.append_statement(prepared.clone());
            }
            session
                .batch(&batch, chunk.to_vec())
                .await
                .map_err(&load_err)?;
        }
        Ok(())
    }

    async fn target_course_ids(&self, session: &Session) -> Result<Vec<i64>, BenchError> {
        let result = session
            .query_unpaged(
                self.cql("SELECT course_id FROM {ks}.courses_by_name WHERE course_name = ?"),
                (TARGET_COURSE_NAME,),
            )
            .await
            .map_err(err_with(BenchError::QueryError, "courses_by_name"))?;
        Ok(typed_rows::<(i64,)>(result)?
            .into_iter()
            .map(|(id,)| id)
            .collect())
    }

    async fn first_students(&self, session: &Session) -> Result<Vec<QueryRow>, BenchError> {
        let query_err = err_with(BenchError::QueryError, "query_1");
        let mut rows = Vec::new();
        for course_id in self.target_course_ids(session).await? {
            let remaining = QUERY_LIMIT - rows.len();
            if remaining == 0 {
                break;
            }
            let result = session
                .query_unpaged(
                    self.cql(
                        "SELECT student_id, student_name FROM {ks}.students_by_course
                         WHERE course_id = ? LIMIT ?",
                    ),
                    (course_id, remaining as i32),
                )
                .await
                .map_err(&query_err)?;
            rows.extend(
                typed_rows::<(i64, String)>(result)?
                    .into_iter()
                    .map(|(id, name)| QueryRow::student(id, name)),
            );
        }
        Ok(rows)
    }

    async fn submitted_students(&self, session: &Session) -> Result<Vec<QueryRow>, BenchError> {
        let query_err = err_with(BenchError::QueryError, "query_2");
        let mut rows: Vec<QueryRow> = Vec::new();
        for course_id in self.target_course_ids(session).await? {
            let result = session
                .query_unpaged(
                    self.cql(
                        "SELECT student_id, student_name FROM {ks}.assignments_by_course
                         WHERE course_id = ? AND submission_status = ? ALLOW FILTERING",
                    ),
                    (course_id, SubmissionStatus::Yes.as_str()),
                )
                .await
                .map_err(&query_err)?;
            for (id, name) in typed_rows::<(i64, String)>(result)? {
                // Rows cluster by student, so repeats are adjacent.
                if rows.last().is_some_and(|r| r.student_id == id) {
                    continue;
                }
                rows.push(QueryRow::student(id, name));
                if rows.len() == QUERY_LIMIT {
                    return Ok(rows);
                }
            }
        }
        Ok(rows)
    }

    async fn mark_submitted(&self, session: &Session) -> Result<Vec<QueryRow>, BenchError> {
        let query_err = err_with(BenchError::QueryError, "query_3");
        let status = SubmissionStatus::Yes.as_str();
        let update_base = session
            .prepare(self.cql(
                "UPDATE {ks}.assignments SET submission_status = ?, score = ?
                 WHERE assignment_id = ?",
            ))
            .await
            .map_err(&query_err)?;
        let update_by_student = session
            .prepare(self.cql(
                "UPDATE {ks}.assignments_by_student SET submission_status = ?, score = ?
                 WHERE student_id = ? AND assignment_id = ?",
            ))
            .await
            .map_err(&query_err)?;
        let update_by_course = session
            .prepare(self.cql(
                "UPDATE {ks}.assignments_by_course SET submission_status = ?, score = ?
                 WHERE course_id = ? AND student_id = ? AND assignment_id = ?",
            ))
            .await
            .map_err(&query_err)?;

        let mut rows = Vec::new();
        for student_id in Q3_STUDENT_IDS {
            let result = session
                .query_unpaged(
                    self.cql(
                        "SELECT student_name, course_id FROM {ks}.students WHERE student_id = ?",
                    ),
                    (student_id,),
                )
                .await
                .map_err(&query_err)?;
            let Some((student_name, course_id)) =
                typed_rows::<(String, i64)>(result)?.into_iter().next()
            else {
                continue;
            };
            let result = session
                .query_unpaged(
                    self.cql(
                        "SELECT assignment_id, course_id FROM {ks}.assignments_by_student
                         WHERE student_id = ?",
                    ),
                    (student_id,),
                )
                .await
                .map_err(&query_err)?;
            let assignments = typed_rows::<(i64, i64)>(result)?;

            for (assignment_id, assignment_course) in &assignments {
                session
                    .execute_unpaged(&update_base, (status, Q3_SCORE, *assignment_id))
                    .await
                    .map_err(&query_err)?;
                session
                    .execute_unpaged(
                        &update_by_student,
                        (status, Q3_SCORE, student_id, *assignment_id),
                    )
                    .await
                    .map_err(&query_err)?;
                session
                    .execute_unpaged(
                        &update_by_course,
                        (status, Q3_SCORE, *assignment_course, student_id, *assignment_id),
                    )
                    .await
                    .map_err(&query_err)?;
            }

            let result = session
                .query_unpaged(
                    self.cql("SELECT course_name FROM {ks}.courses WHERE course_id = ?"),
                    (course_id,),
                )
                .await
                .map_err(&query_err)?;
            let course_name = typed_rows::<(String,)>(result)?
                .into_iter()
                .next()
                .map(|(name,)| name);

            let result = session
                .query_unpaged(
                    self.cql(
                        "SELECT assignment_id, submission_status, score
                         FROM {ks}.assignments_by_student WHERE student_id = ?",
                    ),
                    (student_id,),
                )
                .await
                .map_err(&query_err)?;
            for (assignment_id, submission_status, score) in
                typed_rows::<(i64, String, i64)>(result)?
            {
                rows.push(QueryRow {
                    student_id,
                    student_name: student_name.clone(),
                    course_id: Some(course_id),
                    course_name: course_name.clone(),
                    assignment_id: Some(assignment_id),
                    submission_status: submission_status.parse().ok(),
                    score: Some(score),
                });
            }
        }
        rows.sort_by_key(|r| (r.student_id, r.assignment_id));
        Ok(rows)
    }

    async fn high_scorers(&self, session: &Session) -> Result<Vec<QueryRow>, BenchError> {
        let query_err = err_with(BenchError::QueryError, "query_4");
        let mut rows = Vec::new();
        for course_id in self.target_course_ids(session).await? {
            let result = session
                .query_unpaged(
                    self.cql(
                        "SELECT student_id, student_name, assignment_id, submission_status, score
                         FROM {ks}.assignments_by_course
                         WHERE course_id = ? AND submission_status = ? AND score > ?
                         ALLOW FILTERING",
                    ),
                    (course_id, SubmissionStatus::Yes.as_str(), Q4_SCORE_THRESHOLD),
                )
                .await
                .map_err(&query_err)?;
            for (student_id, student_name, assignment_id, submission_status, score) in
                typed_rows::<(i64, String, i64, String, i64)>(result)?
            {
                rows.push(QueryRow {
                    student_id,
                    student_name,
                    course_id: Some(course_id),
                    course_name: Some(TARGET_COURSE_NAME.to_string()),
                    assignment_id: Some(assignment_id),
                    submission_status: submission_status.parse().ok(),
                    score: Some(score),
                });
            }
        }
        Ok(rows)
    }

    async fn count(&self, session: &Session, table: &str) -> Result<usize, BenchError> {
        let result = session
            .query_unpaged(self.cql(&format!("SELECT COUNT(*) FROM {{ks}}.{}", table)), ())
            .await
            .map_err(err_with(BenchError::QueryError, "count"))?;
        let n = typed_rows::<(i64,)>(result)?
            .into_iter()
            .next()
            .map_or(0, |(n,)| n);
        Ok(n as usize)
    }
}

#[async_trait]
impl Backend for CassandraBackend {
    fn name(&self) -> &'static str {
        "cassandra"
    }

    /// Drops and recreates the keyspace with every table.
    async fn reset(&self) -> Result<(), BenchError> {
        let session = self.session().await?;
        let reset_err = err_with(BenchError::LoadError, "reset");
        session
            .query_unpaged(self.cql("DROP KEYSPACE IF EXISTS {ks}"), ())
            .await
            .map_err(&reset_err)?;
        session
            .query_unpaged(
                self.cql(
                    "CREATE KEYSPACE IF NOT EXISTS {ks}
                     WITH replication = {'class': 'SimpleStrategy', 'replication_factor': 1}",
                ),
                (),
            )
            .await
            .map_err(&reset_err)?;
        for ddl in TABLES {
            session
                .query_unpaged(self.cql(ddl), ())
                .await
                .map_err(&reset_err)?;
        }
        Ok(())
    }

    async fn bulk_load(&self, dataset: &Dataset, tier_size: usize) -> Result<(), BenchError> {
        let session = self.session().await?;
        let entities = Entities::split(dataset.prefix(tier_size));

        self.insert_batched(
            &session,
            "INSERT INTO {ks}.courses (course_id, course_name, course_content) VALUES (?, ?, ?)",
            entities
                .courses
                .iter()
                .map(|c| (c.course_id, c.course_name.as_str(), c.course_content.as_str()))
                .collect(),
        )
        .await?;
        self.insert_batched(
            &session,
            "INSERT INTO {ks}.courses_by_name (course_name, course_id) VALUES (?, ?)",
            entities
                .courses
                .iter()
                .map(|c| (c.course_name.as_str(), c.course_id))
                .collect(),
        )
        .await?;
        self.insert_batched(
            &session,
            "INSERT INTO {ks}.students (student_id, student_name, student_email_address, course_id)
             VALUES (?, ?, ?, ?)",
            entities
                .students
                .iter()
                .map(|s| {
                    (
                        s.student_id,
                        s.student_name.as_str(),
                        s.student_email.as_str(),
                        s.course_id,
                    )
                })
                .collect(),
        )
        .await?;
        self.insert_batched(
            &session,
            "INSERT INTO {ks}.students_by_course (course_id, position, student_id, student_name)
             VALUES (?, ?, ?, ?)",
            entities
                .students
                .iter()
                .enumerate()
                .map(|(pos, s)| (s.course_id, pos as i64, s.student_id, s.student_name.as_str()))
                .collect(),
        )
        .await?;
        self.insert_batched(
            &session,
            "INSERT INTO {ks}.professors
             (professor_id, professor_name, professor_email_address, course_id)
             VALUES (?, ?, ?, ?)",
            entities
                .professors
                .iter()
                .map(|p| {
                    (
                        p.professor_id,
                        p.professor_name.as_str(),
                        p.professor_email.as_str(),
                        p.course_id,
                    )
                })
                .collect(),
        )
        .await?;
        self.insert_batched(
            &session,
            "INSERT INTO {ks}.assignments
             (assignment_id, assignment_title, submission_status, score, student_id, course_id)
             VALUES (?, ?, ?, ?, ?, ?)",
            entities
                .assignments
                .iter()
                .map(|a| {
                    (
                        a.assignment_id,
                        a.assignment_title.as_str(),
                        a.submission_status.as_str(),
                        a.score,
                        a.student_id,
                        a.course_id,
                    )
                })
                .collect(),
        )
        .await?;
        self.insert_batched(
            &session,
            "INSERT INTO {ks}.assignments_by_student
             (student_id, assignment_id, course_id, submission_status, score)
             VALUES (?, ?, ?, ?, ?)",
            entities
                .assignments
                .iter()
                .map(|a| {
                    (
                        a.student_id,
                        a.assignment_id,
                        a.course_id,
                        a.submission_status.as_str(),
                        a.score,
                    )
                })
                .collect(),
        )
        .await?;

        let names: AHashMap<i64, &str> = entities
            .students
            .iter()
            .map(|s| (s.student_id, s.student_name.as_str()))
            .collect();
        self.insert_batched(
            &session,
            "INSERT INTO {ks}.assignments_by_course
             (course_id, student_id, assignment_id, student_name, submission_status, score)
             VALUES (?, ?, ?, ?, ?, ?)",
            entities
                .assignments
                .iter()
                .map(|a| {
                    (
                        a.course_id,
                        a.student_id,
                        a.assignment_id,
                        names.get(&a.student_id).copied().unwrap_or_default(),
                        a.submission_status.as_str(),
                        a.score,
                    )
                })
                .collect(),
        )
        .await?;
        debug!(
            "cassandra loaded {} students, {} assignments",
            entities.students.len(),
            entities.assignments.len()
        );
        Ok(())
    }

    async fn run_query(&self, query: LogicalQuery) -> Result<QueryOutput, BenchError> {
        let session = self.session().await?;
        let rows = match query {
            LogicalQuery::Q1 => self.first_students(&session).await?,
            LogicalQuery::Q2 => self.submitted_students(&session).await?,
            LogicalQuery::Q3 => self.mark_submitted(&session).await?,
            LogicalQuery::Q4 => self.high_scorers(&session).await?,
        };
        Ok(QueryOutput::new(rows))
    }

    async fn count_records(&self) -> Result<RecordCounts, BenchError> {
        let session = self.session().await?;
        Ok(RecordCounts {
            courses: self.count(&session, "courses").await?,
            students: self.count(&session, "students").await?,
            professors: self.count(&session, "professors").await?,
            assignments: self.count(&session, "assignments").await?,
        })
    }

    async fn close(&self) -> Result<(), BenchError> {
        self.session.write().await.take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyspace_name() {
        assert_eq!(
            keyspace_name("course_management_system").unwrap(),
            "course_management_system"
        );
        assert!(keyspace_name("1cms").is_err());
        assert!(keyspace_name("cms; DROP KEYSPACE x").is_err());
        assert!(keyspace_name("").is_err());
    }

    #[test]
    fn test_every_table_is_keyspace_qualified() {
        for ddl in TABLES {
            assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS {ks}."));
        }
    }
}
