//! Relational backend on MySQL through `sqlx`.
//!
//! Four normalized tables with foreign keys, loaded with multi-row
//! `INSERT IGNORE` statements. Join-key indexes are created after loading.

use async_trait::async_trait;
use log::debug;
use std::str::FromStr;

use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{ConnectOptions, Connection, MySql, QueryBuilder, Row};

use crate::backend::entities::Entities;
use crate::backend::{Backend, QueryOutput, QueryRow, RecordCounts};
use crate::conf::BackendConfig;
use crate::core::{
    BenchError, LogicalQuery, Q3_SCORE, Q3_STUDENT_IDS, Q4_SCORE_THRESHOLD, QUERY_LIMIT,
    TARGET_COURSE_NAME,
};
use crate::dataset::{Dataset, SubmissionStatus};

const DROP_TABLES: &str = "DROP TABLE IF EXISTS Assignments, Professors, Students, Courses";

const CREATE_TABLES: [&str; 4] = [
    "CREATE TABLE IF NOT EXISTS Courses (
        course_id INT PRIMARY KEY,
        course_name VARCHAR(255),
        course_content TEXT
    )",
    "CREATE TABLE IF NOT EXISTS Students (
        student_id INT PRIMARY KEY,
        student_name VARCHAR(255),
        student_email_address VARCHAR(255),
        course_id INT,
        FOREIGN KEY (course_id) REFERENCES Courses(course_id)
    )",
    "CREATE TABLE IF NOT EXISTS Professors (
        professor_id INT PRIMARY KEY,
        professor_name VARCHAR(255),
        professor_email_address VARCHAR(255),
        course_id INT,
        FOREIGN KEY (course_id) REFERENCES Courses(course_id)
    )",
    "CREATE TABLE IF NOT EXISTS Assignments (
        assignment_id INT PRIMARY KEY,
        assignment_title VARCHAR(255),
        submission_status VARCHAR(3),
        score INT,
        student_id INT,
        course_id INT,
        FOREIGN KEY (student_id) REFERENCES Students(student_id),
        FOREIGN KEY (course_id) REFERENCES Courses(course_id)
    )",
];

// Foreign keys already index student_id/course_id on InnoDB.
const CREATE_INDEXES: [&str; 2] = [
    "CREATE INDEX idx_courses_name ON Courses (course_name)",
    "CREATE INDEX idx_assignments_status_score ON Assignments (submission_status, score)",
];

const Q1_SQL: &str = "
    SELECT student_id, student_name
    FROM Students
    WHERE course_id IN (SELECT course_id FROM Courses WHERE course_name = ?)
    LIMIT ?";

const Q2_SQL: &str = "
    SELECT student_id, student_name
    FROM Students
    WHERE course_id IN (SELECT course_id FROM Courses WHERE course_name = ?)
    AND student_id IN (SELECT student_id FROM Assignments WHERE submission_status = ?)
    LIMIT ?";

const Q3_UPDATE_SQL: &str = "
    UPDATE Assignments
    SET submission_status = ?, score = ?
    WHERE student_id IN (?, ?)";

const Q3_SELECT_SQL: &str = "
    SELECT s.student_id, s.student_name, c.course_id, c.course_name,
           a.assignment_id, a.submission_status, a.score
    FROM Students s
    JOIN Courses c ON s.course_id = c.course_id
    JOIN Assignments a ON s.student_id = a.student_id
    WHERE s.student_id IN (?, ?)
    ORDER BY s.student_id, a.assignment_id";

const Q4_SQL: &str = "
    SELECT s.student_id, s.student_name, c.course_id, c.course_name,
           a.assignment_id, a.submission_status, a.score
    FROM Students s
    JOIN Courses c ON s.course_id = c.course_id
    JOIN Assignments a ON s.student_id = a.student_id
    WHERE c.course_name = ?
    AND a.submission_status = ?
    AND a.score > ?";

/// Database names are interpolated into DDL, so only plain identifiers pass.
fn schema_name(name: &str) -> Result<&str, BenchError> {
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(name)
    } else {
        Err(BenchError::ConnectionError(format!(
            "mysql: invalid database name '{}'",
            name
        )))
    }
}

pub struct MysqlBackend {
    pool: MySqlPool,
    batch_size: usize,
}

fn query_err(query: LogicalQuery) -> impl Fn(sqlx::Error) -> BenchError {
    move |e| BenchError::QueryError(format!("mysql {}: {}", query, e))
}

fn load_err(what: &'static str) -> impl Fn(sqlx::Error) -> BenchError {
    move |e| BenchError::LoadError(format!("mysql {}: {}", what, e))
}

fn student_row(row: &MySqlRow) -> Result<QueryRow, sqlx::Error> {
    Ok(QueryRow::student(
        row.try_get::<i32, _>("student_id")? as i64,
        row.try_get::<String, _>("student_name")?,
    ))
}

fn joined_row(row: &MySqlRow) -> Result<QueryRow, sqlx::Error> {
    let status: String = row.try_get("submission_status")?;
    Ok(QueryRow {
        student_id: row.try_get::<i32, _>("student_id")? as i64,
        student_name: row.try_get("student_name")?,
        course_id: Some(row.try_get::<i32, _>("course_id")? as i64),
        course_name: Some(row.try_get("course_name")?),
        assignment_id: Some(row.try_get::<i32, _>("assignment_id")? as i64),
        submission_status: status.parse::<SubmissionStatus>().ok(),
        score: Some(row.try_get::<i32, _>("score")? as i64),
    })
}

impl MysqlBackend {
    /// Connects to the server at the endpoint, creates `config.database` when
    /// missing and pools connections into it. A schema in the endpoint path
    /// is ignored in favour of `config.database`.
    pub async fn connect(config: &BackendConfig) -> Result<Self, BenchError> {
        let conn_err = |e: sqlx::Error| BenchError::ConnectionError(format!("mysql: {}", e));
        let database = schema_name(&config.database)?;
        let server = MySqlConnectOptions::from_str(config.endpoint()).map_err(conn_err)?;

        let mut conn = tokio::time::timeout(config.connect_timeout, server.connect())
            .await
            .map_err(|_| {
                BenchError::ConnectionError(format!(
                    "mysql: no connection after {:?}",
                    config.connect_timeout
                ))
            })?
            .map_err(conn_err)?;
        sqlx::query(&format!("CREATE DATABASE IF NOT EXISTS `{}`", database))
            .execute(&mut conn)
            .await
            .map_err(conn_err)?;
        conn.close().await.map_err(conn_err)?;

        let pool = MySqlPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(config.connect_timeout)
            .connect_with(server.database(database))
            .await
            .map_err(conn_err)?;
        debug!("mysql using database {}", database);
        Ok(Self {
            pool,
            batch_size: config.batch_size(),
        })
    }

    async fn count(&self, table: &str) -> Result<usize, BenchError> {
        let row = sqlx::query(&format!("SELECT COUNT(*) AS n FROM {}", table))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| BenchError::QueryError(format!("mysql count {}: {}", table, e)))?;
        let n: i64 = row
            .try_get("n")
            .map_err(|e| BenchError::QueryError(format!("mysql count {}: {}", table, e)))?;
        Ok(n as usize)
    }

    async fn insert_entities(&self, entities: &Entities) -> Result<(), BenchError> {
        let batch = self.batch_size;
        for chunk in entities.courses.chunks(batch) {
            let mut qb: QueryBuilder<MySql> = QueryBuilder::new(
                "INSERT IGNORE INTO Courses (course_id, course_name, course_content) ",
            );
            qb.push_values(chunk, |mut b, c| {
                b.push_bind(c.course_id)
                    .push_bind(&c.course_name)
                    .push_bind(&c.course_content);
            });
            qb.build()
                .execute(&self.pool)
                .await
                .map_err(load_err("insert courses"))?;
        }
        for chunk in entities.students.chunks(batch) {
            let mut qb: QueryBuilder<MySql> = QueryBuilder::new(
                "INSERT IGNORE INTO Students (student_id, student_name, student_email_address, course_id) ",
            );
            qb.push_values(chunk, |mut b, s| {
                b.push_bind(s.student_id)
                    .push_bind(&s.student_name)
                    .push_bind(&s.student_email)
                    .push_bind(s.course_id);
            });
            qb.build()
                .execute(&self.pool)
                .await
                .map_err(load_err("insert students"))?;
        }
        for chunk in entities.professors.chunks(batch) {
            let mut qb: QueryBuilder<MySql> = QueryBuilder::new(
                "INSERT IGNORE INTO Professors (professor_id, professor_name, professor_email_address, course_id) ",
            );
            qb.push_values(chunk, |mut b, p| {
                b.push_bind(p.professor_id)
                    .push_bind(&p.professor_name)
                    .push_bind(&p.professor_email)
                    .push_bind(p.course_id);
            });
            qb.build()
                .execute(&self.pool)
                .await
                .map_err(load_err("insert professors"))?;
        }
        for chunk in entities.assignments.chunks(batch) {
            let mut qb: QueryBuilder<MySql> = QueryBuilder::new(
                "INSERT IGNORE INTO Assignments (assignment_id, assignment_title, submission_status, score, student_id, course_id) ",
            );
            qb.push_values(chunk, |mut b, a| {
                b.push_bind(a.assignment_id)
                    .push_bind(&a.assignment_title)
                    .push_bind(a.submission_status.as_str())
                    .push_bind(a.score)
                    .push_bind(a.student_id)
                    .push_bind(a.course_id);
            });
            qb.build()
                .execute(&self.pool)
                .await
                .map_err(load_err("insert assignments"))?;
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for MysqlBackend {
    fn name(&self) -> &'static str {
        "mysql"
    }

    async fn reset(&self) -> Result<(), BenchError> {
        let reset_err = |e: sqlx::Error| BenchError::LoadError(format!("mysql reset: {}", e));
        sqlx::query(DROP_TABLES)
            .execute(&self.pool)
            .await
            .map_err(reset_err)?;
        for ddl in CREATE_TABLES {
            sqlx::query(ddl)
                .execute(&self.pool)
                .await
                .map_err(reset_err)?;
        }
        Ok(())
    }

    async fn bulk_load(&self, dataset: &Dataset, tier_size: usize) -> Result<(), BenchError> {
        let entities = Entities::split(dataset.prefix(tier_size));
        self.insert_entities(&entities).await?;
        for ddl in CREATE_INDEXES {
            sqlx::query(ddl)
                .execute(&self.pool)
                .await
                .map_err(load_err("create index"))?;
        }
        debug!("mysql indexes built");
        Ok(())
    }

    async fn run_query(&self, query: LogicalQuery) -> Result<QueryOutput, BenchError> {
        let err = query_err(query);
        let rows = match query {
            LogicalQuery::Q1 => {
                let rows = sqlx::query(Q1_SQL)
                    .bind(TARGET_COURSE_NAME)
                    .bind(QUERY_LIMIT as u64)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(&err)?;
                rows.iter().map(student_row).collect::<Result<Vec<_>, _>>()
            }
            LogicalQuery::Q2 => {
                let rows = sqlx::query(Q2_SQL)
                    .bind(TARGET_COURSE_NAME)
                    .bind(SubmissionStatus::Yes.as_str())
                    .bind(QUERY_LIMIT as u64)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(&err)?;
                rows.iter().map(student_row).collect::<Result<Vec<_>, _>>()
            }
            LogicalQuery::Q3 => {
                sqlx::query(Q3_UPDATE_SQL)
                    .bind(SubmissionStatus::Yes.as_str())
                    .bind(Q3_SCORE)
                    .bind(Q3_STUDENT_IDS[0])
                    .bind(Q3_STUDENT_IDS[1])
                    .execute(&self.pool)
                    .await
                    .map_err(&err)?;
                let rows = sqlx::query(Q3_SELECT_SQL)
                    .bind(Q3_STUDENT_IDS[0])
                    .bind(Q3_STUDENT_IDS[1])
                    .fetch_all(&self.pool)
                    .await
                    .map_err(&err)?;
                rows.iter().map(joined_row).collect::<Result<Vec<_>, _>>()
            }
            LogicalQuery::Q4 => {
                let rows = sqlx::query(Q4_SQL)
                    .bind(TARGET_COURSE_NAME)
                    .bind(SubmissionStatus::Yes.as_str())
                    .bind(Q4_SCORE_THRESHOLD)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(&err)?;
                rows.iter().map(joined_row).collect::<Result<Vec<_>, _>>()
            }
        }
        .map_err(&err)?;
        Ok(QueryOutput::new(rows))
    }

    async fn count_records(&self) -> Result<RecordCounts, BenchError> {
        Ok(RecordCounts {
            courses: self.count("Courses").await?,
            students: self.count("Students").await?,
            professors: self.count("Professors").await?,
            assignments: self.count("Assignments").await?,
        })
    }

    async fn close(&self) -> Result<(), BenchError> {
        self.pool.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_name() {
        assert_eq!(schema_name("course_management_system").unwrap(), "course_management_system");
        assert!(schema_name("").is_err());
        assert!(schema_name("cms`; DROP DATABASE x").is_err());
    }
}
