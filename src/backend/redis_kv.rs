//! Key-value backend on Redis.
//!
//! Layout:
//! - `course:{id}`, `student:{id}`, `professor:{id}`, `assignment:{id}`: one hash per entity
//! - `course_name:{name}`: set of course ids carrying that name
//! - `course:{id}:students`: sorted set of student ids, scored by load order
//! - `student:{id}:assignments`: set of assignment ids
//! - `course:{id}:scores`: sorted set of submitted assignment ids by score
//! - `courses`, `students`, `professors`, `assignments`: id sets used for counting

use std::collections::HashMap;
use std::str::FromStr;

use ahash::AHashMap;
use async_trait::async_trait;
use log::debug;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tokio::sync::RwLock;

use crate::backend::entities::Entities;
use crate::backend::{Backend, QueryOutput, QueryRow, RecordCounts};
use crate::conf::BackendConfig;
use crate::core::{
    BenchError, LogicalQuery, Q3_SCORE, Q3_STUDENT_IDS, Q4_SCORE_THRESHOLD, QUERY_LIMIT,
    TARGET_COURSE_NAME,
};
use crate::dataset::{Dataset, SubmissionStatus};

type Hash = HashMap<String, String>;

fn field<T: FromStr>(hash: &Hash, key: &str, name: &str) -> Result<T, BenchError> {
    hash.get(name)
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| BenchError::QueryError(format!("redis {} has no valid '{}'", key, name)))
}

fn load_err(e: redis::RedisError) -> BenchError {
    BenchError::LoadError(format!("redis: {}", e))
}

fn query_err(e: redis::RedisError) -> BenchError {
    BenchError::QueryError(format!("redis: {}", e))
}

pub struct RedisBackend {
    conn: RwLock<Option<MultiplexedConnection>>,
    batch_size: usize,
}

impl RedisBackend {
    pub async fn connect(config: &BackendConfig) -> Result<Self, BenchError> {
        let conn_err = |e: redis::RedisError| BenchError::ConnectionError(format!("redis: {}", e));
        let client = redis::Client::open(config.endpoint()).map_err(conn_err)?;
        let conn = tokio::time::timeout(
            config.connect_timeout,
            client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| {
            BenchError::ConnectionError(format!(
                "redis: no connection after {:?}",
                config.connect_timeout
            ))
        })?
        .map_err(conn_err)?;
        Ok(Self {
            conn: RwLock::new(Some(conn)),
            batch_size: config.batch_size(),
        })
    }

    /// The multiplexed connection is cheap to clone; every call gets its own handle.
    async fn conn(&self) -> Result<MultiplexedConnection, BenchError> {
        self.conn
            .read()
            .await
            .clone()
            .ok_or_else(|| BenchError::ConnectionError("redis connection is closed".to_string()))
    }

    async fn target_course_ids(&self, conn: &mut MultiplexedConnection) -> Result<Vec<i64>, BenchError> {
        let mut ids: Vec<i64> = conn
            .smembers(format!("course_name:{}", TARGET_COURSE_NAME))
            .await
            .map_err(query_err)?;
        ids.sort_unstable();
        Ok(ids)
    }

    /// Students of the target course in load order, at most `limit` when given.
    async fn target_student_ids(
        &self,
        conn: &mut MultiplexedConnection,
        limit: Option<usize>,
    ) -> Result<Vec<i64>, BenchError> {
        let mut students = Vec::new();
        for course_id in self.target_course_ids(conn).await? {
            let stop = match limit {
                Some(limit) if students.len() >= limit => break,
                Some(limit) => (limit - students.len()) as isize - 1,
                None => -1,
            };
            let ids: Vec<i64> = conn
                .zrange(format!("course:{}:students", course_id), 0, stop)
                .await
                .map_err(query_err)?;
            students.extend(ids);
        }
        Ok(students)
    }

    async fn student_names(
        &self,
        conn: &mut MultiplexedConnection,
        ids: &[i64],
    ) -> Result<Vec<QueryRow>, BenchError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut pipe = redis::pipe();
        for id in ids {
            pipe.hget(format!("student:{}", id), "student_name");
        }
        let names: Vec<String> = pipe.query_async(conn).await.map_err(query_err)?;
        Ok(ids
            .iter()
            .zip(names)
            .map(|(id, name)| QueryRow::student(*id, name))
            .collect())
    }

    async fn hashes(
        &self,
        conn: &mut MultiplexedConnection,
        keys: &[String],
    ) -> Result<Vec<Hash>, BenchError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.hgetall(key);
        }
        pipe.query_async(conn).await.map_err(query_err)
    }

    async fn first_students(&self) -> Result<Vec<QueryRow>, BenchError> {
        let mut conn = self.conn().await?;
        let ids = self.target_student_ids(&mut conn, Some(QUERY_LIMIT)).await?;
        self.student_names(&mut conn, &ids).await
    }

    async fn submitted_students(&self) -> Result<Vec<QueryRow>, BenchError> {
        let mut conn = self.conn().await?;
        let mut selected = Vec::new();
        for student_id in self.target_student_ids(&mut conn, None).await? {
            let assignment_ids: Vec<i64> = conn
                .smembers(format!("student:{}:assignments", student_id))
                .await
                .map_err(query_err)?;
            if assignment_ids.is_empty() {
                continue;
            }
            let mut pipe = redis::pipe();
            for id in &assignment_ids {
                pipe.hget(format!("assignment:{}", id), "submission_status");
            }
            let statuses: Vec<String> = pipe.query_async(&mut conn).await.map_err(query_err)?;
            if statuses.iter().any(|s| s == SubmissionStatus::Yes.as_str()) {
                selected.push(student_id);
                if selected.len() == QUERY_LIMIT {
                    break;
                }
            }
        }
        self.student_names(&mut conn, &selected).await
    }

    async fn mark_submitted(&self, conn: &mut MultiplexedConnection) -> Result<Vec<i64>, BenchError> {
        let mut touched = Vec::new();
        for student_id in Q3_STUDENT_IDS {
            let mut assignment_ids: Vec<i64> = conn
                .smembers(format!("student:{}:assignments", student_id))
                .await
                .map_err(query_err)?;
            assignment_ids.sort_unstable();
            let mut pipe = redis::pipe();
            for id in &assignment_ids {
                pipe.hget(format!("assignment:{}", id), "course_id");
            }
            let course_ids: Vec<i64> = pipe.query_async(&mut *conn).await.map_err(query_err)?;

            let mut pipe = redis::pipe();
            for (id, course_id) in assignment_ids.iter().zip(course_ids) {
                pipe.hset_multiple(
                    format!("assignment:{}", id),
                    &[
                        ("submission_status", SubmissionStatus::Yes.as_str().to_string()),
                        ("score", Q3_SCORE.to_string()),
                    ],
                )
                .ignore()
                .zadd(format!("course:{}:scores", course_id), *id, Q3_SCORE)
                .ignore();
            }
            pipe.query_async::<()>(&mut *conn).await.map_err(query_err)?;
            touched.push(student_id);
        }
        Ok(touched)
    }

    async fn students_with_assignments(&self) -> Result<Vec<QueryRow>, BenchError> {
        let mut conn = self.conn().await?;
        let student_ids = self.mark_submitted(&mut conn).await?;
        let mut rows = Vec::new();
        for student_id in student_ids {
            let student_key = format!("student:{}", student_id);
            let student: Hash = conn.hgetall(&student_key).await.map_err(query_err)?;
            if student.is_empty() {
                continue;
            }
            let course_id: i64 = field(&student, &student_key, "course_id")?;
            let course_key = format!("course:{}", course_id);
            let course: Hash = conn.hgetall(&course_key).await.map_err(query_err)?;
            let mut assignment_ids: Vec<i64> = conn
                .smembers(format!("student:{}:assignments", student_id))
                .await
                .map_err(query_err)?;
            assignment_ids.sort_unstable();
            let keys: Vec<String> = assignment_ids
                .iter()
                .map(|id| format!("assignment:{}", id))
                .collect();
            let assignments = self.hashes(&mut conn, &keys).await?;
            for ((assignment_id, key), assignment) in
                assignment_ids.iter().zip(&keys).zip(assignments)
            {
                rows.push(QueryRow {
                    student_id,
                    student_name: field(&student, &student_key, "student_name")?,
                    course_id: Some(course_id),
                    course_name: Some(field(&course, &course_key, "course_name")?),
                    assignment_id: Some(*assignment_id),
                    submission_status: Some(field(&assignment, key, "submission_status")?),
                    score: Some(field(&assignment, key, "score")?),
                });
            }
        }
        rows.sort_by_key(|r| (r.student_id, r.assignment_id));
        Ok(rows)
    }

    async fn high_scorers(&self) -> Result<Vec<QueryRow>, BenchError> {
        let mut conn = self.conn().await?;
        let mut rows = Vec::new();
        let mut names: AHashMap<i64, String> = AHashMap::new();
        for course_id in self.target_course_ids(&mut conn).await? {
            let course_key = format!("course:{}", course_id);
            let course_name: String = conn
                .hget(&course_key, "course_name")
                .await
                .map_err(query_err)?;
            let assignment_ids: Vec<i64> = conn
                .zrangebyscore(
                    format!("course:{}:scores", course_id),
                    format!("({}", Q4_SCORE_THRESHOLD),
                    "+inf",
                )
                .await
                .map_err(query_err)?;
            let keys: Vec<String> = assignment_ids
                .iter()
                .map(|id| format!("assignment:{}", id))
                .collect();
            let assignments = self.hashes(&mut conn, &keys).await?;
            for ((assignment_id, key), assignment) in
                assignment_ids.iter().zip(&keys).zip(assignments)
            {
                let status: SubmissionStatus = field(&assignment, key, "submission_status")?;
                let score: i64 = field(&assignment, key, "score")?;
                if !status.is_submitted() || score <= Q4_SCORE_THRESHOLD {
                    continue;
                }
                let student_id: i64 = field(&assignment, key, "student_id")?;
                let student_name = match names.get(&student_id) {
                    Some(name) => name.clone(),
                    None => {
                        let name: String = conn
                            .hget(format!("student:{}", student_id), "student_name")
                            .await
                            .map_err(query_err)?;
                        names.insert(student_id, name.clone());
                        name
                    }
                };
                rows.push(QueryRow {
                    student_id,
                    student_name,
                    course_id: Some(course_id),
                    course_name: Some(course_name.clone()),
                    assignment_id: Some(*assignment_id),
                    submission_status: Some(status),
                    score: Some(score),
                });
            }
        }
        Ok(rows)
    }

    async fn load_entities(&self, entities: &Entities) -> Result<(), BenchError> {
        let mut conn = self.conn().await?;
        let batch = self.batch_size;

        for chunk in entities.courses.chunks(batch) {
            let mut pipe = redis::pipe();
            for c in chunk {
                pipe.hset_multiple(
                    format!("course:{}", c.course_id),
                    &[
                        ("course_name", c.course_name.as_str()),
                        ("course_content", c.course_content.as_str()),
                    ],
                )
                .ignore()
                .sadd(format!("course_name:{}", c.course_name), c.course_id)
                .ignore()
                .sadd("courses", c.course_id)
                .ignore();
            }
            pipe.query_async::<()>(&mut conn).await.map_err(load_err)?;
        }

        let mut position: i64 = 0;
        for chunk in entities.students.chunks(batch) {
            let mut pipe = redis::pipe();
            for s in chunk {
                pipe.hset_multiple(
                    format!("student:{}", s.student_id),
                    &[
                        ("student_name", s.student_name.clone()),
                        ("student_email_address", s.student_email.clone()),
                        ("course_id", s.course_id.to_string()),
                    ],
                )
                .ignore()
                .zadd(format!("course:{}:students", s.course_id), s.student_id, position)
                .ignore()
                .sadd("students", s.student_id)
                .ignore();
                position += 1;
            }
            pipe.query_async::<()>(&mut conn).await.map_err(load_err)?;
        }

        for chunk in entities.professors.chunks(batch) {
            let mut pipe = redis::pipe();
            for p in chunk {
                pipe.hset_multiple(
                    format!("professor:{}", p.professor_id),
                    &[
                        ("professor_name", p.professor_name.clone()),
                        ("professor_email_address", p.professor_email.clone()),
                        ("course_id", p.course_id.to_string()),
                    ],
                )
                .ignore()
                .sadd("professors", p.professor_id)
                .ignore();
            }
            pipe.query_async::<()>(&mut conn).await.map_err(load_err)?;
        }

        for chunk in entities.assignments.chunks(batch) {
            let mut pipe = redis::pipe();
            for a in chunk {
                pipe.hset_multiple(
                    format!("assignment:{}", a.assignment_id),
                    &[
                        ("assignment_title", a.assignment_title.clone()),
                        ("submission_status", a.submission_status.as_str().to_string()),
                        ("score", a.score.to_string()),
                        ("student_id", a.student_id.to_string()),
                        ("course_id", a.course_id.to_string()),
                    ],
                )
                .ignore()
                .sadd(format!("student:{}:assignments", a.student_id), a.assignment_id)
                .ignore()
                .sadd("assignments", a.assignment_id)
                .ignore();
                if a.submission_status.is_submitted() {
                    pipe.zadd(
                        format!("course:{}:scores", a.course_id),
                        a.assignment_id,
                        a.score,
                    )
                    .ignore();
                }
            }
            pipe.query_async::<()>(&mut conn).await.map_err(load_err)?;
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn reset(&self) -> Result<(), BenchError> {
        let mut conn = self.conn().await?;
        redis::cmd("FLUSHDB")
            .query_async::<()>(&mut conn)
            .await
            .map_err(load_err)
    }

    async fn bulk_load(&self, dataset: &Dataset, tier_size: usize) -> Result<(), BenchError> {
        let entities = Entities::split(dataset.prefix(tier_size));
        self.load_entities(&entities).await?;
        debug!(
            "redis loaded {} students, {} assignments",
            entities.students.len(),
            entities.assignments.len()
        );
        Ok(())
    }

    async fn run_query(&self, query: LogicalQuery) -> Result<QueryOutput, BenchError> {
        let rows = match query {
            LogicalQuery::Q1 => self.first_students().await?,
            LogicalQuery::Q2 => self.submitted_students().await?,
            LogicalQuery::Q3 => self.students_with_assignments().await?,
            LogicalQuery::Q4 => self.high_scorers().await?,
        };
        Ok(QueryOutput::new(rows))
    }

    async fn count_records(&self) -> Result<RecordCounts, BenchError> {
        let mut conn = self.conn().await?;
        let (courses, students, professors, assignments): (usize, usize, usize, usize) =
            redis::pipe()
                .scard("courses")
                .scard("students")
                .scard("professors")
                .scard("assignments")
                .query_async(&mut conn)
                .await
                .map_err(query_err)?;
        Ok(RecordCounts {
            courses,
            students,
            professors,
            assignments,
        })
    }

    async fn close(&self) -> Result<(), BenchError> {
        self.conn.write().await.take();
        Ok(())
    }
}
