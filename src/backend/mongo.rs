//! Document backend on MongoDB.
//!
//! One collection per entity kind, keyed by the entity id in `_id`. Queries
//! are aggregation pipelines starting from the course collection so every
//! join walks an index.

use async_trait::async_trait;
use log::debug;
use mongodb::bson::{Bson, Document, doc};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection, Database, IndexModel};
use serde::Deserialize;

use crate::backend::entities::Entities;
use crate::backend::{Backend, QueryOutput, QueryRow, RecordCounts};
use crate::conf::BackendConfig;
use crate::core::{
    BenchError, LogicalQuery, Q3_SCORE, Q3_STUDENT_IDS, Q4_SCORE_THRESHOLD, QUERY_LIMIT,
    TARGET_COURSE_NAME,
};
use crate::dataset::{Dataset, SubmissionStatus};

const COURSES: &str = "Courses";
const STUDENTS: &str = "Students";
const PROFESSORS: &str = "Professors";
const ASSIGNMENTS: &str = "Assignments";

#[derive(Debug, Deserialize)]
struct StudentDoc {
    student_id: i64,
    student_name: String,
}

#[derive(Debug, Deserialize)]
struct JoinedDoc {
    student_id: i64,
    student_name: String,
    course_id: i64,
    course_name: String,
    assignment_id: i64,
    submission_status: SubmissionStatus,
    score: i64,
}

impl From<StudentDoc> for QueryRow {
    fn from(d: StudentDoc) -> Self {
        QueryRow::student(d.student_id, d.student_name)
    }
}

impl From<JoinedDoc> for QueryRow {
    fn from(d: JoinedDoc) -> Self {
        QueryRow {
            student_id: d.student_id,
            student_name: d.student_name,
            course_id: Some(d.course_id),
            course_name: Some(d.course_name),
            assignment_id: Some(d.assignment_id),
            submission_status: Some(d.submission_status),
            score: Some(d.score),
        }
    }
}

fn student_projection() -> Document {
    doc! { "$project": { "_id": 0, "student_id": "$_id", "student_name": 1 } }
}

fn joined_projection() -> Document {
    doc! {
        "$project": {
            "_id": 0,
            "student_id": "$_id",
            "student_name": 1,
            "course_id": "$course._id",
            "course_name": "$course.course_name",
            "assignment_id": "$assignment._id",
            "submission_status": "$assignment.submission_status",
            "score": "$assignment.score",
        }
    }
}

/// Students of the target course, one document per student.
fn target_students_stages() -> Vec<Document> {
    vec![
        doc! { "$match": { "course_name": TARGET_COURSE_NAME } },
        doc! {
            "$lookup": {
                "from": STUDENTS,
                "localField": "_id",
                "foreignField": "course_id",
                "as": "student",
            }
        },
        doc! { "$unwind": "$student" },
        doc! { "$replaceRoot": { "newRoot": "$student" } },
    ]
}

fn q1_pipeline() -> Vec<Document> {
    let mut pipeline = target_students_stages();
    pipeline.push(doc! { "$limit": QUERY_LIMIT as i64 });
    pipeline.push(student_projection());
    pipeline
}

fn q2_pipeline() -> Vec<Document> {
    let mut pipeline = target_students_stages();
    pipeline.extend([
        doc! {
            "$lookup": {
                "from": ASSIGNMENTS,
                "localField": "_id",
                "foreignField": "student_id",
                "as": "assignments",
            }
        },
        doc! { "$match": { "assignments.submission_status": SubmissionStatus::Yes.as_str() } },
        doc! { "$limit": QUERY_LIMIT as i64 },
        student_projection(),
    ]);
    pipeline
}

/// Joins each student in the pipeline with its course and every assignment.
fn join_course_and_assignments() -> [Document; 4] {
    [
        doc! {
            "$lookup": {
                "from": COURSES,
                "localField": "course_id",
                "foreignField": "_id",
                "as": "course",
            }
        },
        doc! { "$unwind": "$course" },
        doc! {
            "$lookup": {
                "from": ASSIGNMENTS,
                "localField": "_id",
                "foreignField": "student_id",
                "as": "assignment",
            }
        },
        doc! { "$unwind": "$assignment" },
    ]
}

fn q3_pipeline() -> Vec<Document> {
    let mut pipeline = vec![doc! { "$match": { "_id": { "$in": Q3_STUDENT_IDS.to_vec() } } }];
    pipeline.extend(join_course_and_assignments());
    pipeline.push(doc! { "$sort": { "_id": 1, "assignment._id": 1 } });
    pipeline.push(joined_projection());
    pipeline
}

fn q4_pipeline() -> Vec<Document> {
    let mut pipeline = target_students_stages();
    pipeline.extend(join_course_and_assignments());
    pipeline.push(doc! {
        "$match": {
            "assignment.submission_status": SubmissionStatus::Yes.as_str(),
            "assignment.score": { "$gt": Q4_SCORE_THRESHOLD },
        }
    });
    pipeline.push(joined_projection());
    pipeline
}

pub struct MongoBackend {
    client: Client,
    db: Database,
    batch_size: usize,
}

fn mongo_err(
    ctor: fn(String) -> BenchError,
    what: &'static str,
) -> impl Fn(mongodb::error::Error) -> BenchError {
    move |e| ctor(format!("mongodb {}: {}", what, e))
}

impl MongoBackend {
    pub async fn connect(config: &BackendConfig) -> Result<Self, BenchError> {
        let conn_err = mongo_err(BenchError::ConnectionError, "connect");
        let mut options = ClientOptions::parse(config.endpoint())
            .await
            .map_err(&conn_err)?;
        options.connect_timeout = Some(config.connect_timeout);
        options.server_selection_timeout = Some(config.connect_timeout);
        let client = Client::with_options(options).map_err(&conn_err)?;
        // The driver connects lazily; ping so an unreachable server fails here.
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(&conn_err)?;
        let db = client.database(&config.database);
        Ok(Self {
            client,
            db,
            batch_size: config.batch_size(),
        })
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.db.collection(name)
    }

    async fn insert_chunked(&self, name: &str, docs: Vec<Document>) -> Result<(), BenchError> {
        let coll = self.collection(name);
        for chunk in docs.chunks(self.batch_size) {
            coll.insert_many(chunk)
                .await
                .map_err(mongo_err(BenchError::LoadError, "insert"))?;
        }
        debug!("inserted {} documents into {}", docs.len(), name);
        Ok(())
    }

    async fn aggregate<T>(&self, pipeline: Vec<Document>) -> Result<Vec<T>, mongodb::error::Error>
    where
        T: serde::de::DeserializeOwned + Send + Sync,
    {
        let mut cursor = self
            .collection(COURSES)
            .aggregate(pipeline)
            .await?
            .with_type::<T>();
        let mut out = Vec::new();
        while cursor.advance().await? {
            out.push(cursor.deserialize_current()?);
        }
        Ok(out)
    }

    async fn aggregate_students<T>(
        &self,
        pipeline: Vec<Document>,
    ) -> Result<Vec<T>, mongodb::error::Error>
    where
        T: serde::de::DeserializeOwned + Send + Sync,
    {
        let mut cursor = self
            .collection(STUDENTS)
            .aggregate(pipeline)
            .await?
            .with_type::<T>();
        let mut out = Vec::new();
        while cursor.advance().await? {
            out.push(cursor.deserialize_current()?);
        }
        Ok(out)
    }

    async fn count(&self, name: &str) -> Result<usize, BenchError> {
        let n = self
            .collection(name)
            .count_documents(doc! {})
            .await
            .map_err(mongo_err(BenchError::QueryError, "count"))?;
        Ok(n as usize)
    }
}

fn entity_documents(entities: &Entities) -> [(&'static str, Vec<Document>); 4] {
    [
        (
            COURSES,
            entities
                .courses
                .iter()
                .map(|c| {
                    doc! {
                        "_id": c.course_id,
                        "course_name": &c.course_name,
                        "course_content": &c.course_content,
                    }
                })
                .collect(),
        ),
        (
            STUDENTS,
            entities
                .students
                .iter()
                .map(|s| {
                    doc! {
                        "_id": s.student_id,
                        "student_name": &s.student_name,
                        "student_email_address": &s.student_email,
                        "course_id": s.course_id,
                    }
                })
                .collect(),
        ),
        (
            PROFESSORS,
            entities
                .professors
                .iter()
                .map(|p| {
                    doc! {
                        "_id": p.professor_id,
                        "professor_name": &p.professor_name,
                        "professor_email_address": &p.professor_email,
                        "course_id": p.course_id,
                    }
                })
                .collect(),
        ),
        (
            ASSIGNMENTS,
            entities
                .assignments
                .iter()
                .map(|a| {
                    doc! {
                        "_id": a.assignment_id,
                        "assignment_title": &a.assignment_title,
                        "submission_status": a.submission_status.as_str(),
                        "score": a.score,
                        "student_id": a.student_id,
                        "course_id": a.course_id,
                    }
                })
                .collect(),
        ),
    ]
}

#[async_trait]
impl Backend for MongoBackend {
    fn name(&self) -> &'static str {
        "mongodb"
    }

    async fn reset(&self) -> Result<(), BenchError> {
        for name in [COURSES, STUDENTS, PROFESSORS, ASSIGNMENTS] {
            self.collection(name)
                .drop()
                .await
                .map_err(mongo_err(BenchError::LoadError, "reset"))?;
        }
        Ok(())
    }

    async fn bulk_load(&self, dataset: &Dataset, tier_size: usize) -> Result<(), BenchError> {
        let entities = Entities::split(dataset.prefix(tier_size));
        for (name, docs) in entity_documents(&entities) {
            self.insert_chunked(name, docs).await?;
        }

        let index_err = mongo_err(BenchError::LoadError, "create index");
        let indexes = [
            (COURSES, "course_name"),
            (STUDENTS, "course_id"),
            (ASSIGNMENTS, "student_id"),
        ];
        for (name, key) in indexes {
            let model = IndexModel::builder().keys(doc! { key: 1 }).build();
            self.collection(name)
                .create_index(model)
                .await
                .map_err(&index_err)?;
        }
        Ok(())
    }

    async fn run_query(&self, query: LogicalQuery) -> Result<QueryOutput, BenchError> {
        let err = |e: mongodb::error::Error| BenchError::QueryError(format!("mongodb {}: {}", query, e));
        let rows: Vec<QueryRow> = match query {
            LogicalQuery::Q1 => self
                .aggregate::<StudentDoc>(q1_pipeline())
                .await
                .map_err(err)?
                .into_iter()
                .map(QueryRow::from)
                .collect(),
            LogicalQuery::Q2 => self
                .aggregate::<StudentDoc>(q2_pipeline())
                .await
                .map_err(err)?
                .into_iter()
                .map(QueryRow::from)
                .collect(),
            LogicalQuery::Q3 => {
                let ids: Vec<Bson> = Q3_STUDENT_IDS.iter().map(|id| Bson::Int64(*id)).collect();
                self.collection(ASSIGNMENTS)
                    .update_many(
                        doc! { "student_id": { "$in": ids } },
                        doc! {
                            "$set": {
                                "submission_status": SubmissionStatus::Yes.as_str(),
                                "score": Q3_SCORE,
                            }
                        },
                    )
                    .await
                    .map_err(err)?;
                self.aggregate_students::<JoinedDoc>(q3_pipeline())
                    .await
                    .map_err(err)?
                    .into_iter()
                    .map(QueryRow::from)
                    .collect()
            }
            LogicalQuery::Q4 => self
                .aggregate::<JoinedDoc>(q4_pipeline())
                .await
                .map_err(err)?
                .into_iter()
                .map(QueryRow::from)
                .collect(),
        };
        Ok(QueryOutput::new(rows))
    }

    async fn count_records(&self) -> Result<RecordCounts, BenchError> {
        Ok(RecordCounts {
            courses: self.count(COURSES).await?,
            students: self.count(STUDENTS).await?,
            professors: self.count(PROFESSORS).await?,
            assignments: self.count(ASSIGNMENTS).await?,
        })
    }

    async fn close(&self) -> Result<(), BenchError> {
        self.client.clone().shutdown().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage_names(pipeline: &[Document]) -> Vec<String> {
        pipeline
            .iter()
            .filter_map(|stage| stage.keys().next().cloned())
            .collect()
    }

    #[test]
    fn test_q2_filters_through_assignment_join() {
        let pipeline = q2_pipeline();
        let stages = stage_names(&pipeline);
        assert_eq!(stages.iter().filter(|s| *s == "$lookup").count(), 2);
        let status_match = pipeline
            .iter()
            .filter_map(|stage| stage.get_document("$match").ok())
            .find(|m| m.contains_key("assignments.submission_status"));
        assert!(status_match.is_some());
        assert_eq!(stages.last().map(String::as_str), Some("$project"));
    }

    #[test]
    fn test_q4_threshold_is_strict() {
        let pipeline = q4_pipeline();
        let threshold = pipeline
            .iter()
            .filter_map(|stage| stage.get_document("$match").ok())
            .find_map(|m| m.get_document("assignment.score").ok())
            .and_then(|cond| cond.get_i64("$gt").ok());
        assert_eq!(threshold, Some(Q4_SCORE_THRESHOLD));
    }

    #[test]
    fn test_limits_apply_to_q1_and_q2_only() {
        let has_limit = |p: Vec<Document>| stage_names(&p).iter().any(|s| s == "$limit");
        assert!(has_limit(q1_pipeline()));
        assert!(has_limit(q2_pipeline()));
        assert!(!has_limit(q3_pipeline()));
        assert!(!has_limit(q4_pipeline()));
    }
}
