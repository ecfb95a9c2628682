mod args;
mod error;
mod logger;
mod query;

pub use args::{CliArgs, Command, GenerateArgs, RunArgs};
pub use error::BenchError;
pub use logger::setup_logging;
pub use query::{
    LogicalQuery, Q3_SCORE, Q3_STUDENT_IDS, Q4_SCORE_THRESHOLD, QUERY_LIMIT, TARGET_COURSE_NAME,
};
