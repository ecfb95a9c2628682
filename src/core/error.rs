use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum BenchError {
    #[error("Cannot parse config: {0}")]
    ConfigParsingError(String),
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Arrow error: {0}")]
    ArrowError(String),
    #[error("Dataset error: {0}")]
    DatasetError(String),
    #[error("Connection error: {0}")]
    ConnectionError(String),
    #[error("Load error: {0}")]
    LoadError(String),
    #[error("Query error: {0}")]
    QueryError(String),
    #[error("Sink error: {0}")]
    SinkError(String),
}

impl From<std::io::Error> for BenchError {
    fn from(err: std::io::Error) -> Self {
        BenchError::IoError(err.to_string())
    }
}

impl From<arrow::error::ArrowError> for BenchError {
    fn from(err: arrow::error::ArrowError) -> Self {
        BenchError::ArrowError(err.to_string())
    }
}

impl From<parquet::errors::ParquetError> for BenchError {
    fn from(err: parquet::errors::ParquetError) -> Self {
        BenchError::SinkError(err.to_string())
    }
}

impl From<serde_json::Error> for BenchError {
    fn from(err: serde_json::Error) -> Self {
        BenchError::SinkError(err.to_string())
    }
}
