use thiserror::Error;

use laysum_core::CoreError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("summary window must be zero or more days, got {0}")]
    InvalidWindow(i32),

    #[error("annotation for {0} needs all four ratings before it can be sent")]
    Incomplete(String),

    #[error("invalid annotation: {0}")]
    Invalid(#[from] CoreError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "duckdb")]
    #[error("duckdb error: {0}")]
    DuckDb(#[from] ::duckdb::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("{0}")]
    Other(String),
}
