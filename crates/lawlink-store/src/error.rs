use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("law already exists: {0}")]
    LawExists(String),

    #[error("law not found: {0}")]
    LawNotFound(String),

    #[error("invalid law record: {0}")]
    InvalidRecord(String),

    #[error("catalog file not found: {0}")]
    FileNotFound(std::path::PathBuf),

    #[error("missing column: {0}")]
    MissingColumn(String),

    #[error("column {column} has unsupported type {data_type}")]
    ColumnType { column: String, data_type: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[cfg(feature = "parquet")]
    #[error("parquet error: {0}")]
    Parquet(#[from] ::parquet::errors::ParquetError),

    #[cfg(feature = "duckdb")]
    #[error("duckdb error: {0}")]
    DuckDb(#[from] ::duckdb::Error),

    #[error("{0}")]
    Other(String),
}
