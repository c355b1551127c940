//! Storage error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version conflict for {key}: expected {expected}, found {actual}")]
    VersionConflict {
        key: String,
        expected: i64,
        actual: i64,
    },

    #[error("Invalid timestamp in row {0}")]
    InvalidTimestamp(i64),

    #[error("Invalid message kind in row {id}: {kind}")]
    InvalidKind { id: i64, kind: String },
}
