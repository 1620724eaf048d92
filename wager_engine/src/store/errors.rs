//! Storage error types.

use std::time::Duration;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Operation did not finish in time
    #[error("Storage operation timed out after {0:?}")]
    Timeout(Duration),

    /// Unique constraint violated
    #[error("Conflicting write: {0}")]
    Conflict(String),

    /// Stored row could not be decoded
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// Unit of work used after commit
    #[error("Atomic unit already closed")]
    UnitClosed,

    /// JSON column (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;
