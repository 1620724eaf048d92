//! Audit trail error types.

use crate::ids::AuditId;
use crate::store::StoreError;
use thiserror::Error;

/// Audit trail errors
#[derive(Debug, Error)]
pub enum AuditError {
    /// Stored entry no longer matches its hash or its predecessor
    #[error("Audit chain broken at entry {entry_id}: {reason}")]
    ChainBroken { entry_id: AuditId, reason: String },

    /// Log no longer contains a head hash recorded earlier
    #[error("Audit chain no longer reaches head {expected} (ends at {found:?})")]
    HeadMismatch {
        expected: String,
        found: Option<String>,
    },

    /// Storage failure
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for audit operations
pub type AuditResult<T> = Result<T, AuditError>;
