//! Point ledger error types.

use crate::ids::{GroupId, UserId};
use crate::store::StoreError;
use thiserror::Error;

/// Ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Deduction larger than the derived balance
    #[error(
        "Insufficient funds for user {user_id} in group {group_id}: available {available}, required {required}"
    )]
    InsufficientFunds {
        user_id: UserId,
        group_id: GroupId,
        available: i64,
        required: i64,
    },

    /// Invalid amount (must be positive)
    #[error("Invalid amount: {0}")]
    InvalidAmount(i64),

    /// Duplicate transaction (idempotency key already used)
    #[error("Duplicate transaction: {0}")]
    DuplicateTransaction(String),

    /// Storage failure
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl LedgerError {
    /// Get a client-safe error message that doesn't leak storage details or account ids
    pub fn client_message(&self) -> String {
        match self {
            LedgerError::InsufficientFunds {
                available,
                required,
                ..
            } => format!("Insufficient points: available {available}, required {required}"),
            LedgerError::Store(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
