//! Token error types.

use super::models::TokenRejection;
use crate::store::StoreError;
use thiserror::Error;

/// Token authority errors
#[derive(Debug, Error)]
pub enum TokenError {
    /// Token is expired, already used or unknown
    #[error("Invalid token: {0}")]
    Invalid(TokenRejection),

    /// Lifetime must be positive
    #[error("Invalid token lifetime: {0} hours")]
    InvalidTtl(i64),

    /// Storage failure
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl From<TokenRejection> for TokenError {
    fn from(rejection: TokenRejection) -> Self {
        TokenError::Invalid(rejection)
    }
}

impl TokenError {
    /// Get a client-safe error message
    pub fn client_message(&self) -> String {
        match self {
            TokenError::Store(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for token operations
pub type TokenResult<T> = Result<T, TokenError>;
