//! Wager and settlement error types.
//!
//! [`WagerError`] is the closed taxonomy callers see. [`ErrorKind`] folds it
//! into the categories a transport layer maps to status codes.

use super::answer::AnswerRejection;
use super::models::WagerStatus;
use crate::audit::AuditError;
use crate::ids::{GroupId, UserId, WagerId};
use crate::ledger::LedgerError;
use crate::store::StoreError;
use crate::token::{TokenError, TokenKind, TokenRejection};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Wager engine errors
#[derive(Debug, Error)]
pub enum WagerError {
    /// No wager with this id
    #[error("Wager {0} not found")]
    WagerNotFound(WagerId),

    /// Caller is not a member of the wager's group
    #[error("User {user_id} is not a member of group {group_id}")]
    NotGroupMember { user_id: UserId, group_id: GroupId },

    /// Wager definition rejected at creation
    #[error("Invalid wager: {0}")]
    InvalidWager(String),

    /// Malformed request outside the wager definition
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Join attempted outside `open`
    #[error("Wager {wager_id} is not open (status: {status})")]
    WagerNotOpen {
        wager_id: WagerId,
        status: WagerStatus,
    },

    /// Join attempted after the deadline
    #[error("Wager {wager_id} closed for entries at {deadline}")]
    DeadlinePassed {
        wager_id: WagerId,
        deadline: DateTime<Utc>,
    },

    /// Answer or outcome fails the wager's type rules
    #[error("Invalid answer {0}")]
    InvalidAnswer(AnswerRejection),

    /// Stake differs from the wager's fixed stake
    #[error("Invalid stake: wager requires {expected}, got {got}")]
    InvalidStake { expected: i64, got: i64 },

    /// Stake or amount is not positive
    #[error("Invalid amount: {0}")]
    InvalidAmount(i64),

    /// Second entry for the same (wager, user)
    #[error("User {user_id} already joined wager {wager_id}")]
    UserAlreadyJoined { wager_id: WagerId, user_id: UserId },

    /// Balance too low for the stake
    #[error("Insufficient funds: available {available}, required {required}")]
    InsufficientFunds { available: i64, required: i64 },

    /// Settle or cancel on a settled or cancelled wager
    #[error("Wager {wager_id} is already {status}")]
    WagerAlreadySettled {
        wager_id: WagerId,
        status: WagerStatus,
    },

    /// Any other illegal lifecycle move
    #[error("Cannot {action} wager {wager_id} while it is {from}")]
    InvalidWagerTransition {
        wager_id: WagerId,
        from: WagerStatus,
        action: &'static str,
    },

    /// Token is expired, already used or unknown
    #[error("Invalid token: {0}")]
    InvalidToken(TokenRejection),

    /// Token authorizes a different action
    #[error("Token is a {got} token, expected {expected}")]
    WrongTokenKind { expected: TokenKind, got: TokenKind },

    /// Token payload lacks a field the action needs
    #[error("Token is missing its {0}")]
    MissingTokenContext(&'static str),

    /// Ledger idempotency key already used
    #[error("Duplicate transaction: {0}")]
    DuplicateTransaction(String),

    /// Audit log failed verification
    #[error("Audit chain verification failed: {0}")]
    AuditChainBroken(AuditError),

    /// Storage failure; nothing from the operation was committed
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

/// Caller-facing error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    InvalidRequest,
    InvalidAnswer,
    InvalidStake,
    InsufficientFunds,
    WagerNotOpen,
    UserAlreadyJoined,
    WagerAlreadySettled,
    InvalidWagerTransition,
    InvalidToken,
    Conflict,
    Internal,
}

impl ErrorKind {
    /// HTTP status a web layer should answer with
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::InvalidRequest => 400,
            ErrorKind::InvalidToken => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::WagerNotOpen
            | ErrorKind::UserAlreadyJoined
            | ErrorKind::WagerAlreadySettled
            | ErrorKind::InvalidWagerTransition
            | ErrorKind::Conflict => 409,
            ErrorKind::InvalidAnswer | ErrorKind::InvalidStake | ErrorKind::InsufficientFunds => {
                422
            }
            ErrorKind::Internal => 500,
        }
    }
}

impl WagerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WagerError::WagerNotFound(_) => ErrorKind::NotFound,
            WagerError::NotGroupMember { .. } => ErrorKind::Forbidden,
            WagerError::InvalidWager(_)
            | WagerError::InvalidRequest(_)
            | WagerError::InvalidAmount(_)
            | WagerError::WrongTokenKind { .. }
            | WagerError::MissingTokenContext(_) => ErrorKind::InvalidRequest,
            WagerError::WagerNotOpen { .. } | WagerError::DeadlinePassed { .. } => {
                ErrorKind::WagerNotOpen
            }
            WagerError::InvalidAnswer(_) => ErrorKind::InvalidAnswer,
            WagerError::InvalidStake { .. } => ErrorKind::InvalidStake,
            WagerError::UserAlreadyJoined { .. } => ErrorKind::UserAlreadyJoined,
            WagerError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            WagerError::WagerAlreadySettled { .. } => ErrorKind::WagerAlreadySettled,
            WagerError::InvalidWagerTransition { .. } => ErrorKind::InvalidWagerTransition,
            WagerError::InvalidToken(_) => ErrorKind::InvalidToken,
            WagerError::DuplicateTransaction(_) => ErrorKind::Conflict,
            WagerError::AuditChainBroken(_) | WagerError::Store(_) => ErrorKind::Internal,
        }
    }

    /// Get a client-safe error message that doesn't leak sensitive information
    ///
    /// Storage errors are sanitized and user/group ids are redacted.
    pub fn client_message(&self) -> String {
        match self {
            WagerError::Store(_) | WagerError::AuditChainBroken(_) => {
                "Internal server error".to_string()
            }
            WagerError::NotGroupMember { .. } => "You are not a member of this group".to_string(),
            WagerError::UserAlreadyJoined { .. } => "You already joined this wager".to_string(),
            WagerError::DuplicateTransaction(_) => "Duplicate transaction".to_string(),
            WagerError::InvalidToken(rejection) => {
                format!("This link is no longer valid ({rejection})")
            }
            _ => self.to_string(),
        }
    }
}

impl From<AnswerRejection> for WagerError {
    fn from(rejection: AnswerRejection) -> Self {
        WagerError::InvalidAnswer(rejection)
    }
}

impl From<LedgerError> for WagerError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientFunds {
                available,
                required,
                ..
            } => WagerError::InsufficientFunds {
                available,
                required,
            },
            LedgerError::InvalidAmount(amount) => WagerError::InvalidAmount(amount),
            LedgerError::DuplicateTransaction(key) => WagerError::DuplicateTransaction(key),
            LedgerError::Store(e) => WagerError::Store(e),
        }
    }
}

impl From<TokenError> for WagerError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Invalid(rejection) => WagerError::InvalidToken(rejection),
            TokenError::InvalidTtl(hours) => {
                WagerError::InvalidRequest(format!("token lifetime must be positive, got {hours}h"))
            }
            TokenError::Store(e) => WagerError::Store(e),
        }
    }
}

impl From<AuditError> for WagerError {
    fn from(err: AuditError) -> Self {
        match err {
            AuditError::Store(e) => WagerError::Store(e),
            broken => WagerError::AuditChainBroken(broken),
        }
    }
}

/// Result type for wager operations
pub type WagerResult<T> = Result<T, WagerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wager::{AnswerDomain, WagerType};

    #[test]
    fn test_invalid_answer_names_valid_range() {
        let err = WagerError::InvalidAnswer(AnswerRejection {
            wager_type: WagerType::Numeric,
            value: "11".to_string(),
            expected: AnswerDomain::NumberRange {
                min: Some(1.0),
                max: Some(10.0),
            },
        });
        assert_eq!(
            err.to_string(),
            "Invalid answer '11' for numeric wager: expected a number between 1 and 10"
        );
        assert_eq!(err.kind().status_code(), 422);
    }

    #[test]
    fn test_kind_mapping() {
        let settled = WagerError::WagerAlreadySettled {
            wager_id: 1,
            status: WagerStatus::Settled,
        };
        assert_eq!(settled.kind(), ErrorKind::WagerAlreadySettled);
        assert_eq!(settled.kind().status_code(), 409);

        let late = WagerError::DeadlinePassed {
            wager_id: 1,
            deadline: Utc::now(),
        };
        assert_eq!(late.kind(), ErrorKind::WagerNotOpen);

        let token = WagerError::from(TokenError::Invalid(TokenRejection::Expired));
        assert_eq!(token.kind(), ErrorKind::InvalidToken);
        assert_eq!(token.kind().status_code(), 401);
    }

    #[test]
    fn test_ledger_errors_convert() {
        let err = WagerError::from(LedgerError::InsufficientFunds {
            user_id: 1,
            group_id: 2,
            available: 3,
            required: 4,
        });
        assert!(matches!(
            err,
            WagerError::InsufficientFunds {
                available: 3,
                required: 4
            }
        ));
    }

    #[test]
    fn test_client_message_sanitizes() {
        let err = WagerError::Store(StoreError::Corrupt("row 17".to_string()));
        assert_eq!(err.client_message(), "Internal server error");

        let err = WagerError::NotGroupMember {
            user_id: 5,
            group_id: 6,
        };
        assert!(!err.client_message().contains('5'));
    }

    #[test]
    fn test_broken_chain_keeps_its_variant() {
        let err = WagerError::from(AuditError::ChainBroken {
            entry_id: 42,
            reason: "content does not match its hash".to_string(),
        });
        assert!(matches!(
            err,
            WagerError::AuditChainBroken(AuditError::ChainBroken { entry_id: 42, .. })
        ));
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.client_message(), "Internal server error");

        let err = WagerError::from(AuditError::Store(StoreError::UnitClosed));
        assert!(matches!(err, WagerError::Store(StoreError::UnitClosed)));
    }
}
