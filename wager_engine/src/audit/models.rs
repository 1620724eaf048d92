//! Audit trail data models.

use crate::ids::{AuditId, EntryId, TokenId, TransactionId, UserId, WagerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Entity an audit entry is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum AuditSubject {
    Wager(WagerId),
    Entry(EntryId),
    Transaction(TransactionId),
    Token(TokenId),
}

impl AuditSubject {
    pub fn subject_type(&self) -> &'static str {
        match self {
            AuditSubject::Wager(_) => "wager",
            AuditSubject::Entry(_) => "entry",
            AuditSubject::Transaction(_) => "transaction",
            AuditSubject::Token(_) => "token",
        }
    }

    pub fn subject_id(&self) -> i64 {
        match *self {
            AuditSubject::Wager(id)
            | AuditSubject::Entry(id)
            | AuditSubject::Transaction(id)
            | AuditSubject::Token(id) => id,
        }
    }

    /// Rebuild a subject from its stored `(type, id)` pair
    pub fn from_parts(subject_type: &str, subject_id: i64) -> Option<Self> {
        match subject_type {
            "wager" => Some(AuditSubject::Wager(subject_id)),
            "entry" => Some(AuditSubject::Entry(subject_id)),
            "transaction" => Some(AuditSubject::Transaction(subject_id)),
            "token" => Some(AuditSubject::Token(subject_id)),
            _ => None,
        }
    }
}

impl std::fmt::Display for AuditSubject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.subject_type(), self.subject_id())
    }
}

/// Immutable audit log entry, hash-chained to its predecessor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: AuditId,
    pub action: String,
    /// `None` for system-initiated actions
    pub actor_id: Option<UserId>,
    pub subject: Option<AuditSubject>,
    pub metadata: serde_json::Value,
    pub prev_hash: Option<String>,
    pub entry_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Audit row awaiting insertion
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditLogEntry {
    pub action: String,
    pub actor_id: Option<UserId>,
    pub subject: Option<AuditSubject>,
    pub metadata: serde_json::Value,
    pub prev_hash: Option<String>,
    pub entry_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Action names written by the engine
pub mod actions {
    pub const WAGER_CREATED: &str = "wager.created";
    pub const WAGER_JOINED: &str = "wager.joined";
    pub const WAGER_LOCKED: &str = "wager.locked";
    pub const WAGER_SETTLED: &str = "wager.settled";
    pub const WAGER_CANCELLED: &str = "wager.cancelled";
    pub const WAGER_DISPUTED: &str = "wager.disputed";
    pub const BALANCE_INITIALIZED: &str = "ledger.initialized";
    pub const BALANCE_DECAYED: &str = "ledger.decayed";
    pub const TOKEN_ISSUED: &str = "token.issued";
    pub const TOKEN_CONSUMED: &str = "token.consumed";
    pub const TOKENS_INVALIDATED: &str = "token.invalidated";
}
