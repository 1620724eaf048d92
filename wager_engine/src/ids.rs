//! Identifier aliases shared by every component.

/// User ID type
pub type UserId = i64;

/// Chat group ID type; each group owns one point economy
pub type GroupId = i64;

/// Wager ID type
pub type WagerId = i64;

/// Wager entry ID type
pub type EntryId = i64;

/// Ledger transaction ID type
pub type TransactionId = i64;

/// One-time token ID type
pub type TokenId = i64;

/// Audit log entry ID type
pub type AuditId = i64;
