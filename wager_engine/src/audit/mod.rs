//! Tamper-evident audit trail of every state-changing operation.

pub mod errors;
pub mod models;
pub mod trail;

pub use errors::{AuditError, AuditResult};
pub use models::{AuditLogEntry, AuditSubject, NewAuditLogEntry, actions};
pub use trail::{AuditPolicy, AuditRecord, AuditTrail, entry_hash, verify_chain, verify_chain_to};
