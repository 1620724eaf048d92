//! Hash-chained audit trail.
//!
//! Each entry's hash covers its predecessor's hash and its own content, so an
//! edit, deletion or reordering anywhere in the log breaks every later link.

use super::{
    errors::{AuditError, AuditResult},
    models::{AuditLogEntry, AuditSubject, NewAuditLogEntry},
};
use crate::clock::Clock;
use crate::ids::UserId;
use crate::store::AtomicUnit;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::str::FromStr;
use std::sync::Arc;

/// What happens when an audit write fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditPolicy {
    /// Audit entries are written inside the operation's atomic unit; a failed
    /// write aborts the operation
    #[default]
    Strict,
    /// Audit entries are written after commit; failures are logged and dropped
    BestEffort,
}

impl std::fmt::Display for AuditPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditPolicy::Strict => write!(f, "strict"),
            AuditPolicy::BestEffort => write!(f, "best_effort"),
        }
    }
}

impl FromStr for AuditPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(AuditPolicy::Strict),
            "best_effort" | "best-effort" => Ok(AuditPolicy::BestEffort),
            other => Err(format!("unknown audit policy '{other}'")),
        }
    }
}

/// Audit action awaiting a unit to be written into
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub action: String,
    pub subject: Option<AuditSubject>,
    pub metadata: serde_json::Value,
    pub actor_id: Option<UserId>,
}

impl AuditRecord {
    pub fn new(action: &str, subject: Option<AuditSubject>, actor_id: Option<UserId>) -> Self {
        Self {
            action: action.to_string(),
            subject,
            metadata: serde_json::Value::Object(serde_json::Map::new()),
            actor_id,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Append-only audit trail
#[derive(Clone)]
pub struct AuditTrail {
    clock: Arc<dyn Clock>,
}

impl AuditTrail {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Append an entry linked to the current chain head
    pub async fn record(
        &self,
        unit: &mut dyn AtomicUnit,
        record: AuditRecord,
    ) -> AuditResult<AuditLogEntry> {
        let prev_hash = unit.audit_chain_head().await?;
        let created_at = self.clock.now();
        let entry_hash = entry_hash(
            prev_hash.as_deref(),
            &record.action,
            record.actor_id,
            record.subject,
            &record.metadata,
            created_at,
        );

        let entry = unit
            .insert_audit(NewAuditLogEntry {
                action: record.action,
                actor_id: record.actor_id,
                subject: record.subject,
                metadata: record.metadata,
                prev_hash,
                entry_hash,
                created_at,
            })
            .await?;
        Ok(entry)
    }
}

/// SHA-256 over the previous hash and an entry's content
///
/// Timestamps are hashed at microsecond precision, the resolution PostgreSQL
/// keeps.
pub fn entry_hash(
    prev_hash: Option<&str>,
    action: &str,
    actor_id: Option<UserId>,
    subject: Option<AuditSubject>,
    metadata: &serde_json::Value,
    created_at: DateTime<Utc>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prev_hash.unwrap_or("").as_bytes());
    hasher.update(b"\n");
    hasher.update(action.as_bytes());
    hasher.update(b"\n");
    hasher.update(actor_id.map(|id| id.to_string()).unwrap_or_default());
    hasher.update(b"\n");
    hasher.update(subject.map(|s| s.to_string()).unwrap_or_default());
    hasher.update(b"\n");
    hasher.update(metadata.to_string());
    hasher.update(b"\n");
    hasher.update(created_at.timestamp_micros().to_be_bytes());
    hex::encode(hasher.finalize())
}

/// Check a complete log, oldest first, for tampering
///
/// Edits, reordering and removal before the last entry are detected. Removing
/// entries from the end leaves a valid shorter chain; use [`verify_chain_to`]
/// with a head hash kept outside the log to catch that.
///
/// # Errors
///
/// * `AuditError::ChainBroken` - An entry's hash or back-link does not match
pub fn verify_chain(entries: &[AuditLogEntry]) -> AuditResult<()> {
    let mut expected_prev: Option<&str> = None;

    for entry in entries {
        if entry.prev_hash.as_deref() != expected_prev {
            return Err(AuditError::ChainBroken {
                entry_id: entry.id,
                reason: "link to previous entry does not match".to_string(),
            });
        }

        let recomputed = entry_hash(
            entry.prev_hash.as_deref(),
            &entry.action,
            entry.actor_id,
            entry.subject,
            &entry.metadata,
            entry.created_at,
        );
        if recomputed != entry.entry_hash {
            return Err(AuditError::ChainBroken {
                entry_id: entry.id,
                reason: "content does not match its hash".to_string(),
            });
        }

        expected_prev = Some(&entry.entry_hash);
    }

    Ok(())
}

/// [`verify_chain`], additionally requiring the log to still reach
/// `expected_head`, a hash taken from an earlier [`AuditLogEntry`]
///
/// Entries appended after the anchored one are accepted.
///
/// # Errors
///
/// * `AuditError::ChainBroken` - An entry's hash or back-link does not match
/// * `AuditError::HeadMismatch` - The anchored entry was cut from the end
pub fn verify_chain_to(entries: &[AuditLogEntry], expected_head: &str) -> AuditResult<()> {
    verify_chain(entries)?;
    if entries.iter().any(|entry| entry.entry_hash == expected_head) {
        return Ok(());
    }
    Err(AuditError::HeadMismatch {
        expected: expected_head.to_string(),
        found: entries.last().map(|entry| entry.entry_hash.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::actions;
    use crate::clock::ManualClock;
    use crate::store::{MemoryStore, Store};
    use serde_json::json;

    async fn recorded_log() -> Vec<AuditLogEntry> {
        let store = MemoryStore::new();
        let trail = AuditTrail::new(Arc::new(ManualClock::new(Utc::now())));
        let mut unit = store.begin().await.unwrap();

        for (action, subject) in [
            (actions::WAGER_CREATED, AuditSubject::Wager(1)),
            (actions::WAGER_JOINED, AuditSubject::Entry(1)),
            (actions::WAGER_SETTLED, AuditSubject::Wager(1)),
        ] {
            trail
                .record(
                    unit.as_mut(),
                    AuditRecord::new(action, Some(subject), Some(7))
                        .with_metadata(json!({ "points": 10 })),
                )
                .await
                .unwrap();
        }

        unit.audit_entries(None, 100).await.unwrap()
    }

    #[tokio::test]
    async fn test_entries_link_to_predecessor() {
        let log = recorded_log().await;
        assert_eq!(log.len(), 3);
        assert_eq!(log[0].prev_hash, None);
        assert_eq!(log[1].prev_hash.as_deref(), Some(log[0].entry_hash.as_str()));
        assert_eq!(log[2].prev_hash.as_deref(), Some(log[1].entry_hash.as_str()));
        verify_chain(&log).unwrap();
    }

    #[tokio::test]
    async fn test_detects_edit() {
        let mut log = recorded_log().await;
        log[1].metadata = json!({ "points": 1000 });
        let err = verify_chain(&log).unwrap_err();
        assert!(matches!(err, AuditError::ChainBroken { entry_id, .. } if entry_id == log[1].id));
    }

    #[tokio::test]
    async fn test_detects_deletion_and_reorder() {
        let log = recorded_log().await;

        let without_middle = vec![log[0].clone(), log[2].clone()];
        assert!(verify_chain(&without_middle).is_err());

        let reordered = vec![log[1].clone(), log[0].clone(), log[2].clone()];
        assert!(verify_chain(&reordered).is_err());
    }

    #[tokio::test]
    async fn test_tail_truncation_needs_anchored_head() {
        let log = recorded_log().await;
        let head = log[2].entry_hash.clone();
        verify_chain_to(&log, &head).unwrap();

        // Dropping the newest entry still forms a valid chain on its own
        let truncated = &log[..2];
        verify_chain(truncated).unwrap();
        let err = verify_chain_to(truncated, &head).unwrap_err();
        match err {
            AuditError::HeadMismatch { expected, found } => {
                assert_eq!(expected, head);
                assert_eq!(found, Some(log[1].entry_hash.clone()));
            }
            other => panic!("unexpected error: {other}"),
        }

        // An older anchor stays valid as the log grows
        verify_chain_to(&log, &log[0].entry_hash).unwrap();

        assert!(matches!(
            verify_chain_to(&[], &head),
            Err(AuditError::HeadMismatch { found: None, .. })
        ));
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("strict".parse::<AuditPolicy>(), Ok(AuditPolicy::Strict));
        assert_eq!("Best-Effort".parse::<AuditPolicy>(), Ok(AuditPolicy::BestEffort));
        assert!("loose".parse::<AuditPolicy>().is_err());
        assert_eq!(AuditPolicy::default(), AuditPolicy::Strict);
    }
}
