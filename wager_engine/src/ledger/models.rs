//! Point ledger data models.

use crate::ids::{EntryId, GroupId, TransactionId, UserId, WagerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A user's balance slot within one group's point economy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PointAccount {
    pub user_id: UserId,
    pub group_id: GroupId,
}

impl PointAccount {
    pub fn new(user_id: UserId, group_id: GroupId) -> Self {
        Self { user_id, group_id }
    }
}

impl std::fmt::Display for PointAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "user {} in group {}", self.user_id, self.group_id)
    }
}

/// Wager (and optionally entry) a ledger movement belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WagerLink {
    pub wager_id: WagerId,
    pub entry_id: Option<EntryId>,
}

impl WagerLink {
    pub fn entry(wager_id: WagerId, entry_id: EntryId) -> Self {
        Self {
            wager_id,
            entry_id: Some(entry_id),
        }
    }
}

/// Ledger transaction kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Stake,
    Payout,
    LossRecord,
    Refund,
    InitialGrant,
    Decay,
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionKind::Stake => write!(f, "stake"),
            TransactionKind::Payout => write!(f, "payout"),
            TransactionKind::LossRecord => write!(f, "loss_record"),
            TransactionKind::Refund => write!(f, "refund"),
            TransactionKind::InitialGrant => write!(f, "initial_grant"),
            TransactionKind::Decay => write!(f, "decay"),
        }
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stake" => Ok(TransactionKind::Stake),
            "payout" => Ok(TransactionKind::Payout),
            "loss_record" => Ok(TransactionKind::LossRecord),
            "refund" => Ok(TransactionKind::Refund),
            "initial_grant" => Ok(TransactionKind::InitialGrant),
            "decay" => Ok(TransactionKind::Decay),
            other => Err(format!("unknown transaction kind '{other}'")),
        }
    }
}

/// Append-only ledger entry. Negative amounts are deductions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: TransactionId,
    pub user_id: UserId,
    pub group_id: GroupId,
    pub amount: i64,
    pub kind: TransactionKind,
    pub wager_id: Option<WagerId>,
    pub entry_id: Option<EntryId>,
    pub idempotency_key: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LedgerTransaction {
    pub fn account(&self) -> PointAccount {
        PointAccount::new(self.user_id, self.group_id)
    }
}

/// Ledger entry awaiting insertion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLedgerTransaction {
    pub account: PointAccount,
    pub amount: i64,
    pub kind: TransactionKind,
    pub link: Option<WagerLink>,
    pub idempotency_key: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Idempotency keys that make repeated ledger movements detectable
pub mod keys {
    use super::PointAccount;
    use crate::ids::EntryId;

    /// One starting grant per account
    pub fn initial_grant(account: PointAccount) -> String {
        format!("initial_grant:{}:{}", account.group_id, account.user_id)
    }

    /// One stake deduction per entry
    pub fn stake(entry_id: EntryId) -> String {
        format!("stake:{entry_id}")
    }

    /// One closing movement (payout, loss record or refund) per entry
    pub fn close(entry_id: EntryId) -> String {
        format!("close:{entry_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_kind_round_trips_through_text() {
        for kind in [
            TransactionKind::Stake,
            TransactionKind::Payout,
            TransactionKind::LossRecord,
            TransactionKind::Refund,
            TransactionKind::InitialGrant,
            TransactionKind::Decay,
        ] {
            assert_eq!(kind.to_string().parse::<TransactionKind>(), Ok(kind));
        }
        assert!("bonus".parse::<TransactionKind>().is_err());
    }

    #[test]
    fn test_idempotency_keys_are_scoped() {
        let account = PointAccount::new(7, 3);
        assert_eq!(keys::initial_grant(account), "initial_grant:3:7");
        assert_eq!(keys::stake(42), "stake:42");
        assert_eq!(keys::close(42), "close:42");
    }
}
