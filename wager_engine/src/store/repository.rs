//! Persistence port: the traits every storage backend implements.
//!
//! All engine operations run inside one [`AtomicUnit`] obtained from
//! [`Store::begin`]. A unit is the atomicity boundary: its writes become
//! visible together on [`AtomicUnit::commit`], and dropping it without a
//! commit discards them. Lock methods serialize competing units on the same
//! ledger account, wager row or token row until the holder commits or drops.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::errors::StoreResult;
use crate::audit::{AuditLogEntry, AuditSubject, NewAuditLogEntry};
use crate::ids::{EntryId, GroupId, TokenId, UserId, WagerId};
use crate::ledger::{LedgerTransaction, NewLedgerTransaction, PointAccount};
use crate::token::{NewToken, OneTimeToken};
use crate::wager::{NewWager, NewWagerEntry, Wager, WagerEntry};

/// Source of atomic units
#[async_trait]
pub trait Store: Send + Sync {
    /// Start a new atomic unit
    async fn begin(&self) -> StoreResult<Box<dyn AtomicUnit>>;
}

/// One all-or-nothing unit of reads and writes
#[async_trait]
pub trait AtomicUnit: Send {
    /// Make every write in this unit durable and visible
    async fn commit(&mut self) -> StoreResult<()>;

    // Ledger

    /// Serialize balance-changing units on this account
    async fn lock_account(&mut self, account: PointAccount) -> StoreResult<()>;

    /// Sum of all transaction amounts for the account
    async fn account_balance(&mut self, account: PointAccount) -> StoreResult<i64>;

    /// Append a transaction. Fails with `Conflict` on a reused idempotency key.
    async fn insert_transaction(
        &mut self,
        transaction: NewLedgerTransaction,
    ) -> StoreResult<LedgerTransaction>;

    /// Find a transaction by idempotency key
    async fn find_transaction_by_key(&mut self, key: &str)
    -> StoreResult<Option<LedgerTransaction>>;

    /// Account history, newest first
    async fn account_transactions(
        &mut self,
        account: PointAccount,
        limit: i64,
    ) -> StoreResult<Vec<LedgerTransaction>>;

    /// Every account with at least one transaction
    async fn ledger_accounts(&mut self) -> StoreResult<Vec<PointAccount>>;

    // Wagers

    async fn insert_wager(&mut self, wager: NewWager) -> StoreResult<Wager>;

    /// Read a wager and hold its row lock until the unit ends
    async fn lock_wager(&mut self, wager_id: WagerId) -> StoreResult<Option<Wager>>;

    /// Read a wager without locking
    async fn find_wager(&mut self, wager_id: WagerId) -> StoreResult<Option<Wager>>;

    /// Persist status and settlement fields
    async fn update_wager(&mut self, wager: &Wager) -> StoreResult<()>;

    /// Open wagers whose deadline is at or before `now`
    async fn overdue_wagers(&mut self, now: DateTime<Utc>) -> StoreResult<Vec<WagerId>>;

    // Entries

    /// Insert an entry. Fails with `Conflict` if the user already joined.
    async fn insert_entry(&mut self, entry: NewWagerEntry) -> StoreResult<WagerEntry>;

    async fn find_entry(
        &mut self,
        wager_id: WagerId,
        user_id: UserId,
    ) -> StoreResult<Option<WagerEntry>>;

    /// Entries of a wager in join order
    async fn wager_entries(&mut self, wager_id: WagerId) -> StoreResult<Vec<WagerEntry>>;

    async fn update_entry_result(
        &mut self,
        entry_id: EntryId,
        is_winner: Option<bool>,
        points_won: i64,
    ) -> StoreResult<()>;

    // Tokens

    async fn insert_token(&mut self, token: NewToken) -> StoreResult<OneTimeToken>;

    /// Read a token by hash and hold its row lock until the unit ends
    async fn lock_token(&mut self, token_hash: &str) -> StoreResult<Option<OneTimeToken>>;

    async fn find_token(&mut self, token_hash: &str) -> StoreResult<Option<OneTimeToken>>;

    async fn mark_token_used(&mut self, token_id: TokenId, used_at: DateTime<Utc>)
    -> StoreResult<()>;

    async fn wager_tokens(&mut self, wager_id: WagerId) -> StoreResult<Vec<OneTimeToken>>;

    /// Mark every unused, unexpired token of a wager as used. Returns the count.
    async fn revoke_wager_tokens(
        &mut self,
        wager_id: WagerId,
        at: DateTime<Utc>,
    ) -> StoreResult<u64>;

    // Audit

    /// Hash of the newest audit entry, holding the chain lock until the unit ends
    async fn audit_chain_head(&mut self) -> StoreResult<Option<String>>;

    async fn insert_audit(&mut self, entry: NewAuditLogEntry) -> StoreResult<AuditLogEntry>;

    /// Audit entries oldest first, optionally restricted to one subject
    async fn audit_entries(
        &mut self,
        subject: Option<AuditSubject>,
        limit: i64,
    ) -> StoreResult<Vec<AuditLogEntry>>;
}

/// Identity and membership lookup owned by the surrounding application
#[async_trait]
pub trait MembershipResolver: Send + Sync {
    async fn is_member(&self, user_id: UserId, group_id: GroupId) -> StoreResult<bool>;
}
