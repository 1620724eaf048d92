//! In-process storage backend.
//!
//! A unit takes the store-wide lock for its whole life and works on a private
//! copy of the state, which replaces the shared state on commit. Units are
//! therefore fully serialized, and an uncommitted unit leaves no trace.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::errors::{StoreError, StoreResult};
use super::repository::{AtomicUnit, MembershipResolver, Store};
use crate::audit::{AuditLogEntry, AuditSubject, NewAuditLogEntry};
use crate::ids::{EntryId, GroupId, TokenId, UserId, WagerId};
use crate::ledger::{LedgerTransaction, NewLedgerTransaction, PointAccount};
use crate::token::{NewToken, OneTimeToken};
use crate::wager::{NewWager, NewWagerEntry, Wager, WagerEntry, WagerStatus};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    wagers: BTreeMap<WagerId, Wager>,
    entries: BTreeMap<EntryId, WagerEntry>,
    transactions: Vec<LedgerTransaction>,
    tokens: BTreeMap<TokenId, OneTimeToken>,
    audit: Vec<AuditLogEntry>,
    next_wager_id: WagerId,
    next_entry_id: EntryId,
    next_token_id: TokenId,
}

/// In-memory [`Store`]
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn AtomicUnit>> {
        let guard = self.state.clone().lock_owned().await;
        let working = (*guard).clone();
        Ok(Box::new(MemoryUnit {
            guard: Some(guard),
            working,
        }))
    }
}

struct MemoryUnit {
    guard: Option<OwnedMutexGuard<MemoryState>>,
    working: MemoryState,
}

impl MemoryUnit {
    fn state(&mut self) -> StoreResult<&mut MemoryState> {
        if self.guard.is_none() {
            return Err(StoreError::UnitClosed);
        }
        Ok(&mut self.working)
    }
}

#[async_trait]
impl AtomicUnit for MemoryUnit {
    async fn commit(&mut self) -> StoreResult<()> {
        let mut guard = self.guard.take().ok_or(StoreError::UnitClosed)?;
        *guard = std::mem::take(&mut self.working);
        Ok(())
    }

    async fn lock_account(&mut self, _account: PointAccount) -> StoreResult<()> {
        // The unit already holds the store-wide lock.
        self.state().map(|_| ())
    }

    async fn account_balance(&mut self, account: PointAccount) -> StoreResult<i64> {
        let state = self.state()?;
        Ok(state
            .transactions
            .iter()
            .filter(|t| t.account() == account)
            .map(|t| t.amount)
            .sum())
    }

    async fn insert_transaction(
        &mut self,
        transaction: NewLedgerTransaction,
    ) -> StoreResult<LedgerTransaction> {
        let state = self.state()?;
        if let Some(key) = &transaction.idempotency_key
            && state
                .transactions
                .iter()
                .any(|t| t.idempotency_key.as_ref() == Some(key))
        {
            return Err(StoreError::Conflict(format!("idempotency key {key}")));
        }

        let record = LedgerTransaction {
            id: state.transactions.len() as i64 + 1,
            user_id: transaction.account.user_id,
            group_id: transaction.account.group_id,
            amount: transaction.amount,
            kind: transaction.kind,
            wager_id: transaction.link.map(|l| l.wager_id),
            entry_id: transaction.link.and_then(|l| l.entry_id),
            idempotency_key: transaction.idempotency_key,
            description: transaction.description,
            created_at: transaction.created_at,
        };
        state.transactions.push(record.clone());
        Ok(record)
    }

    async fn find_transaction_by_key(
        &mut self,
        key: &str,
    ) -> StoreResult<Option<LedgerTransaction>> {
        let state = self.state()?;
        Ok(state
            .transactions
            .iter()
            .find(|t| t.idempotency_key.as_deref() == Some(key))
            .cloned())
    }

    async fn account_transactions(
        &mut self,
        account: PointAccount,
        limit: i64,
    ) -> StoreResult<Vec<LedgerTransaction>> {
        let state = self.state()?;
        Ok(state
            .transactions
            .iter()
            .rev()
            .filter(|t| t.account() == account)
            .take(usize::try_from(limit).unwrap_or(0))
            .cloned()
            .collect())
    }

    async fn ledger_accounts(&mut self) -> StoreResult<Vec<PointAccount>> {
        let state = self.state()?;
        let mut accounts: Vec<PointAccount> =
            state.transactions.iter().map(LedgerTransaction::account).collect();
        accounts.sort();
        accounts.dedup();
        Ok(accounts)
    }

    async fn insert_wager(&mut self, wager: NewWager) -> StoreResult<Wager> {
        let state = self.state()?;
        state.next_wager_id += 1;
        let record = Wager {
            id: state.next_wager_id,
            group_id: wager.group_id,
            creator_id: wager.creator_id,
            question: wager.question,
            options: wager.options,
            stake: wager.stake,
            deadline: wager.deadline,
            status: WagerStatus::Open,
            outcome: None,
            settlement_note: None,
            settled_by: None,
            settled_at: None,
            created_at: wager.created_at,
        };
        state.wagers.insert(record.id, record.clone());
        Ok(record)
    }

    async fn lock_wager(&mut self, wager_id: WagerId) -> StoreResult<Option<Wager>> {
        self.find_wager(wager_id).await
    }

    async fn find_wager(&mut self, wager_id: WagerId) -> StoreResult<Option<Wager>> {
        let state = self.state()?;
        Ok(state.wagers.get(&wager_id).cloned())
    }

    async fn update_wager(&mut self, wager: &Wager) -> StoreResult<()> {
        let state = self.state()?;
        match state.wagers.get_mut(&wager.id) {
            Some(stored) => {
                *stored = wager.clone();
                Ok(())
            }
            None => Err(StoreError::Corrupt(format!("wager {} vanished", wager.id))),
        }
    }

    async fn overdue_wagers(&mut self, now: DateTime<Utc>) -> StoreResult<Vec<WagerId>> {
        let state = self.state()?;
        Ok(state
            .wagers
            .values()
            .filter(|w| w.status == WagerStatus::Open && w.deadline <= now)
            .map(|w| w.id)
            .collect())
    }

    async fn insert_entry(&mut self, entry: NewWagerEntry) -> StoreResult<WagerEntry> {
        let state = self.state()?;
        if state
            .entries
            .values()
            .any(|e| e.wager_id == entry.wager_id && e.user_id == entry.user_id)
        {
            return Err(StoreError::Conflict(format!(
                "user {} already joined wager {}",
                entry.user_id, entry.wager_id
            )));
        }

        state.next_entry_id += 1;
        let record = WagerEntry {
            id: state.next_entry_id,
            wager_id: entry.wager_id,
            user_id: entry.user_id,
            group_id: entry.group_id,
            answer_value: entry.answer_value,
            points_wagered: entry.points_wagered,
            is_winner: None,
            points_won: 0,
            created_at: entry.created_at,
        };
        state.entries.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_entry(
        &mut self,
        wager_id: WagerId,
        user_id: UserId,
    ) -> StoreResult<Option<WagerEntry>> {
        let state = self.state()?;
        Ok(state
            .entries
            .values()
            .find(|e| e.wager_id == wager_id && e.user_id == user_id)
            .cloned())
    }

    async fn wager_entries(&mut self, wager_id: WagerId) -> StoreResult<Vec<WagerEntry>> {
        let state = self.state()?;
        Ok(state
            .entries
            .values()
            .filter(|e| e.wager_id == wager_id)
            .cloned()
            .collect())
    }

    async fn update_entry_result(
        &mut self,
        entry_id: EntryId,
        is_winner: Option<bool>,
        points_won: i64,
    ) -> StoreResult<()> {
        let state = self.state()?;
        let entry = state
            .entries
            .get_mut(&entry_id)
            .ok_or_else(|| StoreError::Corrupt(format!("entry {entry_id} vanished")))?;
        entry.is_winner = is_winner;
        entry.points_won = points_won;
        Ok(())
    }

    async fn insert_token(&mut self, token: NewToken) -> StoreResult<OneTimeToken> {
        let state = self.state()?;
        if state.tokens.values().any(|t| t.token_hash == token.token_hash) {
            return Err(StoreError::Conflict("token hash".to_string()));
        }

        state.next_token_id += 1;
        let record = OneTimeToken {
            id: state.next_token_id,
            token_hash: token.token_hash,
            kind: token.kind,
            wager_id: token.wager_id,
            owner_id: token.owner_id,
            context: token.context,
            expires_at: token.expires_at,
            used_at: None,
            created_at: token.created_at,
        };
        state.tokens.insert(record.id, record.clone());
        Ok(record)
    }

    async fn lock_token(&mut self, token_hash: &str) -> StoreResult<Option<OneTimeToken>> {
        self.find_token(token_hash).await
    }

    async fn find_token(&mut self, token_hash: &str) -> StoreResult<Option<OneTimeToken>> {
        let state = self.state()?;
        Ok(state
            .tokens
            .values()
            .find(|t| t.token_hash == token_hash)
            .cloned())
    }

    async fn mark_token_used(
        &mut self,
        token_id: TokenId,
        used_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let state = self.state()?;
        let token = state
            .tokens
            .get_mut(&token_id)
            .ok_or_else(|| StoreError::Corrupt(format!("token {token_id} vanished")))?;
        token.used_at = Some(used_at);
        Ok(())
    }

    async fn wager_tokens(&mut self, wager_id: WagerId) -> StoreResult<Vec<OneTimeToken>> {
        let state = self.state()?;
        Ok(state
            .tokens
            .values()
            .filter(|t| t.wager_id == Some(wager_id))
            .cloned()
            .collect())
    }

    async fn revoke_wager_tokens(
        &mut self,
        wager_id: WagerId,
        at: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let state = self.state()?;
        let mut revoked = 0;
        for token in state.tokens.values_mut() {
            if token.wager_id == Some(wager_id) && token.is_active(at) {
                token.used_at = Some(at);
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn audit_chain_head(&mut self) -> StoreResult<Option<String>> {
        let state = self.state()?;
        Ok(state.audit.last().map(|e| e.entry_hash.clone()))
    }

    async fn insert_audit(&mut self, entry: NewAuditLogEntry) -> StoreResult<AuditLogEntry> {
        let state = self.state()?;
        let record = AuditLogEntry {
            id: state.audit.len() as i64 + 1,
            action: entry.action,
            actor_id: entry.actor_id,
            subject: entry.subject,
            metadata: entry.metadata,
            prev_hash: entry.prev_hash,
            entry_hash: entry.entry_hash,
            created_at: entry.created_at,
        };
        state.audit.push(record.clone());
        Ok(record)
    }

    async fn audit_entries(
        &mut self,
        subject: Option<AuditSubject>,
        limit: i64,
    ) -> StoreResult<Vec<AuditLogEntry>> {
        let state = self.state()?;
        let matching: Vec<&AuditLogEntry> = state
            .audit
            .iter()
            .filter(|e| subject.is_none() || e.subject == subject)
            .collect();
        let keep = usize::try_from(limit).unwrap_or(0);
        let skip = matching.len().saturating_sub(keep);
        Ok(matching.into_iter().skip(skip).cloned().collect())
    }
}

/// In-memory [`MembershipResolver`]
#[derive(Clone, Default)]
pub struct MemberDirectory {
    groups: Arc<RwLock<HashMap<GroupId, HashSet<UserId>>>>,
}

impl MemberDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_member(&self, group_id: GroupId, user_id: UserId) {
        self.groups
            .write()
            .await
            .entry(group_id)
            .or_default()
            .insert(user_id);
    }

    pub async fn remove_member(&self, group_id: GroupId, user_id: UserId) {
        if let Some(members) = self.groups.write().await.get_mut(&group_id) {
            members.remove(&user_id);
        }
    }
}

#[async_trait]
impl MembershipResolver for MemberDirectory {
    async fn is_member(&self, user_id: UserId, group_id: GroupId) -> StoreResult<bool> {
        Ok(self
            .groups
            .read()
            .await
            .get(&group_id)
            .is_some_and(|members| members.contains(&user_id)))
    }
}
