//! Settlement behaviour when the audit store rejects writes.

mod common;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{GROUP, draft, start_time};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use wager_engine::audit::{AuditLogEntry, AuditSubject, NewAuditLogEntry, actions};
use wager_engine::ledger::{LedgerTransaction, NewLedgerTransaction, PointAccount};
use wager_engine::store::{AtomicUnit, MemberDirectory, MemoryStore, Store, StoreError, StoreResult};
use wager_engine::token::{NewToken, OneTimeToken};
use wager_engine::wager::{NewWager, NewWagerEntry, Wager, WagerEntry, WagerOptions, WagerStatus};
use wager_engine::{
    AuditPolicy, EngineConfig, EntryId, ManualClock, SettlementEngine, TokenId, UserId, WagerId,
};

/// Memory store whose audit inserts fail while `fail` is set
#[derive(Clone)]
struct FlakyAuditStore {
    inner: MemoryStore,
    fail: Arc<AtomicBool>,
}

struct FlakyAuditUnit {
    inner: Box<dyn AtomicUnit>,
    fail: Arc<AtomicBool>,
}

#[async_trait]
impl Store for FlakyAuditStore {
    async fn begin(&self) -> StoreResult<Box<dyn AtomicUnit>> {
        Ok(Box::new(FlakyAuditUnit {
            inner: self.inner.begin().await?,
            fail: self.fail.clone(),
        }))
    }
}

#[async_trait]
impl AtomicUnit for FlakyAuditUnit {
    async fn commit(&mut self) -> StoreResult<()> {
        self.inner.commit().await
    }

    async fn lock_account(&mut self, account: PointAccount) -> StoreResult<()> {
        self.inner.lock_account(account).await
    }

    async fn account_balance(&mut self, account: PointAccount) -> StoreResult<i64> {
        self.inner.account_balance(account).await
    }

    async fn insert_transaction(
        &mut self,
        transaction: NewLedgerTransaction,
    ) -> StoreResult<LedgerTransaction> {
        self.inner.insert_transaction(transaction).await
    }

    async fn find_transaction_by_key(
        &mut self,
        key: &str,
    ) -> StoreResult<Option<LedgerTransaction>> {
        self.inner.find_transaction_by_key(key).await
    }

    async fn account_transactions(
        &mut self,
        account: PointAccount,
        limit: i64,
    ) -> StoreResult<Vec<LedgerTransaction>> {
        self.inner.account_transactions(account, limit).await
    }

    async fn ledger_accounts(&mut self) -> StoreResult<Vec<PointAccount>> {
        self.inner.ledger_accounts().await
    }

    async fn insert_wager(&mut self, wager: NewWager) -> StoreResult<Wager> {
        self.inner.insert_wager(wager).await
    }

    async fn lock_wager(&mut self, wager_id: WagerId) -> StoreResult<Option<Wager>> {
        self.inner.lock_wager(wager_id).await
    }

    async fn find_wager(&mut self, wager_id: WagerId) -> StoreResult<Option<Wager>> {
        self.inner.find_wager(wager_id).await
    }

    async fn update_wager(&mut self, wager: &Wager) -> StoreResult<()> {
        self.inner.update_wager(wager).await
    }

    async fn overdue_wagers(&mut self, now: DateTime<Utc>) -> StoreResult<Vec<WagerId>> {
        self.inner.overdue_wagers(now).await
    }

    async fn insert_entry(&mut self, entry: NewWagerEntry) -> StoreResult<WagerEntry> {
        self.inner.insert_entry(entry).await
    }

    async fn find_entry(
        &mut self,
        wager_id: WagerId,
        user_id: UserId,
    ) -> StoreResult<Option<WagerEntry>> {
        self.inner.find_entry(wager_id, user_id).await
    }

    async fn wager_entries(&mut self, wager_id: WagerId) -> StoreResult<Vec<WagerEntry>> {
        self.inner.wager_entries(wager_id).await
    }

    async fn update_entry_result(
        &mut self,
        entry_id: EntryId,
        is_winner: Option<bool>,
        points_won: i64,
    ) -> StoreResult<()> {
        self.inner
            .update_entry_result(entry_id, is_winner, points_won)
            .await
    }

    async fn insert_token(&mut self, token: NewToken) -> StoreResult<OneTimeToken> {
        self.inner.insert_token(token).await
    }

    async fn lock_token(&mut self, token_hash: &str) -> StoreResult<Option<OneTimeToken>> {
        self.inner.lock_token(token_hash).await
    }

    async fn find_token(&mut self, token_hash: &str) -> StoreResult<Option<OneTimeToken>> {
        self.inner.find_token(token_hash).await
    }

    async fn mark_token_used(
        &mut self,
        token_id: TokenId,
        used_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.inner.mark_token_used(token_id, used_at).await
    }

    async fn wager_tokens(&mut self, wager_id: WagerId) -> StoreResult<Vec<OneTimeToken>> {
        self.inner.wager_tokens(wager_id).await
    }

    async fn revoke_wager_tokens(
        &mut self,
        wager_id: WagerId,
        at: DateTime<Utc>,
    ) -> StoreResult<u64> {
        self.inner.revoke_wager_tokens(wager_id, at).await
    }

    async fn audit_chain_head(&mut self) -> StoreResult<Option<String>> {
        self.inner.audit_chain_head().await
    }

    async fn insert_audit(&mut self, entry: NewAuditLogEntry) -> StoreResult<AuditLogEntry> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Timeout(Duration::from_secs(1)));
        }
        self.inner.insert_audit(entry).await
    }

    async fn audit_entries(
        &mut self,
        subject: Option<AuditSubject>,
        limit: i64,
    ) -> StoreResult<Vec<AuditLogEntry>> {
        self.inner.audit_entries(subject, limit).await
    }
}

struct Setup {
    engine: SettlementEngine,
    fail: Arc<AtomicBool>,
    wager: Wager,
}

/// Users 1 and 2 each stake 10 on a binary wager; audit writes still succeed
async fn setup(policy: AuditPolicy) -> Setup {
    let fail = Arc::new(AtomicBool::new(false));
    let store = FlakyAuditStore {
        inner: MemoryStore::new(),
        fail: fail.clone(),
    };
    let members = MemberDirectory::new();
    let clock = Arc::new(ManualClock::new(start_time()));
    let engine = SettlementEngine::new(
        Arc::new(store),
        Arc::new(members.clone()),
        clock.clone(),
        EngineConfig {
            audit_policy: policy,
            ..EngineConfig::default()
        },
    );

    for user in [1, 2] {
        members.add_member(GROUP, user).await;
        engine.initialize_balance(user, GROUP).await.unwrap();
    }
    let wager = engine
        .create_wager(GROUP, 1, draft(WagerOptions::Binary, Some(10), &clock))
        .await
        .unwrap();
    engine.place_wager(wager.id, 1, "yes", 10).await.unwrap();
    engine.place_wager(wager.id, 2, "no", 10).await.unwrap();

    Setup {
        engine,
        fail,
        wager,
    }
}

#[tokio::test]
async fn test_best_effort_settles_despite_audit_failure() {
    let s = setup(AuditPolicy::BestEffort).await;

    s.fail.store(true, Ordering::SeqCst);
    let settled = s
        .engine
        .settle_wager(s.wager.id, "yes", None, Some(1))
        .await
        .unwrap();
    s.fail.store(false, Ordering::SeqCst);

    assert_eq!(settled.status, WagerStatus::Settled);
    assert_eq!(s.engine.get_balance(1, GROUP).await.unwrap(), 1010);
    assert_eq!(s.engine.get_balance(2, GROUP).await.unwrap(), 990);

    // The settlement stands but left no audit record
    let log = s
        .engine
        .audit_log(Some(AuditSubject::Wager(s.wager.id)), 10)
        .await
        .unwrap();
    assert!(log.iter().all(|e| e.action != actions::WAGER_SETTLED));
    s.engine.verify_audit_chain().await.unwrap();
}

#[tokio::test]
async fn test_strict_audit_failure_rolls_back_settlement() {
    let s = setup(AuditPolicy::Strict).await;

    s.fail.store(true, Ordering::SeqCst);
    let err = s
        .engine
        .settle_wager(s.wager.id, "yes", None, Some(1))
        .await
        .unwrap_err();
    s.fail.store(false, Ordering::SeqCst);
    assert!(matches!(
        err,
        wager_engine::WagerError::Store(StoreError::Timeout(_))
    ));

    let wager = s.engine.get_wager(s.wager.id).await.unwrap();
    assert_eq!(wager.status, WagerStatus::Open);
    assert_eq!(s.engine.get_balance(1, GROUP).await.unwrap(), 990);
    assert_eq!(s.engine.get_balance(2, GROUP).await.unwrap(), 990);

    // Once audit writes recover the same settlement goes through
    s.engine
        .settle_wager(s.wager.id, "yes", None, Some(1))
        .await
        .unwrap();
    assert_eq!(s.engine.get_balance(1, GROUP).await.unwrap(), 1010);
}
