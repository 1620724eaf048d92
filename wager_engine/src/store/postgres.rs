//! PostgreSQL storage backend.
//!
//! One [`AtomicUnit`] wraps one database transaction. Ledger accounts and the
//! audit chain are serialized with transaction-scoped advisory locks; wager
//! and token rows with `SELECT ... FOR UPDATE`. Lock waits are bounded by a
//! per-transaction `lock_timeout`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction};
use std::time::Duration;

use super::errors::{StoreError, StoreResult};
use super::repository::{AtomicUnit, MembershipResolver, Store};
use super::timeouts::{DEFAULT_LOCK_TIMEOUT, with_timeout};
use crate::audit::{AuditLogEntry, AuditSubject, NewAuditLogEntry};
use crate::ids::{EntryId, GroupId, TokenId, UserId, WagerId};
use crate::ledger::{LedgerTransaction, NewLedgerTransaction, PointAccount};
use crate::token::{NewToken, OneTimeToken};
use crate::wager::{NewWager, NewWagerEntry, Wager, WagerEntry};

const LOCK_NOT_AVAILABLE: &str = "55P03";

const WAGER_COLUMNS: &str = "id, group_id, creator_id, question, options, stake, deadline, status, \
     outcome, settlement_note, settled_by, settled_at, created_at";
const ENTRY_COLUMNS: &str = "id, wager_id, user_id, group_id, answer_value, points_wagered, \
     is_winner, points_won, created_at";
const TRANSACTION_COLUMNS: &str = "id, user_id, group_id, amount, kind, wager_id, entry_id, \
     idempotency_key, description, created_at";
const TOKEN_COLUMNS: &str =
    "id, token_hash, kind, wager_id, owner_id, context, expires_at, used_at, created_at";
const AUDIT_COLUMNS: &str =
    "id, action, actor_id, subject_type, subject_id, metadata, prev_hash, entry_hash, created_at";

/// PostgreSQL-backed [`Store`]
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Bound how long a unit waits to start or to acquire a lock
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn AtomicUnit>> {
        let mut tx = with_timeout(self.lock_timeout, self.pool.begin()).await?;
        sqlx::query(&format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await?;

        Ok(Box::new(PgUnit {
            tx: Some(tx),
            lock_timeout: self.lock_timeout,
        }))
    }
}

struct PgUnit {
    tx: Option<Transaction<'static, Postgres>>,
    lock_timeout: Duration,
}

impl PgUnit {
    fn conn(&mut self) -> StoreResult<&mut PgConnection> {
        self.tx.as_deref_mut().ok_or(StoreError::UnitClosed)
    }

    async fn advisory_lock(&mut self, key: String) -> StoreResult<()> {
        let lock_timeout = self.lock_timeout;
        let conn = self.conn()?;
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(key)
            .execute(conn)
            .await
            .map_err(|e| lock_error(e, lock_timeout))?;
        Ok(())
    }
}

/// Lock waits past `lock_timeout` become [`StoreError::Timeout`]
fn lock_error(err: sqlx::Error, lock_timeout: Duration) -> StoreError {
    let code = err
        .as_database_error()
        .and_then(|db| db.code())
        .map(|code| code.into_owned());
    if code.as_deref() == Some(LOCK_NOT_AVAILABLE) {
        StoreError::Timeout(lock_timeout)
    } else {
        StoreError::Database(err)
    }
}

/// Unique violations become [`StoreError::Conflict`]
fn write_error(err: sqlx::Error, what: &str) -> StoreError {
    match err.as_database_error() {
        Some(db) if db.is_unique_violation() => StoreError::Conflict(what.to_string()),
        _ => StoreError::Database(err),
    }
}

fn corrupt(message: String) -> StoreError {
    StoreError::Corrupt(message)
}

fn wager_from_row(row: &PgRow) -> StoreResult<Wager> {
    let options: serde_json::Value = row.try_get("options")?;
    let status: String = row.try_get("status")?;
    Ok(Wager {
        id: row.try_get("id")?,
        group_id: row.try_get("group_id")?,
        creator_id: row.try_get("creator_id")?,
        question: row.try_get("question")?,
        options: serde_json::from_value(options)?,
        stake: row.try_get("stake")?,
        deadline: row.try_get("deadline")?,
        status: status.parse().map_err(corrupt)?,
        outcome: row.try_get("outcome")?,
        settlement_note: row.try_get("settlement_note")?,
        settled_by: row.try_get("settled_by")?,
        settled_at: row.try_get("settled_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn entry_from_row(row: &PgRow) -> StoreResult<WagerEntry> {
    Ok(WagerEntry {
        id: row.try_get("id")?,
        wager_id: row.try_get("wager_id")?,
        user_id: row.try_get("user_id")?,
        group_id: row.try_get("group_id")?,
        answer_value: row.try_get("answer_value")?,
        points_wagered: row.try_get("points_wagered")?,
        is_winner: row.try_get("is_winner")?,
        points_won: row.try_get("points_won")?,
        created_at: row.try_get("created_at")?,
    })
}

fn transaction_from_row(row: &PgRow) -> StoreResult<LedgerTransaction> {
    let kind: String = row.try_get("kind")?;
    Ok(LedgerTransaction {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        group_id: row.try_get("group_id")?,
        amount: row.try_get("amount")?,
        kind: kind.parse().map_err(corrupt)?,
        wager_id: row.try_get("wager_id")?,
        entry_id: row.try_get("entry_id")?,
        idempotency_key: row.try_get("idempotency_key")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
    })
}

fn token_from_row(row: &PgRow) -> StoreResult<OneTimeToken> {
    let kind: String = row.try_get("kind")?;
    let context: serde_json::Value = row.try_get("context")?;
    Ok(OneTimeToken {
        id: row.try_get("id")?,
        token_hash: row.try_get("token_hash")?,
        kind: kind.parse().map_err(corrupt)?,
        wager_id: row.try_get("wager_id")?,
        owner_id: row.try_get("owner_id")?,
        context: serde_json::from_value(context)?,
        expires_at: row.try_get("expires_at")?,
        used_at: row.try_get("used_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn audit_from_row(row: &PgRow) -> StoreResult<AuditLogEntry> {
    let subject_type: Option<String> = row.try_get("subject_type")?;
    let subject_id: Option<i64> = row.try_get("subject_id")?;
    let subject = match (subject_type, subject_id) {
        (Some(kind), Some(id)) => Some(
            AuditSubject::from_parts(&kind, id)
                .ok_or_else(|| corrupt(format!("unknown audit subject type '{kind}'")))?,
        ),
        _ => None,
    };
    Ok(AuditLogEntry {
        id: row.try_get("id")?,
        action: row.try_get("action")?,
        actor_id: row.try_get("actor_id")?,
        subject,
        metadata: row.try_get("metadata")?,
        prev_hash: row.try_get("prev_hash")?,
        entry_hash: row.try_get("entry_hash")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl AtomicUnit for PgUnit {
    async fn commit(&mut self) -> StoreResult<()> {
        let tx = self.tx.take().ok_or(StoreError::UnitClosed)?;
        tx.commit().await?;
        Ok(())
    }

    async fn lock_account(&mut self, account: PointAccount) -> StoreResult<()> {
        self.advisory_lock(format!("ledger:{}:{}", account.group_id, account.user_id))
            .await
    }

    async fn account_balance(&mut self, account: PointAccount) -> StoreResult<i64> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(amount), 0)::BIGINT AS balance
            FROM ledger_transactions
            WHERE user_id = $1 AND group_id = $2
            "#,
        )
        .bind(account.user_id)
        .bind(account.group_id)
        .fetch_one(self.conn()?)
        .await?;

        Ok(row.try_get("balance")?)
    }

    async fn insert_transaction(
        &mut self,
        transaction: NewLedgerTransaction,
    ) -> StoreResult<LedgerTransaction> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO ledger_transactions
                (user_id, group_id, amount, kind, wager_id, entry_id, idempotency_key, description, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {TRANSACTION_COLUMNS}
            "#
        ))
        .bind(transaction.account.user_id)
        .bind(transaction.account.group_id)
        .bind(transaction.amount)
        .bind(transaction.kind.to_string())
        .bind(transaction.link.map(|l| l.wager_id))
        .bind(transaction.link.and_then(|l| l.entry_id))
        .bind(&transaction.idempotency_key)
        .bind(&transaction.description)
        .bind(transaction.created_at)
        .fetch_one(self.conn()?)
        .await
        .map_err(|e| write_error(e, "ledger idempotency key"))?;

        transaction_from_row(&row)
    }

    async fn find_transaction_by_key(
        &mut self,
        key: &str,
    ) -> StoreResult<Option<LedgerTransaction>> {
        let row = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM ledger_transactions WHERE idempotency_key = $1"
        ))
        .bind(key)
        .fetch_optional(self.conn()?)
        .await?;

        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn account_transactions(
        &mut self,
        account: PointAccount,
        limit: i64,
    ) -> StoreResult<Vec<LedgerTransaction>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM ledger_transactions
            WHERE user_id = $1 AND group_id = $2
            ORDER BY id DESC
            LIMIT $3
            "#
        ))
        .bind(account.user_id)
        .bind(account.group_id)
        .bind(limit)
        .fetch_all(self.conn()?)
        .await?;

        rows.iter().map(transaction_from_row).collect()
    }

    async fn ledger_accounts(&mut self) -> StoreResult<Vec<PointAccount>> {
        let rows = sqlx::query(
            "SELECT DISTINCT user_id, group_id FROM ledger_transactions ORDER BY user_id, group_id",
        )
        .fetch_all(self.conn()?)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(PointAccount::new(
                    row.try_get("user_id")?,
                    row.try_get("group_id")?,
                ))
            })
            .collect()
    }

    async fn insert_wager(&mut self, wager: NewWager) -> StoreResult<Wager> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO wagers (group_id, creator_id, wager_type, question, options, stake, deadline, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'open', $8)
            RETURNING {WAGER_COLUMNS}
            "#
        ))
        .bind(wager.group_id)
        .bind(wager.creator_id)
        .bind(wager.options.wager_type().to_string())
        .bind(&wager.question)
        .bind(serde_json::to_value(&wager.options)?)
        .bind(wager.stake)
        .bind(wager.deadline)
        .bind(wager.created_at)
        .fetch_one(self.conn()?)
        .await?;

        wager_from_row(&row)
    }

    async fn lock_wager(&mut self, wager_id: WagerId) -> StoreResult<Option<Wager>> {
        let lock_timeout = self.lock_timeout;
        let row = sqlx::query(&format!(
            "SELECT {WAGER_COLUMNS} FROM wagers WHERE id = $1 FOR UPDATE"
        ))
        .bind(wager_id)
        .fetch_optional(self.conn()?)
        .await
        .map_err(|e| lock_error(e, lock_timeout))?;

        row.as_ref().map(wager_from_row).transpose()
    }

    async fn find_wager(&mut self, wager_id: WagerId) -> StoreResult<Option<Wager>> {
        let row = sqlx::query(&format!("SELECT {WAGER_COLUMNS} FROM wagers WHERE id = $1"))
            .bind(wager_id)
            .fetch_optional(self.conn()?)
            .await?;

        row.as_ref().map(wager_from_row).transpose()
    }

    async fn update_wager(&mut self, wager: &Wager) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE wagers
            SET status = $2, outcome = $3, settlement_note = $4, settled_by = $5, settled_at = $6
            WHERE id = $1
            "#,
        )
        .bind(wager.id)
        .bind(wager.status.to_string())
        .bind(&wager.outcome)
        .bind(&wager.settlement_note)
        .bind(wager.settled_by)
        .bind(wager.settled_at)
        .execute(self.conn()?)
        .await?;

        if result.rows_affected() == 0 {
            return Err(corrupt(format!("wager {} vanished", wager.id)));
        }
        Ok(())
    }

    async fn overdue_wagers(&mut self, now: DateTime<Utc>) -> StoreResult<Vec<WagerId>> {
        let rows = sqlx::query(
            "SELECT id FROM wagers WHERE status = 'open' AND deadline <= $1 ORDER BY id",
        )
        .bind(now)
        .fetch_all(self.conn()?)
        .await?;

        rows.iter()
            .map(|row| row.try_get("id").map_err(StoreError::from))
            .collect()
    }

    async fn insert_entry(&mut self, entry: NewWagerEntry) -> StoreResult<WagerEntry> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO wager_entries (wager_id, user_id, group_id, answer_value, points_wagered, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {ENTRY_COLUMNS}
            "#
        ))
        .bind(entry.wager_id)
        .bind(entry.user_id)
        .bind(entry.group_id)
        .bind(&entry.answer_value)
        .bind(entry.points_wagered)
        .bind(entry.created_at)
        .fetch_one(self.conn()?)
        .await
        .map_err(|e| {
            write_error(
                e,
                &format!("user {} already joined wager {}", entry.user_id, entry.wager_id),
            )
        })?;

        entry_from_row(&row)
    }

    async fn find_entry(
        &mut self,
        wager_id: WagerId,
        user_id: UserId,
    ) -> StoreResult<Option<WagerEntry>> {
        let row = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM wager_entries WHERE wager_id = $1 AND user_id = $2"
        ))
        .bind(wager_id)
        .bind(user_id)
        .fetch_optional(self.conn()?)
        .await?;

        row.as_ref().map(entry_from_row).transpose()
    }

    async fn wager_entries(&mut self, wager_id: WagerId) -> StoreResult<Vec<WagerEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM wager_entries WHERE wager_id = $1 ORDER BY id"
        ))
        .bind(wager_id)
        .fetch_all(self.conn()?)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }

    async fn update_entry_result(
        &mut self,
        entry_id: EntryId,
        is_winner: Option<bool>,
        points_won: i64,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE wager_entries SET is_winner = $2, points_won = $3 WHERE id = $1")
            .bind(entry_id)
            .bind(is_winner)
            .bind(points_won)
            .execute(self.conn()?)
            .await?;
        Ok(())
    }

    async fn insert_token(&mut self, token: NewToken) -> StoreResult<OneTimeToken> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO one_time_tokens (token_hash, kind, wager_id, owner_id, context, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {TOKEN_COLUMNS}
            "#
        ))
        .bind(&token.token_hash)
        .bind(token.kind.to_string())
        .bind(token.wager_id)
        .bind(token.owner_id)
        .bind(serde_json::to_value(&token.context)?)
        .bind(token.expires_at)
        .bind(token.created_at)
        .fetch_one(self.conn()?)
        .await
        .map_err(|e| write_error(e, "token hash"))?;

        token_from_row(&row)
    }

    async fn lock_token(&mut self, token_hash: &str) -> StoreResult<Option<OneTimeToken>> {
        let lock_timeout = self.lock_timeout;
        let row = sqlx::query(&format!(
            "SELECT {TOKEN_COLUMNS} FROM one_time_tokens WHERE token_hash = $1 FOR UPDATE"
        ))
        .bind(token_hash)
        .fetch_optional(self.conn()?)
        .await
        .map_err(|e| lock_error(e, lock_timeout))?;

        row.as_ref().map(token_from_row).transpose()
    }

    async fn find_token(&mut self, token_hash: &str) -> StoreResult<Option<OneTimeToken>> {
        let row = sqlx::query(&format!(
            "SELECT {TOKEN_COLUMNS} FROM one_time_tokens WHERE token_hash = $1"
        ))
        .bind(token_hash)
        .fetch_optional(self.conn()?)
        .await?;

        row.as_ref().map(token_from_row).transpose()
    }

    async fn mark_token_used(
        &mut self,
        token_id: TokenId,
        used_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE one_time_tokens SET used_at = $2 WHERE id = $1")
            .bind(token_id)
            .bind(used_at)
            .execute(self.conn()?)
            .await?;
        Ok(())
    }

    async fn wager_tokens(&mut self, wager_id: WagerId) -> StoreResult<Vec<OneTimeToken>> {
        let rows = sqlx::query(&format!(
            "SELECT {TOKEN_COLUMNS} FROM one_time_tokens WHERE wager_id = $1 ORDER BY id"
        ))
        .bind(wager_id)
        .fetch_all(self.conn()?)
        .await?;

        rows.iter().map(token_from_row).collect()
    }

    async fn revoke_wager_tokens(
        &mut self,
        wager_id: WagerId,
        at: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE one_time_tokens
            SET used_at = $2
            WHERE wager_id = $1 AND used_at IS NULL AND expires_at > $2
            "#,
        )
        .bind(wager_id)
        .bind(at)
        .execute(self.conn()?)
        .await?;

        Ok(result.rows_affected())
    }

    async fn audit_chain_head(&mut self) -> StoreResult<Option<String>> {
        self.advisory_lock("audit_chain".to_string()).await?;
        let row = sqlx::query("SELECT entry_hash FROM audit_log ORDER BY id DESC LIMIT 1")
            .fetch_optional(self.conn()?)
            .await?;

        row.map(|r| r.try_get("entry_hash"))
            .transpose()
            .map_err(StoreError::from)
    }

    async fn insert_audit(&mut self, entry: NewAuditLogEntry) -> StoreResult<AuditLogEntry> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO audit_log (action, actor_id, subject_type, subject_id, metadata, prev_hash, entry_hash, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {AUDIT_COLUMNS}
            "#
        ))
        .bind(&entry.action)
        .bind(entry.actor_id)
        .bind(entry.subject.map(|s| s.subject_type()))
        .bind(entry.subject.map(|s| s.subject_id()))
        .bind(&entry.metadata)
        .bind(&entry.prev_hash)
        .bind(&entry.entry_hash)
        .bind(entry.created_at)
        .fetch_one(self.conn()?)
        .await?;

        audit_from_row(&row)
    }

    async fn audit_entries(
        &mut self,
        subject: Option<AuditSubject>,
        limit: i64,
    ) -> StoreResult<Vec<AuditLogEntry>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {AUDIT_COLUMNS} FROM (
                SELECT {AUDIT_COLUMNS}
                FROM audit_log
                WHERE ($1::TEXT IS NULL OR (subject_type = $1 AND subject_id = $2))
                ORDER BY id DESC
                LIMIT $3
            ) recent
            ORDER BY id ASC
            "#
        ))
        .bind(subject.map(|s| s.subject_type()))
        .bind(subject.map(|s| s.subject_id()))
        .bind(limit)
        .fetch_all(self.conn()?)
        .await?;

        rows.iter().map(audit_from_row).collect()
    }
}

/// Membership lookup against the `group_members` table
#[derive(Clone)]
pub struct PgMembership {
    pool: PgPool,
}

impl PgMembership {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MembershipResolver for PgMembership {
    async fn is_member(&self, user_id: UserId, group_id: GroupId) -> StoreResult<bool> {
        let row = sqlx::query("SELECT 1 FROM group_members WHERE group_id = $1 AND user_id = $2")
            .bind(group_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}
