//! Settlement engine: the operations callers invoke.
//!
//! Each public method is one atomic unit: `begin`, do the work, `commit`. An
//! error anywhere before the commit drops the unit, and with it every write the
//! operation made. Locks are taken wager first, then token, then accounts in
//! ascending order.

use super::config::EngineConfig;
use super::plan::{EntryOutcome, settle_entries};
use crate::audit::{
    AuditLogEntry, AuditPolicy, AuditRecord, AuditSubject, AuditTrail, actions, verify_chain,
    verify_chain_to,
};
use crate::clock::Clock;
use crate::ids::{GroupId, UserId, WagerId};
use crate::ledger::{LedgerTransaction, PointAccount, PointLedger, TransactionKind, WagerLink};
use crate::store::{AtomicUnit, MembershipResolver, Store, StoreError};
use crate::token::{IssuedToken, OneTimeToken, TokenAuthority, TokenKind, TokenRequest};
use crate::wager::{
    NewWager, NewWagerEntry, Wager, WagerAction, WagerDraft, WagerEntry, WagerError, WagerResult,
    WagerStatus, next_status,
};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Orchestrates wagers, the point ledger, tokens and the audit trail
#[derive(Clone)]
pub struct SettlementEngine {
    store: Arc<dyn Store>,
    members: Arc<dyn MembershipResolver>,
    clock: Arc<dyn Clock>,
    ledger: PointLedger,
    tokens: TokenAuthority,
    audit: AuditTrail,
    config: EngineConfig,
}

impl SettlementEngine {
    /// Create a new settlement engine
    ///
    /// # Arguments
    ///
    /// * `store` - Storage backend providing atomic units
    /// * `members` - Group membership lookup
    /// * `clock` - Time source for deadlines, expiry and decay
    /// * `config` - Payout, audit, token and ledger policy
    pub fn new(
        store: Arc<dyn Store>,
        members: Arc<dyn MembershipResolver>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            ledger: PointLedger::new(config.ledger.clone(), clock.clone()),
            tokens: TokenAuthority::new(clock.clone(), config.token_ttl_hours),
            audit: AuditTrail::new(clock.clone()),
            store,
            members,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ----- wagers -----

    /// Create an open wager in `group_id`
    ///
    /// # Errors
    ///
    /// * `WagerError::NotGroupMember` - Creator is not in the group
    /// * `WagerError::InvalidWager` - Question, stake, deadline or options rejected
    pub async fn create_wager(
        &self,
        group_id: GroupId,
        creator_id: UserId,
        draft: WagerDraft,
    ) -> WagerResult<Wager> {
        self.require_member(creator_id, group_id).await?;
        let now = self.clock.now();
        draft.validate(now)?;

        let mut unit = self.store.begin().await?;
        let wager = unit
            .insert_wager(NewWager {
                group_id,
                creator_id,
                question: draft.question.trim().to_string(),
                options: draft.options,
                stake: draft.stake,
                deadline: draft.deadline,
                created_at: now,
            })
            .await?;

        let record = AuditRecord::new(
            actions::WAGER_CREATED,
            Some(AuditSubject::Wager(wager.id)),
            Some(creator_id),
        )
        .with_metadata(json!({
            "group_id": group_id,
            "type": wager.wager_type(),
            "stake": wager.stake,
            "deadline": wager.deadline,
        }));
        self.commit_with_audit(unit, vec![record]).await?;

        log::info!(
            "Wager {} created in group {} by user {}",
            wager.id,
            group_id,
            creator_id
        );
        Ok(wager)
    }

    /// Join a wager: validate the answer, deduct the stake and record the entry
    ///
    /// # Errors
    ///
    /// * `WagerError::WagerNotOpen` / `WagerError::DeadlinePassed` - Entries closed
    /// * `WagerError::InvalidAnswer` - Answer fails the wager's type rules
    /// * `WagerError::InvalidStake` - Points differ from the fixed stake
    /// * `WagerError::UserAlreadyJoined` - User already has an entry
    /// * `WagerError::InsufficientFunds` - Balance below the stake
    pub async fn place_wager(
        &self,
        wager_id: WagerId,
        user_id: UserId,
        answer: &str,
        points: i64,
    ) -> WagerResult<WagerEntry> {
        // Resolved before the unit opens so no connection is held while the
        // resolver runs. A wager's group never changes.
        let group_id = self.get_wager(wager_id).await?.group_id;
        self.require_member(user_id, group_id).await?;

        let mut unit = self.store.begin().await?;
        let wager = lock_existing(unit.as_mut(), wager_id).await?;
        next_status(&wager, WagerAction::Join)?;
        let now = self.clock.now();
        if now >= wager.deadline {
            return Err(WagerError::DeadlinePassed {
                wager_id,
                deadline: wager.deadline,
            });
        }

        let answer = wager.options.parse_answer(answer)?;
        if points <= 0 {
            return Err(WagerError::InvalidAmount(points));
        }
        if let Some(stake) = wager.stake
            && stake != points
        {
            return Err(WagerError::InvalidStake {
                expected: stake,
                got: points,
            });
        }

        if unit.find_entry(wager_id, user_id).await?.is_some() {
            return Err(WagerError::UserAlreadyJoined { wager_id, user_id });
        }
        let entry = match unit
            .insert_entry(NewWagerEntry {
                wager_id,
                user_id,
                group_id: wager.group_id,
                answer_value: answer.encode(),
                points_wagered: points,
                created_at: now,
            })
            .await
        {
            Ok(entry) => entry,
            Err(StoreError::Conflict(_)) => {
                return Err(WagerError::UserAlreadyJoined { wager_id, user_id });
            }
            Err(e) => return Err(e.into()),
        };

        let account = PointAccount::new(user_id, wager.group_id);
        self.ledger
            .deduct(
                unit.as_mut(),
                account,
                points,
                TransactionKind::Stake,
                Some(WagerLink::entry(wager_id, entry.id)),
            )
            .await?;

        let record = AuditRecord::new(
            actions::WAGER_JOINED,
            Some(AuditSubject::Entry(entry.id)),
            Some(user_id),
        )
        .with_metadata(json!({
            "wager_id": wager_id,
            "answer": entry.answer_value,
            "points": points,
        }));
        self.commit_with_audit(unit, vec![record]).await?;

        log::info!("User {user_id} joined wager {wager_id} with {points} points");
        Ok(entry)
    }

    /// Close a wager to new entries
    ///
    /// # Errors
    ///
    /// * `WagerError::InvalidWagerTransition` - Wager is not open
    pub async fn lock_wager(
        &self,
        wager_id: WagerId,
        actor_id: Option<UserId>,
    ) -> WagerResult<Wager> {
        let mut unit = self.store.begin().await?;
        let mut wager = lock_existing(unit.as_mut(), wager_id).await?;
        wager.status = next_status(&wager, WagerAction::Lock)?;
        unit.update_wager(&wager).await?;

        let record = AuditRecord::new(
            actions::WAGER_LOCKED,
            Some(AuditSubject::Wager(wager_id)),
            actor_id,
        );
        self.commit_with_audit(unit, vec![record]).await?;

        log::info!("Wager {wager_id} locked");
        Ok(wager)
    }

    /// Declare the outcome, pay winners and retire outstanding tokens
    ///
    /// # Errors
    ///
    /// * `WagerError::WagerAlreadySettled` - Wager is settled or cancelled
    /// * `WagerError::InvalidAnswer` - Outcome is malformed for the wager type
    pub async fn settle_wager(
        &self,
        wager_id: WagerId,
        outcome: &str,
        note: Option<String>,
        settler_id: Option<UserId>,
    ) -> WagerResult<Wager> {
        let mut unit = self.store.begin().await?;
        let wager = lock_existing(unit.as_mut(), wager_id).await?;
        let (wager, record) = self
            .settle_locked(unit.as_mut(), wager, outcome, note, settler_id)
            .await?;
        self.commit_with_audit(unit, vec![record]).await?;
        Ok(wager)
    }

    /// Consume a settle token and settle with the outcome it carries
    ///
    /// The token is only consumed if the settlement succeeds.
    ///
    /// # Errors
    ///
    /// * `WagerError::InvalidToken` - Token expired, already used or unknown
    /// * `WagerError::WrongTokenKind` - Not a settle token
    /// * `WagerError::MissingTokenContext` - Token lacks a wager or outcome
    /// * `WagerError::WagerAlreadySettled` - Wager settled through another path
    pub async fn settle_with_token(&self, token: &str) -> WagerResult<Wager> {
        let mut unit = self.store.begin().await?;
        let peeked = self.tokens.verify(unit.as_mut(), token).await?;
        let wager_id = token_wager(&peeked, TokenKind::Settle)?;

        let wager = lock_existing(unit.as_mut(), wager_id).await?;
        let consumed = self.tokens.consume(unit.as_mut(), token).await?;
        let outcome = consumed
            .context
            .outcome
            .clone()
            .ok_or(WagerError::MissingTokenContext("outcome"))?;
        let settler_id = consumed.context.issuer_id.or(consumed.owner_id);

        let (wager, settled) = self
            .settle_locked(
                unit.as_mut(),
                wager,
                &outcome,
                consumed.context.note.clone(),
                settler_id,
            )
            .await?;
        let used = AuditRecord::new(
            actions::TOKEN_CONSUMED,
            Some(AuditSubject::Token(consumed.id)),
            settler_id,
        )
        .with_metadata(json!({ "kind": consumed.kind, "wager_id": wager_id }));
        self.commit_with_audit(unit, vec![used, settled]).await?;
        Ok(wager)
    }

    /// Consume a dispute token against a settled wager
    ///
    /// A dispute changes no balances; its audit entry is written in the same
    /// unit whatever the audit policy.
    pub async fn file_dispute(
        &self,
        token: &str,
        reason: Option<String>,
    ) -> WagerResult<AuditLogEntry> {
        let mut unit = self.store.begin().await?;
        let peeked = self.tokens.verify(unit.as_mut(), token).await?;
        let wager_id = token_wager(&peeked, TokenKind::Dispute)?;

        let wager = lock_existing(unit.as_mut(), wager_id).await?;
        if wager.status != WagerStatus::Settled {
            return Err(WagerError::InvalidWagerTransition {
                wager_id,
                from: wager.status,
                action: "dispute",
            });
        }

        let consumed = self.tokens.consume(unit.as_mut(), token).await?;
        let actor_id = consumed.owner_id.or(consumed.context.issuer_id);
        let entry = self
            .audit
            .record(
                unit.as_mut(),
                AuditRecord::new(
                    actions::WAGER_DISPUTED,
                    Some(AuditSubject::Wager(wager_id)),
                    actor_id,
                )
                .with_metadata(json!({
                    "token_id": consumed.id,
                    "outcome": wager.outcome,
                    "reason": reason,
                })),
            )
            .await?;
        unit.commit().await?;

        log::warn!("Wager {wager_id} disputed by {actor_id:?}");
        Ok(entry)
    }

    /// Call off a wager and refund every stake
    ///
    /// # Errors
    ///
    /// * `WagerError::WagerAlreadySettled` - Wager is settled or cancelled
    pub async fn cancel_wager(
        &self,
        wager_id: WagerId,
        actor_id: Option<UserId>,
    ) -> WagerResult<Wager> {
        let mut unit = self.store.begin().await?;
        let mut wager = lock_existing(unit.as_mut(), wager_id).await?;
        let status = next_status(&wager, WagerAction::Cancel)?;

        let entries = unit.wager_entries(wager_id).await?;
        lock_accounts(unit.as_mut(), &entries).await?;
        let mut refunded = 0;
        for entry in &entries {
            self.refund_entry(unit.as_mut(), entry).await?;
            refunded += entry.points_wagered;
        }

        wager.status = status;
        unit.update_wager(&wager).await?;
        let tokens_invalidated = self.tokens.invalidate_all(unit.as_mut(), wager_id).await?;

        let record = AuditRecord::new(
            actions::WAGER_CANCELLED,
            Some(AuditSubject::Wager(wager_id)),
            actor_id,
        )
        .with_metadata(json!({
            "entries": entries.len(),
            "refunded": refunded,
            "tokens_invalidated": tokens_invalidated,
        }));
        self.commit_with_audit(unit, vec![record]).await?;

        log::info!(
            "Wager {wager_id} cancelled, refunded {refunded} points over {} entries",
            entries.len()
        );
        Ok(wager)
    }

    /// Lock every open wager whose deadline has passed
    pub async fn lock_expired_wagers(&self) -> WagerResult<Vec<Wager>> {
        let now = self.clock.now();
        let overdue = {
            let mut unit = self.store.begin().await?;
            unit.overdue_wagers(now).await?
        };

        let mut locked = Vec::with_capacity(overdue.len());
        for wager_id in overdue {
            let mut unit = self.store.begin().await?;
            let Some(mut wager) = unit.lock_wager(wager_id).await? else {
                continue;
            };
            // Another caller may have moved it since the scan
            if wager.status != WagerStatus::Open || wager.deadline > now {
                continue;
            }

            wager.status = WagerStatus::Locked;
            unit.update_wager(&wager).await?;
            let record = AuditRecord::new(
                actions::WAGER_LOCKED,
                Some(AuditSubject::Wager(wager_id)),
                None,
            )
            .with_metadata(json!({ "reason": "deadline" }));
            self.commit_with_audit(unit, vec![record]).await?;
            locked.push(wager);
        }

        if !locked.is_empty() {
            log::info!("Locked {} wagers past their deadline", locked.len());
        }
        Ok(locked)
    }

    pub async fn get_wager(&self, wager_id: WagerId) -> WagerResult<Wager> {
        let mut unit = self.store.begin().await?;
        unit.find_wager(wager_id)
            .await?
            .ok_or(WagerError::WagerNotFound(wager_id))
    }

    /// Entries of a wager in join order
    pub async fn wager_entries(&self, wager_id: WagerId) -> WagerResult<Vec<WagerEntry>> {
        let mut unit = self.store.begin().await?;
        if unit.find_wager(wager_id).await?.is_none() {
            return Err(WagerError::WagerNotFound(wager_id));
        }
        Ok(unit.wager_entries(wager_id).await?)
    }

    // ----- ledger -----

    /// Balance of a group member
    ///
    /// # Errors
    ///
    /// * `WagerError::NotGroupMember` - User is not in the group
    pub async fn get_balance(&self, user_id: UserId, group_id: GroupId) -> WagerResult<i64> {
        self.require_member(user_id, group_id).await?;
        let mut unit = self.store.begin().await?;
        let balance = self
            .ledger
            .get_balance(unit.as_mut(), PointAccount::new(user_id, group_id))
            .await?;
        Ok(balance)
    }

    /// Grant the starting balance; `None` if it was already granted
    pub async fn initialize_balance(
        &self,
        user_id: UserId,
        group_id: GroupId,
    ) -> WagerResult<Option<LedgerTransaction>> {
        self.require_member(user_id, group_id).await?;
        let mut unit = self.store.begin().await?;
        let Some(grant) = self
            .ledger
            .initialize_balance(unit.as_mut(), PointAccount::new(user_id, group_id))
            .await?
        else {
            return Ok(None);
        };

        let record = AuditRecord::new(
            actions::BALANCE_INITIALIZED,
            Some(AuditSubject::Transaction(grant.id)),
            Some(user_id),
        )
        .with_metadata(json!({ "group_id": group_id, "amount": grant.amount }));
        self.commit_with_audit(unit, vec![record]).await?;

        log::info!(
            "Granted {} starting points to user {user_id} in group {group_id}",
            grant.amount
        );
        Ok(Some(grant))
    }

    /// Apply the inactivity decay policy to one account
    pub async fn apply_decay(
        &self,
        user_id: UserId,
        group_id: GroupId,
    ) -> WagerResult<Option<LedgerTransaction>> {
        let mut unit = self.store.begin().await?;
        let Some(decay) = self
            .ledger
            .apply_decay(unit.as_mut(), PointAccount::new(user_id, group_id))
            .await?
        else {
            return Ok(None);
        };

        let record = AuditRecord::new(
            actions::BALANCE_DECAYED,
            Some(AuditSubject::Transaction(decay.id)),
            None,
        )
        .with_metadata(json!({
            "user_id": user_id,
            "group_id": group_id,
            "amount": decay.amount,
        }));
        self.commit_with_audit(unit, vec![record]).await?;

        log::info!(
            "Decayed user {user_id} in group {group_id} by {}",
            -decay.amount
        );
        Ok(Some(decay))
    }

    /// Apply decay to every account with ledger history
    pub async fn decay_idle_accounts(&self) -> WagerResult<Vec<LedgerTransaction>> {
        let accounts = {
            let mut unit = self.store.begin().await?;
            unit.ledger_accounts().await?
        };

        let mut applied = Vec::new();
        for account in accounts {
            if let Some(decay) = self.apply_decay(account.user_id, account.group_id).await? {
                applied.push(decay);
            }
        }
        Ok(applied)
    }

    /// Most recent ledger transactions of a member, newest first
    pub async fn ledger_history(
        &self,
        user_id: UserId,
        group_id: GroupId,
        limit: i64,
    ) -> WagerResult<Vec<LedgerTransaction>> {
        self.require_member(user_id, group_id).await?;
        let mut unit = self.store.begin().await?;
        let history = self
            .ledger
            .history(unit.as_mut(), PointAccount::new(user_id, group_id), limit)
            .await?;
        Ok(history)
    }

    // ----- tokens -----

    /// Issue a one-time token
    ///
    /// Settle tokens are checked up front: the wager must be unsettled and the
    /// carried outcome well-formed, so a link never promises what settlement
    /// would refuse. A wager named only in the context is copied to the token
    /// row so listing and revocation see it.
    ///
    /// # Errors
    ///
    /// * `WagerError::InvalidRequest` - Token and context name different wagers
    pub async fn issue_token(&self, mut request: TokenRequest) -> WagerResult<IssuedToken> {
        let wager_id = match (request.wager_id, request.context.wager_id) {
            (Some(row), Some(context)) if row != context => {
                return Err(WagerError::InvalidRequest(format!(
                    "token names wager {row} but its context names wager {context}"
                )));
            }
            (row, context) => row.or(context),
        };
        request.wager_id = wager_id;
        request.context.wager_id = wager_id;

        let mut unit = self.store.begin().await?;
        if let Some(wager_id) = wager_id {
            let wager = unit
                .find_wager(wager_id)
                .await?
                .ok_or(WagerError::WagerNotFound(wager_id))?;
            if request.kind == TokenKind::Settle {
                next_status(&wager, WagerAction::Settle)?;
                let outcome = request
                    .context
                    .outcome
                    .as_deref()
                    .ok_or(WagerError::MissingTokenContext("outcome"))?;
                wager.options.parse_outcome(outcome)?;
            }
        }

        let issued = self.tokens.issue(unit.as_mut(), request).await?;
        let record = AuditRecord::new(
            actions::TOKEN_ISSUED,
            Some(AuditSubject::Token(issued.record.id)),
            issued.record.context.issuer_id.or(issued.record.owner_id),
        )
        .with_metadata(json!({
            "kind": issued.record.kind,
            "wager_id": issued.record.wager_id,
            "expires_at": issued.record.expires_at,
        }));
        self.commit_with_audit(unit, vec![record]).await?;
        Ok(issued)
    }

    /// Check a token without consuming it
    pub async fn verify_token(&self, token: &str) -> WagerResult<OneTimeToken> {
        let mut unit = self.store.begin().await?;
        Ok(self.tokens.verify(unit.as_mut(), token).await?)
    }

    /// Consume a token; a second consumption fails with `AlreadyUsed`
    pub async fn consume_token(&self, token: &str) -> WagerResult<OneTimeToken> {
        let mut unit = self.store.begin().await?;
        let consumed = self.tokens.consume(unit.as_mut(), token).await?;
        let record = AuditRecord::new(
            actions::TOKEN_CONSUMED,
            Some(AuditSubject::Token(consumed.id)),
            consumed.owner_id,
        )
        .with_metadata(json!({ "kind": consumed.kind, "wager_id": consumed.wager_id }));
        self.commit_with_audit(unit, vec![record]).await?;
        Ok(consumed)
    }

    pub async fn list_active_tokens(&self, wager_id: WagerId) -> WagerResult<Vec<OneTimeToken>> {
        let mut unit = self.store.begin().await?;
        Ok(self.tokens.list_active(unit.as_mut(), wager_id).await?)
    }

    /// Retire every outstanding token for a wager
    pub async fn invalidate_all_tokens(&self, wager_id: WagerId) -> WagerResult<u64> {
        let mut unit = self.store.begin().await?;
        let revoked = self.tokens.invalidate_all(unit.as_mut(), wager_id).await?;
        if revoked == 0 {
            return Ok(0);
        }

        let record = AuditRecord::new(
            actions::TOKENS_INVALIDATED,
            Some(AuditSubject::Wager(wager_id)),
            None,
        )
        .with_metadata(json!({ "count": revoked }));
        self.commit_with_audit(unit, vec![record]).await?;
        Ok(revoked)
    }

    // ----- audit -----

    /// Append a caller-defined audit entry
    pub async fn record(
        &self,
        action: &str,
        subject: Option<AuditSubject>,
        metadata: serde_json::Value,
        actor_id: Option<UserId>,
    ) -> WagerResult<AuditLogEntry> {
        let mut unit = self.store.begin().await?;
        let entry = self
            .audit
            .record(
                unit.as_mut(),
                AuditRecord::new(action, subject, actor_id).with_metadata(metadata),
            )
            .await?;
        unit.commit().await?;
        Ok(entry)
    }

    /// The most recent `limit` audit entries, oldest first, optionally for one subject
    pub async fn audit_log(
        &self,
        subject: Option<AuditSubject>,
        limit: i64,
    ) -> WagerResult<Vec<AuditLogEntry>> {
        let mut unit = self.store.begin().await?;
        Ok(unit.audit_entries(subject, limit.max(0)).await?)
    }

    /// Recompute the whole audit hash chain
    ///
    /// # Errors
    ///
    /// * `WagerError::AuditChainBroken` - An entry was edited, removed or reordered
    pub async fn verify_audit_chain(&self) -> WagerResult<usize> {
        let entries = self.audit_log(None, i64::MAX).await?;
        verify_chain(&entries)?;
        Ok(entries.len())
    }

    /// Hash of the newest audit entry, for keeping outside the log
    pub async fn audit_head(&self) -> WagerResult<Option<String>> {
        let mut unit = self.store.begin().await?;
        Ok(unit.audit_chain_head().await?)
    }

    /// [`Self::verify_audit_chain`], also requiring the log to still contain
    /// `expected_head` as returned by [`Self::audit_head`]
    ///
    /// # Errors
    ///
    /// * `WagerError::AuditChainBroken` - Tampering, or newer entries were removed
    pub async fn verify_audit_chain_to(&self, expected_head: &str) -> WagerResult<usize> {
        let entries = self.audit_log(None, i64::MAX).await?;
        verify_chain_to(&entries, expected_head)?;
        Ok(entries.len())
    }

    // ----- internals -----

    async fn require_member(&self, user_id: UserId, group_id: GroupId) -> WagerResult<()> {
        if self.members.is_member(user_id, group_id).await? {
            Ok(())
        } else {
            Err(WagerError::NotGroupMember { user_id, group_id })
        }
    }

    /// Settle a wager already locked in `unit`
    async fn settle_locked(
        &self,
        unit: &mut dyn AtomicUnit,
        mut wager: Wager,
        outcome: &str,
        note: Option<String>,
        settler_id: Option<UserId>,
    ) -> WagerResult<(Wager, AuditRecord)> {
        let status = next_status(&wager, WagerAction::Settle)?;
        let outcome = wager.options.parse_outcome(outcome)?;

        let entries = unit.wager_entries(wager.id).await?;
        lock_accounts(unit, &entries).await?;
        let decisions = settle_entries(
            &wager.options,
            &outcome,
            &entries,
            self.config.payout_policy,
        );

        let mut winners = 0;
        let mut paid_out = 0;
        for (entry, decision) in entries.iter().zip(decisions) {
            match decision {
                EntryOutcome::Win { payout } => {
                    self.award_winner(unit, entry, payout).await?;
                    winners += 1;
                    paid_out += payout;
                }
                EntryOutcome::Lose => self.record_loss(unit, entry).await?,
                EntryOutcome::Refund => self.refund_entry(unit, entry).await?,
            }
        }

        wager.status = status;
        wager.outcome = Some(outcome.encode());
        wager.settlement_note = note;
        wager.settled_by = settler_id;
        wager.settled_at = Some(self.clock.now());
        unit.update_wager(&wager).await?;

        let tokens_invalidated = self.tokens.invalidate_all(unit, wager.id).await?;

        let record = AuditRecord::new(
            actions::WAGER_SETTLED,
            Some(AuditSubject::Wager(wager.id)),
            settler_id,
        )
        .with_metadata(json!({
            "outcome": wager.outcome,
            "entries": entries.len(),
            "winners": winners,
            "paid_out": paid_out,
            "refunded": winners == 0 && !entries.is_empty(),
            "payout_policy": self.config.payout_policy,
            "tokens_invalidated": tokens_invalidated,
        }));

        log::info!(
            "Wager {} settled with outcome {:?}: {} of {} entries won {} points",
            wager.id,
            wager.outcome,
            winners,
            entries.len(),
            paid_out
        );
        Ok((wager, record))
    }

    async fn award_winner(
        &self,
        unit: &mut dyn AtomicUnit,
        entry: &WagerEntry,
        payout: i64,
    ) -> WagerResult<()> {
        self.ledger
            .award(
                unit,
                PointAccount::new(entry.user_id, entry.group_id),
                payout,
                TransactionKind::Payout,
                Some(WagerLink::entry(entry.wager_id, entry.id)),
            )
            .await?;
        unit.update_entry_result(entry.id, Some(true), payout).await?;
        Ok(())
    }

    async fn record_loss(
        &self,
        unit: &mut dyn AtomicUnit,
        entry: &WagerEntry,
    ) -> WagerResult<()> {
        self.ledger
            .record_loss(
                unit,
                PointAccount::new(entry.user_id, entry.group_id),
                entry.points_wagered,
                WagerLink::entry(entry.wager_id, entry.id),
            )
            .await?;
        unit.update_entry_result(entry.id, Some(false), 0).await?;
        Ok(())
    }

    async fn refund_entry(
        &self,
        unit: &mut dyn AtomicUnit,
        entry: &WagerEntry,
    ) -> WagerResult<()> {
        self.ledger
            .refund(
                unit,
                PointAccount::new(entry.user_id, entry.group_id),
                entry.points_wagered,
                WagerLink::entry(entry.wager_id, entry.id),
            )
            .await?;
        unit.update_entry_result(entry.id, None, 0).await?;
        Ok(())
    }

    /// Commit `unit`, writing `records` according to the audit policy
    async fn commit_with_audit(
        &self,
        mut unit: Box<dyn AtomicUnit>,
        records: Vec<AuditRecord>,
    ) -> WagerResult<()> {
        match self.config.audit_policy {
            AuditPolicy::Strict => {
                for record in records {
                    self.audit.record(unit.as_mut(), record).await?;
                }
                unit.commit().await?;
            }
            AuditPolicy::BestEffort => {
                unit.commit().await?;
                drop(unit);
                if let Err(e) = self.write_detached(records).await {
                    log::warn!("Audit write failed after commit: {e}");
                }
            }
        }
        Ok(())
    }

    async fn write_detached(&self, records: Vec<AuditRecord>) -> WagerResult<()> {
        let mut unit = self.store.begin().await?;
        for record in records {
            self.audit.record(unit.as_mut(), record).await?;
        }
        unit.commit().await?;
        Ok(())
    }
}

async fn lock_existing(unit: &mut dyn AtomicUnit, wager_id: WagerId) -> WagerResult<Wager> {
    unit.lock_wager(wager_id)
        .await?
        .ok_or(WagerError::WagerNotFound(wager_id))
}

/// Take every entrant's account lock in a fixed order
async fn lock_accounts(unit: &mut dyn AtomicUnit, entries: &[WagerEntry]) -> WagerResult<()> {
    let accounts: BTreeSet<PointAccount> = entries
        .iter()
        .map(|e| PointAccount::new(e.user_id, e.group_id))
        .collect();
    for account in accounts {
        unit.lock_account(account).await?;
    }
    Ok(())
}

/// Wager a token is bound to, once its kind is confirmed
fn token_wager(token: &OneTimeToken, expected: TokenKind) -> WagerResult<WagerId> {
    if token.kind != expected {
        return Err(WagerError::WrongTokenKind {
            expected,
            got: token.kind,
        });
    }
    token
        .wager_id
        .or(token.context.wager_id)
        .ok_or(WagerError::MissingTokenContext("wager id"))
}
