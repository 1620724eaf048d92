//! Point ledger over an atomic storage unit.
//!
//! Every method works inside the caller's [`AtomicUnit`]; nothing is visible to
//! other units until the caller commits. Balance checks take the account lock
//! first, so a check and the append that follows it are one indivisible step.

use super::{
    config::LedgerConfig,
    errors::{LedgerError, LedgerResult},
    models::{LedgerTransaction, NewLedgerTransaction, PointAccount, TransactionKind, WagerLink, keys},
};
use crate::clock::Clock;
use crate::store::{AtomicUnit, StoreError};
use std::sync::Arc;

/// Append-only point ledger
#[derive(Clone)]
pub struct PointLedger {
    config: LedgerConfig,
    clock: Arc<dyn Clock>,
}

impl PointLedger {
    pub fn new(config: LedgerConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Current balance: the sum of every transaction for the account
    pub async fn get_balance(
        &self,
        unit: &mut dyn AtomicUnit,
        account: PointAccount,
    ) -> LedgerResult<i64> {
        Ok(unit.account_balance(account).await?)
    }

    /// Remove `amount` points from an account
    ///
    /// # Errors
    ///
    /// * `LedgerError::InvalidAmount` - Amount is not positive
    /// * `LedgerError::InsufficientFunds` - Balance is below `amount`
    /// * `LedgerError::DuplicateTransaction` - The linked entry already has this movement
    pub async fn deduct(
        &self,
        unit: &mut dyn AtomicUnit,
        account: PointAccount,
        amount: i64,
        kind: TransactionKind,
        link: Option<WagerLink>,
    ) -> LedgerResult<LedgerTransaction> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }

        unit.lock_account(account).await?;
        let available = unit.account_balance(account).await?;
        if available < amount {
            return Err(LedgerError::InsufficientFunds {
                user_id: account.user_id,
                group_id: account.group_id,
                available,
                required: amount,
            });
        }

        let description = describe(kind, amount, link);
        self.append(unit, account, -amount, kind, link, description)
            .await
    }

    /// Credit `amount` points to an account
    pub async fn award(
        &self,
        unit: &mut dyn AtomicUnit,
        account: PointAccount,
        amount: i64,
        kind: TransactionKind,
        link: Option<WagerLink>,
    ) -> LedgerResult<LedgerTransaction> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }

        unit.lock_account(account).await?;
        let description = describe(kind, amount, link);
        self.append(unit, account, amount, kind, link, description)
            .await
    }

    /// Zero-amount record of a stake lost at settlement
    ///
    /// The stake itself left the balance at join time; this only makes the loss
    /// queryable.
    pub async fn record_loss(
        &self,
        unit: &mut dyn AtomicUnit,
        account: PointAccount,
        stake: i64,
        link: WagerLink,
    ) -> LedgerResult<LedgerTransaction> {
        unit.lock_account(account).await?;
        let description = format!("lost stake of {stake} on wager {}", link.wager_id);
        self.append(
            unit,
            account,
            0,
            TransactionKind::LossRecord,
            Some(link),
            description,
        )
        .await
    }

    /// Return a previously deducted stake
    pub async fn refund(
        &self,
        unit: &mut dyn AtomicUnit,
        account: PointAccount,
        amount: i64,
        link: WagerLink,
    ) -> LedgerResult<LedgerTransaction> {
        self.award(unit, account, amount, TransactionKind::Refund, Some(link))
            .await
    }

    /// Grant the starting balance once per account
    ///
    /// Returns `None` when the account already received its grant.
    pub async fn initialize_balance(
        &self,
        unit: &mut dyn AtomicUnit,
        account: PointAccount,
    ) -> LedgerResult<Option<LedgerTransaction>> {
        let amount = self.config.starting_points;
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }

        unit.lock_account(account).await?;
        if unit
            .find_transaction_by_key(&keys::initial_grant(account))
            .await?
            .is_some()
        {
            return Ok(None);
        }

        let transaction = self
            .append(
                unit,
                account,
                amount,
                TransactionKind::InitialGrant,
                None,
                format!("starting grant of {amount}"),
            )
            .await?;
        Ok(Some(transaction))
    }

    /// Apply the inactivity decay policy to one account
    ///
    /// Returns `None` for exempt users, active accounts, accounts without any
    /// history and balances already at the floor.
    pub async fn apply_decay(
        &self,
        unit: &mut dyn AtomicUnit,
        account: PointAccount,
    ) -> LedgerResult<Option<LedgerTransaction>> {
        let policy = &self.config.decay;
        if !policy.applies_to(account.user_id) {
            return Ok(None);
        }

        unit.lock_account(account).await?;
        let Some(latest) = unit.account_transactions(account, 1).await?.pop() else {
            return Ok(None);
        };
        let balance = unit.account_balance(account).await?;

        let Some(amount) = policy.decay_amount(balance, latest.created_at, self.clock.now()) else {
            return Ok(None);
        };

        let description = format!(
            "inactivity decay of {amount} ({}% of {balance}, floor {})",
            policy.rate_percent, policy.floor
        );
        let transaction = self
            .append(
                unit,
                account,
                -amount,
                TransactionKind::Decay,
                None,
                description,
            )
            .await?;
        Ok(Some(transaction))
    }

    /// Most recent transactions for an account, newest first
    pub async fn history(
        &self,
        unit: &mut dyn AtomicUnit,
        account: PointAccount,
        limit: i64,
    ) -> LedgerResult<Vec<LedgerTransaction>> {
        Ok(unit.account_transactions(account, limit.max(0)).await?)
    }

    async fn append(
        &self,
        unit: &mut dyn AtomicUnit,
        account: PointAccount,
        amount: i64,
        kind: TransactionKind,
        link: Option<WagerLink>,
        description: String,
    ) -> LedgerResult<LedgerTransaction> {
        let idempotency_key = idempotency_key(account, kind, link);
        let transaction = NewLedgerTransaction {
            account,
            amount,
            kind,
            link,
            idempotency_key: idempotency_key.clone(),
            description: Some(description),
            created_at: self.clock.now(),
        };

        match unit.insert_transaction(transaction).await {
            Ok(transaction) => {
                log::debug!("Ledger {kind} of {amount} for {account}");
                Ok(transaction)
            }
            Err(StoreError::Conflict(_)) => Err(LedgerError::DuplicateTransaction(
                idempotency_key.unwrap_or_default(),
            )),
            Err(e) => Err(e.into()),
        }
    }
}

/// Entry-linked movements get one stake and one closing key per entry
fn idempotency_key(
    account: PointAccount,
    kind: TransactionKind,
    link: Option<WagerLink>,
) -> Option<String> {
    let entry_id = link.and_then(|l| l.entry_id);
    match (kind, entry_id) {
        (TransactionKind::InitialGrant, _) => Some(keys::initial_grant(account)),
        (TransactionKind::Stake, Some(entry_id)) => Some(keys::stake(entry_id)),
        (
            TransactionKind::Payout | TransactionKind::LossRecord | TransactionKind::Refund,
            Some(entry_id),
        ) => Some(keys::close(entry_id)),
        _ => None,
    }
}

fn describe(kind: TransactionKind, amount: i64, link: Option<WagerLink>) -> String {
    match link {
        Some(link) => format!("{kind} of {amount} on wager {}", link.wager_id),
        None => format!("{kind} of {amount}"),
    }
}
