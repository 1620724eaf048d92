//! Point ledger: append-only movements with derived balances.
//!
//! A balance is never stored. It is the sum of the account's
//! [`LedgerTransaction`] amounts, so it cannot drift from its history.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use wager_engine::clock::SystemClock;
//! use wager_engine::ledger::{LedgerConfig, PointAccount, PointLedger};
//! use wager_engine::store::{MemoryStore, Store};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MemoryStore::new();
//! let ledger = PointLedger::new(LedgerConfig::default(), Arc::new(SystemClock));
//! let account = PointAccount::new(1, 100);
//!
//! let mut unit = store.begin().await?;
//! ledger.initialize_balance(unit.as_mut(), account).await?;
//! unit.commit().await?;
//!
//! let mut unit = store.begin().await?;
//! assert_eq!(ledger.get_balance(unit.as_mut(), account).await?, 1000);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod errors;
pub mod manager;
pub mod models;

pub use config::{DecayPolicy, LedgerConfig};
pub use errors::{LedgerError, LedgerResult};
pub use manager::PointLedger;
pub use models::{
    LedgerTransaction, NewLedgerTransaction, PointAccount, TransactionKind, WagerLink, keys,
};
