//! # Wager Engine
//!
//! Group wagers settled against an append-only point ledger.
//!
//! Members of a chat group create wagers, stake points from the group's point
//! economy, and a settler declares the outcome. The engine pays winners,
//! records losses, refunds void wagers and keeps a hash-chained audit trail of
//! everything it does. Settlement can also be triggered from an external
//! channel through single-use tokens.
//!
//! ## Architecture
//!
//! A wager moves through a small lifecycle:
//!
//! - **Open**: accepting entries until the deadline
//! - **Locked**: closed to entries, awaiting an outcome
//! - **Settled**: outcome declared, payouts made (terminal)
//! - **Cancelled**: called off, stakes refunded (terminal)
//!
//! Every state change and every point movement runs inside one storage
//! [`AtomicUnit`](store::AtomicUnit), so concurrent joins and settlements on
//! the same wager or balance never double-spend or double-pay.
//!
//! ## Core Modules
//!
//! - [`settlement`]: [`SettlementEngine`], the operations callers invoke
//! - [`ledger`]: point movements and derived balances
//! - [`wager`]: wager and entry types, answer validation, lifecycle rules
//! - [`token`]: single-use authorization tokens
//! - [`audit`]: tamper-evident audit trail
//! - [`store`]: persistence port with in-memory and PostgreSQL backends
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use wager_engine::{EngineConfig, MemberDirectory, MemoryStore, SettlementEngine, SystemClock};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), wager_engine::WagerError> {
//! let members = MemberDirectory::new();
//! members.add_member(7, 1).await;
//!
//! let engine = SettlementEngine::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(members),
//!     Arc::new(SystemClock),
//!     EngineConfig::default(),
//! );
//! engine.initialize_balance(1, 7).await?;
//! assert_eq!(engine.get_balance(1, 7).await?, 1000);
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod clock;
pub mod ids;
pub mod ledger;
pub mod settlement;
pub mod store;
pub mod token;
pub mod wager;

pub use audit::{AuditLogEntry, AuditPolicy, AuditSubject};
pub use clock::{Clock, ManualClock, SystemClock};
pub use ids::{AuditId, EntryId, GroupId, TokenId, TransactionId, UserId, WagerId};
pub use ledger::{LedgerConfig, LedgerTransaction, PointAccount, TransactionKind};
pub use settlement::{EngineConfig, PayoutPolicy, SettlementEngine};
pub use store::{Database, DatabaseConfig, MemberDirectory, MemoryStore, PgMembership, PgStore};
pub use token::{IssuedToken, OneTimeToken, TokenKind, TokenRequest};
pub use wager::{ErrorKind, Wager, WagerDraft, WagerEntry, WagerError, WagerOptions, WagerStatus};
