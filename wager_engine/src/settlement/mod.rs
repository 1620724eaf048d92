//! Wager settlement: the engine callers invoke, and the per-type algorithms
//! behind it.
//!
//! Binary and multiple-choice wagers share the categorical algorithm; numeric
//! and date wagers each have their own win rule. All of them feed the same
//! [`PayoutPolicy`] and the same win / lose / refund application.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use chrono::{Duration, Utc};
//! use wager_engine::clock::SystemClock;
//! use wager_engine::settlement::{EngineConfig, SettlementEngine};
//! use wager_engine::store::{MemberDirectory, MemoryStore};
//! use wager_engine::wager::{WagerDraft, WagerOptions};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let members = MemberDirectory::new();
//! members.add_member(1, 10).await;
//! members.add_member(1, 11).await;
//!
//! let engine = SettlementEngine::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(members),
//!     Arc::new(SystemClock),
//!     EngineConfig::default(),
//! );
//! engine.initialize_balance(10, 1).await?;
//! engine.initialize_balance(11, 1).await?;
//!
//! let wager = engine
//!     .create_wager(1, 10, WagerDraft {
//!         question: "Will it snow on Friday?".to_string(),
//!         options: WagerOptions::Binary,
//!         stake: Some(50),
//!         deadline: Utc::now() + Duration::days(2),
//!     })
//!     .await?;
//! engine.place_wager(wager.id, 10, "yes", 50).await?;
//! engine.place_wager(wager.id, 11, "no", 50).await?;
//! engine.settle_wager(wager.id, "yes", None, Some(10)).await?;
//!
//! assert_eq!(engine.get_balance(10, 1).await?, 1050);
//! assert_eq!(engine.get_balance(11, 1).await?, 950);
//! # Ok(())
//! # }
//! ```

mod categorical;
mod date;
mod numeric;
mod plan;

pub mod config;
pub mod engine;
pub mod payout;

pub use config::{DEFAULT_TOKEN_TTL_HOURS, EngineConfig};
pub use engine::SettlementEngine;
pub use payout::PayoutPolicy;

#[cfg(test)]
mod tests {
    use crate::wager::WagerEntry;
    use chrono::Utc;

    /// Unsettled entry on wager 1
    pub(crate) fn entry(user_id: i64, answer: &str, points: i64) -> WagerEntry {
        WagerEntry {
            id: user_id,
            wager_id: 1,
            user_id,
            group_id: 1,
            answer_value: answer.to_string(),
            points_wagered: points,
            is_winner: None,
            points_won: 0,
            created_at: Utc::now(),
        }
    }
}
