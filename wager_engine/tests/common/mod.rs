//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use wager_engine::clock::ManualClock;
use wager_engine::settlement::{EngineConfig, SettlementEngine};
use wager_engine::store::{MemberDirectory, MemoryStore};
use wager_engine::wager::{Wager, WagerDraft, WagerOptions};
use wager_engine::{GroupId, UserId};

pub const GROUP: GroupId = 100;

/// Engine over an in-memory store with a pinned clock
pub struct Harness {
    pub engine: SettlementEngine,
    pub clock: Arc<ManualClock>,
    pub members: MemberDirectory,
    pub store: MemoryStore,
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let clock = Arc::new(ManualClock::new(start_time()));
        let members = MemberDirectory::new();
        let store = MemoryStore::new();
        let engine = SettlementEngine::new(
            Arc::new(store.clone()),
            Arc::new(members.clone()),
            clock.clone(),
            config,
        );
        Self {
            engine,
            clock,
            members,
            store,
        }
    }

    /// Add users to [`GROUP`] and grant their starting balance
    pub async fn fund(&self, users: &[UserId]) {
        for &user in users {
            self.members.add_member(GROUP, user).await;
            self.engine.initialize_balance(user, GROUP).await.unwrap();
        }
    }

    pub async fn create(
        &self,
        creator: UserId,
        options: WagerOptions,
        stake: Option<i64>,
    ) -> Wager {
        self.engine
            .create_wager(GROUP, creator, draft(options, stake, &self.clock))
            .await
            .unwrap()
    }

    pub async fn balance(&self, user: UserId) -> i64 {
        self.engine.get_balance(user, GROUP).await.unwrap()
    }
}

pub fn draft(options: WagerOptions, stake: Option<i64>, clock: &ManualClock) -> WagerDraft {
    use wager_engine::clock::Clock;
    WagerDraft {
        question: "Who is right?".to_string(),
        options,
        stake,
        deadline: clock.now() + Duration::days(1),
    }
}

pub fn choices(labels: &[&str]) -> WagerOptions {
    WagerOptions::MultipleChoice {
        choices: labels.iter().map(|l| l.to_string()).collect(),
    }
}
