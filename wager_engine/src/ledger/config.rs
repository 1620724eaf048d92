//! Ledger configuration: starting grant and inactivity decay.

use crate::ids::UserId;
use crate::store::config::parse_env_or;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::env;

/// Inactivity decay policy
///
/// An account whose most recent transaction is older than `idle_days` loses
/// `rate_percent` of its balance (at least one point) per application, never
/// dropping below `floor`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecayPolicy {
    pub idle_days: i64,
    pub rate_percent: i64,
    pub floor: i64,
    pub exempt_users: HashSet<UserId>,
}

impl Default for DecayPolicy {
    fn default() -> Self {
        Self {
            idle_days: 14,
            rate_percent: 5,
            floor: 100,
            exempt_users: HashSet::new(),
        }
    }
}

impl DecayPolicy {
    /// Whether decay can ever apply to `user_id`
    pub fn applies_to(&self, user_id: UserId) -> bool {
        self.rate_percent > 0 && !self.exempt_users.contains(&user_id)
    }

    /// Points to remove from `balance`, or `None` when the account is active
    /// or already at the floor
    pub fn decay_amount(
        &self,
        balance: i64,
        last_activity: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Option<i64> {
        if self.rate_percent <= 0 || balance <= self.floor {
            return None;
        }
        if now - last_activity < Duration::days(self.idle_days) {
            return None;
        }

        let headroom = balance - self.floor;
        let decay = (balance.saturating_mul(self.rate_percent) / 100).max(1);
        Some(decay.min(headroom))
    }
}

/// Ledger configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Points granted by `initialize_balance`
    pub starting_points: i64,
    pub decay: DecayPolicy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            starting_points: 1000,
            decay: DecayPolicy::default(),
        }
    }
}

impl LedgerConfig {
    /// Load from environment variables
    ///
    /// - `STARTING_POINTS` (default: 1000)
    /// - `DECAY_IDLE_DAYS` (default: 14)
    /// - `DECAY_RATE_PERCENT` (default: 5, `0` disables decay)
    /// - `DECAY_FLOOR` (default: 100)
    /// - `DECAY_EXEMPT_USERS`: comma-separated user ids
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let exempt_users = env::var("DECAY_EXEMPT_USERS")
            .map(|raw| {
                raw.split(',')
                    .filter_map(|id| id.trim().parse().ok())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            starting_points: parse_env_or("STARTING_POINTS", defaults.starting_points),
            decay: DecayPolicy {
                idle_days: parse_env_or("DECAY_IDLE_DAYS", defaults.decay.idle_days),
                rate_percent: parse_env_or("DECAY_RATE_PERCENT", defaults.decay.rate_percent),
                floor: parse_env_or("DECAY_FLOOR", defaults.decay.floor),
                exempt_users,
            },
        }
    }
}
