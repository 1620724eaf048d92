//! Engine configuration.

use super::payout::PayoutPolicy;
use crate::audit::AuditPolicy;
use crate::ledger::LedgerConfig;
use crate::store::config::parse_env_or;

/// Default lifetime of issued tokens
pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 24;

/// Settlement engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub payout_policy: PayoutPolicy,
    pub audit_policy: AuditPolicy,
    /// Lifetime of tokens issued without an explicit TTL
    pub token_ttl_hours: i64,
    pub ledger: LedgerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            payout_policy: PayoutPolicy::default(),
            audit_policy: AuditPolicy::default(),
            token_ttl_hours: DEFAULT_TOKEN_TTL_HOURS,
            ledger: LedgerConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load from environment variables
    ///
    /// - `PAYOUT_POLICY`: `pro_rata` (default) or `equal`
    /// - `AUDIT_POLICY`: `strict` (default) or `best_effort`
    /// - `TOKEN_TTL_HOURS` (default: 24)
    /// - ledger variables, see [`LedgerConfig::from_env`]
    ///
    /// Unrecognised values fall back to their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            payout_policy: parse_env_or("PAYOUT_POLICY", defaults.payout_policy),
            audit_policy: parse_env_or("AUDIT_POLICY", defaults.audit_policy),
            token_ttl_hours: parse_env_or("TOKEN_TTL_HOURS", defaults.token_ttl_hours),
            ledger: LedgerConfig::from_env(),
        }
    }
}
