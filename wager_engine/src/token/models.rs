//! One-time token data models.

use crate::ids::{TokenId, UserId, WagerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Action a token authorizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Settle a wager with the outcome carried in the token
    Settle,
    /// Dispute a wager's settlement
    Dispute,
    /// Bridge an external channel into a web session
    Session,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Settle => write!(f, "settle"),
            TokenKind::Dispute => write!(f, "dispute"),
            TokenKind::Session => write!(f, "session"),
        }
    }
}

impl FromStr for TokenKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "settle" => Ok(TokenKind::Settle),
            "dispute" => Ok(TokenKind::Dispute),
            "session" => Ok(TokenKind::Session),
            other => Err(format!("unknown token kind '{other}'")),
        }
    }
}

/// Why a token was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenRejection {
    Expired,
    AlreadyUsed,
    NotFound,
}

impl std::fmt::Display for TokenRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenRejection::Expired => write!(f, "expired"),
            TokenRejection::AlreadyUsed => write!(f, "already used"),
            TokenRejection::NotFound => write!(f, "not found"),
        }
    }
}

/// Context carried by a token from issue to consumption
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenContext {
    pub wager_id: Option<WagerId>,
    /// Intended settlement outcome
    pub outcome: Option<String>,
    pub note: Option<String>,
    pub issuer_id: Option<UserId>,
    /// Caller-defined fields the engine does not interpret
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Stored one-time token. Only the SHA-256 hash of the secret is kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneTimeToken {
    pub id: TokenId,
    pub token_hash: String,
    pub kind: TokenKind,
    pub wager_id: Option<WagerId>,
    pub owner_id: Option<UserId>,
    pub context: TokenContext,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl OneTimeToken {
    /// Check usability at `now`. Use is reported before expiry.
    pub fn check(&self, now: DateTime<Utc>) -> Result<(), TokenRejection> {
        if self.used_at.is_some() {
            Err(TokenRejection::AlreadyUsed)
        } else if now >= self.expires_at {
            Err(TokenRejection::Expired)
        } else {
            Ok(())
        }
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.check(now).is_ok()
    }
}

/// Token row awaiting insertion
#[derive(Debug, Clone, PartialEq)]
pub struct NewToken {
    pub token_hash: String,
    pub kind: TokenKind,
    pub wager_id: Option<WagerId>,
    pub owner_id: Option<UserId>,
    pub context: TokenContext,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Freshly issued token: the plaintext secret is only available here
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub record: OneTimeToken,
}
