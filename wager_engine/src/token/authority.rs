//! One-time token issuance and consumption.

use super::{
    errors::{TokenError, TokenResult},
    models::{IssuedToken, NewToken, OneTimeToken, TokenContext, TokenKind, TokenRejection},
};
use crate::clock::Clock;
use crate::ids::{UserId, WagerId};
use crate::store::AtomicUnit;
use chrono::Duration;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Bytes of entropy in a token secret
const TOKEN_BYTES: usize = 32;

/// Parameters for a new token
#[derive(Debug, Clone)]
pub struct TokenRequest {
    pub kind: TokenKind,
    pub wager_id: Option<WagerId>,
    pub owner_id: Option<UserId>,
    pub context: TokenContext,
    /// Falls back to the authority's default lifetime
    pub ttl_hours: Option<i64>,
}

impl TokenRequest {
    /// Settle `wager_id` with `outcome`, on behalf of `issuer_id`
    pub fn settle(wager_id: WagerId, outcome: impl Into<String>, issuer_id: UserId) -> Self {
        Self {
            kind: TokenKind::Settle,
            wager_id: Some(wager_id),
            owner_id: Some(issuer_id),
            context: TokenContext {
                wager_id: Some(wager_id),
                outcome: Some(outcome.into()),
                issuer_id: Some(issuer_id),
                ..TokenContext::default()
            },
            ttl_hours: None,
        }
    }

    /// Dispute the settlement of `wager_id`
    pub fn dispute(wager_id: WagerId, owner_id: UserId) -> Self {
        Self {
            kind: TokenKind::Dispute,
            wager_id: Some(wager_id),
            owner_id: Some(owner_id),
            context: TokenContext {
                wager_id: Some(wager_id),
                issuer_id: Some(owner_id),
                ..TokenContext::default()
            },
            ttl_hours: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.context.note = Some(note.into());
        self
    }

    pub fn with_ttl_hours(mut self, hours: i64) -> Self {
        self.ttl_hours = Some(hours);
        self
    }
}

/// Issues, verifies and consumes single-use tokens
///
/// Only the SHA-256 hash of a token is stored; the secret leaves the authority
/// once, inside [`IssuedToken`].
#[derive(Clone)]
pub struct TokenAuthority {
    clock: Arc<dyn Clock>,
    default_ttl_hours: i64,
}

impl TokenAuthority {
    pub fn new(clock: Arc<dyn Clock>, default_ttl_hours: i64) -> Self {
        Self {
            clock,
            default_ttl_hours,
        }
    }

    /// Generate and store a new token
    pub async fn issue(
        &self,
        unit: &mut dyn AtomicUnit,
        request: TokenRequest,
    ) -> TokenResult<IssuedToken> {
        let ttl_hours = request.ttl_hours.unwrap_or(self.default_ttl_hours);
        if ttl_hours <= 0 {
            return Err(TokenError::InvalidTtl(ttl_hours));
        }

        let token = generate_secret();
        let now = self.clock.now();
        let record = unit
            .insert_token(NewToken {
                token_hash: hash_token(&token),
                kind: request.kind,
                wager_id: request.wager_id,
                owner_id: request.owner_id,
                context: request.context,
                expires_at: now + Duration::hours(ttl_hours),
                created_at: now,
            })
            .await?;

        log::info!(
            "Issued {} token {} for wager {:?}",
            record.kind,
            record.id,
            record.wager_id
        );
        Ok(IssuedToken { token, record })
    }

    /// Look a token up without consuming it
    ///
    /// # Errors
    ///
    /// * `TokenError::Invalid` - Token is unknown, expired or already used
    pub async fn verify(
        &self,
        unit: &mut dyn AtomicUnit,
        token: &str,
    ) -> TokenResult<OneTimeToken> {
        let record = unit
            .find_token(&hash_token(token))
            .await?
            .ok_or(TokenRejection::NotFound)?;
        record.check(self.clock.now())?;
        Ok(record)
    }

    /// Mark a token used; a second consumption fails with `AlreadyUsed`
    pub async fn consume(
        &self,
        unit: &mut dyn AtomicUnit,
        token: &str,
    ) -> TokenResult<OneTimeToken> {
        let mut record = unit
            .lock_token(&hash_token(token))
            .await?
            .ok_or(TokenRejection::NotFound)?;

        let now = self.clock.now();
        record.check(now)?;
        unit.mark_token_used(record.id, now).await?;
        record.used_at = Some(now);

        log::info!("Consumed {} token {}", record.kind, record.id);
        Ok(record)
    }

    /// Unused, unexpired tokens for a wager
    pub async fn list_active(
        &self,
        unit: &mut dyn AtomicUnit,
        wager_id: WagerId,
    ) -> TokenResult<Vec<OneTimeToken>> {
        let now = self.clock.now();
        let tokens = unit.wager_tokens(wager_id).await?;
        Ok(tokens.into_iter().filter(|t| t.is_active(now)).collect())
    }

    /// Retire every outstanding token for a wager, returning how many
    pub async fn invalidate_all(
        &self,
        unit: &mut dyn AtomicUnit,
        wager_id: WagerId,
    ) -> TokenResult<u64> {
        let revoked = unit
            .revoke_wager_tokens(wager_id, self.clock.now())
            .await?;
        if revoked > 0 {
            log::info!("Invalidated {revoked} tokens for wager {wager_id}");
        }
        Ok(revoked)
    }
}

/// Fresh 256-bit secret, hex encoded
fn generate_secret() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Storage form of a token secret
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::{MemoryStore, Store};
    use chrono::Utc;

    fn authority() -> (TokenAuthority, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        (TokenAuthority::new(clock.clone(), 24), clock)
    }

    #[test]
    fn test_secrets_are_unique_and_hashed() {
        let a = generate_secret();
        let b = generate_secret();
        assert_eq!(a.len(), TOKEN_BYTES * 2);
        assert_ne!(a, b);
        assert_ne!(hash_token(&a), a);
        assert_eq!(hash_token(&a), hash_token(&a));
    }

    #[tokio::test]
    async fn test_issue_then_verify_returns_payload() {
        let store = MemoryStore::new();
        let (authority, _) = authority();
        let mut unit = store.begin().await.unwrap();

        let issued = authority
            .issue(unit.as_mut(), TokenRequest::settle(7, "yes", 3).with_note("called it"))
            .await
            .unwrap();
        assert_ne!(issued.record.token_hash, issued.token);

        let verified = authority.verify(unit.as_mut(), &issued.token).await.unwrap();
        assert_eq!(verified, issued.record);
        assert_eq!(verified.context.outcome.as_deref(), Some("yes"));
        assert_eq!(verified.context.note.as_deref(), Some("called it"));
        assert!(verified.used_at.is_none());
    }

    #[tokio::test]
    async fn test_consume_twice_fails() {
        let store = MemoryStore::new();
        let (authority, _) = authority();
        let mut unit = store.begin().await.unwrap();

        let issued = authority
            .issue(unit.as_mut(), TokenRequest::dispute(1, 2))
            .await
            .unwrap();
        let consumed = authority.consume(unit.as_mut(), &issued.token).await.unwrap();
        assert!(consumed.used_at.is_some());

        let err = authority
            .consume(unit.as_mut(), &issued.token)
            .await
            .unwrap_err();
        assert!(matches!(err, TokenError::Invalid(TokenRejection::AlreadyUsed)));
    }

    #[tokio::test]
    async fn test_expired_and_unknown() {
        let store = MemoryStore::new();
        let (authority, clock) = authority();
        let mut unit = store.begin().await.unwrap();

        let issued = authority
            .issue(unit.as_mut(), TokenRequest::settle(1, "no", 1).with_ttl_hours(1))
            .await
            .unwrap();
        clock.advance(Duration::hours(1));

        let err = authority.verify(unit.as_mut(), &issued.token).await.unwrap_err();
        assert!(matches!(err, TokenError::Invalid(TokenRejection::Expired)));

        let err = authority.verify(unit.as_mut(), "nope").await.unwrap_err();
        assert!(matches!(err, TokenError::Invalid(TokenRejection::NotFound)));
    }

    #[tokio::test]
    async fn test_invalid_ttl() {
        let store = MemoryStore::new();
        let (authority, _) = authority();
        let mut unit = store.begin().await.unwrap();

        let err = authority
            .issue(unit.as_mut(), TokenRequest::settle(1, "no", 1).with_ttl_hours(0))
            .await
            .unwrap_err();
        assert!(matches!(err, TokenError::InvalidTtl(0)));
    }

    #[tokio::test]
    async fn test_invalidate_all_only_touches_active_tokens() {
        let store = MemoryStore::new();
        let (authority, _) = authority();
        let mut unit = store.begin().await.unwrap();

        let used = authority
            .issue(unit.as_mut(), TokenRequest::settle(5, "yes", 1))
            .await
            .unwrap();
        authority.consume(unit.as_mut(), &used.token).await.unwrap();
        authority
            .issue(unit.as_mut(), TokenRequest::settle(5, "no", 1))
            .await
            .unwrap();
        authority
            .issue(unit.as_mut(), TokenRequest::dispute(5, 2))
            .await
            .unwrap();
        authority
            .issue(unit.as_mut(), TokenRequest::settle(6, "yes", 1))
            .await
            .unwrap();

        assert_eq!(authority.list_active(unit.as_mut(), 5).await.unwrap().len(), 2);
        assert_eq!(authority.invalidate_all(unit.as_mut(), 5).await.unwrap(), 2);
        assert!(authority.list_active(unit.as_mut(), 5).await.unwrap().is_empty());
        assert_eq!(authority.list_active(unit.as_mut(), 6).await.unwrap().len(), 1);
    }
}
