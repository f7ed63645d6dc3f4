//! Single-use login nonces and the store that tracks them per login context.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

/// Random bytes behind every nonce (128 bits).
pub const NONCE_BYTES: usize = 16;

/// Hex-encoded nonce length.
pub const NONCE_LEN: usize = NONCE_BYTES * 2;

/// Generate a cryptographically random login nonce.
///
/// Returns 32 lowercase hex characters, which fits the alphanumeric nonce
/// grammar wallets expect in a sign-in message.
pub fn generate_nonce() -> String {
    let mut rng = rand::rng();
    let mut bytes = [0u8; NONCE_BYTES];
    rng.fill(&mut bytes);
    hex::encode(bytes)
}

/// Outstanding challenge for one login context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingLogin {
    pub context_id: String,
    pub nonce: String,
    pub created_at: DateTime<Utc>,
}

impl PendingLogin {
    /// Whether `presented` is this login's nonce and the login is still within `ttl`.
    ///
    /// The nonce comparison is constant-time and both conditions are always evaluated.
    pub fn accepts(&self, presented: &str, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        let nonce_matches: bool = self.nonce.as_bytes().ct_eq(presented.as_bytes()).into();
        let age = now.signed_duration_since(self.created_at);
        let fresh = age >= chrono::Duration::zero() && age <= ttl;
        nonce_matches & fresh
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NonceStoreError {
    #[error("Nonce store backend error: {0}")]
    Backend(String),
}

impl From<redis::RedisError> for NonceStoreError {
    fn from(err: redis::RedisError) -> Self {
        NonceStoreError::Backend(err.to_string())
    }
}

/// Issues and consumes single-use nonces bound to a login context.
///
/// Implementations must make `consume_nonce` a single atomic take: once any
/// call has looked at a context's pending login, no other call can see it.
#[async_trait]
pub trait NonceStore: Send + Sync {
    /// Create a fresh nonce for `context_id`, replacing any outstanding one.
    async fn issue_nonce(&self, context_id: &str) -> Result<PendingLogin, NonceStoreError>;

    /// Take the pending login for `context_id` and check it against `nonce`.
    ///
    /// Returns `Ok(false)` for every kind of mismatch (unknown context, wrong
    /// nonce, expired, already consumed) without saying which.
    async fn consume_nonce(&self, context_id: &str, nonce: &str) -> Result<bool, NonceStoreError>;

    /// Drop expired pending logins. Returns how many were removed.
    async fn purge_expired(&self) -> Result<usize, NonceStoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn pending(created_at: DateTime<Utc>) -> PendingLogin {
        PendingLogin {
            context_id: "ctx".to_string(),
            nonce: "a1b2c3d4e5f6a7b8c9d0e1f2a3b4c5d6".to_string(),
            created_at,
        }
    }

    #[test]
    fn test_generate_nonce() {
        let nonce = generate_nonce();
        assert_eq!(nonce.len(), NONCE_LEN);
        assert!(nonce.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hex::decode(&nonce).unwrap().len(), NONCE_BYTES);
    }

    #[test]
    fn test_nonces_are_unique() {
        assert_ne!(generate_nonce(), generate_nonce());
    }

    #[test]
    fn test_accepts_matching_fresh_nonce() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let login = pending(t0);
        let ttl = Duration::seconds(300);

        assert!(login.accepts(&login.nonce, t0, ttl));
        assert!(login.accepts(&login.nonce, t0 + ttl, ttl));
    }

    #[test]
    fn test_rejects_expired_or_wrong_nonce() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let login = pending(t0);
        let ttl = Duration::seconds(300);

        assert!(!login.accepts(&login.nonce, t0 + ttl + Duration::seconds(1), ttl));
        assert!(!login.accepts("a1b2c3d4e5f6a7b8c9d0e1f2a3b4c5d7", t0, ttl));
        assert!(!login.accepts("", t0, ttl));
        // Created "in the future" relative to now means clocks disagree
        assert!(!login.accepts(&login.nonce, t0 - Duration::seconds(1), ttl));
    }
}
