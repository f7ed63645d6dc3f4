//! Session issuance after a successful wallet login.

use crate::auth::protocol::VerifiedIdentity;
use crate::models::StoredSession;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use rand::Rng;

/// Generate a cryptographically random session token.
///
/// Returns an unpadded URL-safe base64 string (43 characters) from 32 random
/// bytes, so it can travel in a cookie unchanged.
pub fn generate_session_token() -> String {
    let mut rng = rand::rng();
    let mut bytes = [0u8; 32];
    rng.fill(&mut bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate an identifier for an anonymous login context.
pub fn generate_context_id() -> String {
    nanoid::nanoid!(24)
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session backend error: {0}")]
    Backend(String),
}

impl From<redis::RedisError> for SessionError {
    fn from(err: redis::RedisError) -> Self {
        SessionError::Backend(err.to_string())
    }
}

/// Creates and tracks sessions for verified wallet addresses.
///
/// `issue_session` attaches the identity to a user record (creating it on first
/// login) and returns a fresh session bound to that user.
#[async_trait]
pub trait SessionIssuer: Send + Sync {
    async fn issue_session(
        &self,
        identity: &VerifiedIdentity,
    ) -> Result<StoredSession, SessionError>;

    async fn get_session(&self, token: &str) -> Result<Option<StoredSession>, SessionError>;

    /// Returns true if the session existed.
    async fn revoke_session(&self, token: &str) -> Result<bool, SessionError>;

    /// Drop expired sessions. Returns how many were removed.
    async fn purge_expired(&self) -> Result<usize, SessionError>;
}
