//! Challenge/response login flow.
//!
//! Per login context: `issue_challenge` moves it to "challenge issued" (replacing any
//! earlier challenge), and `verify_and_login` ends that challenge either verified or
//! rejected. A rejected context starts over with a new challenge.
//!
//! `verify_and_login` consumes the nonce before anything else is checked, so an
//! attempt that fails or times out later can never be replayed. The timeout bounds
//! verification only: once a signer is proven, the session is issued to completion,
//! so a timed-out attempt never leaves a session behind.

use crate::auth::message::{
    build_challenge, canonical_timestamp, extract_nonce, parse_and_validate, ChallengeMessage,
    ExpectedFields, MessageError,
};
use crate::auth::nonce::NonceStore;
use crate::auth::session::SessionIssuer;
use crate::auth::verify::{decode_signature, parse_address, SignatureVerifier};
use crate::clock::Clock;
use crate::config::Config;
use crate::models::{StoredSession, VerifyRequest};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Server-side values every challenge is bound to.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub domain: String,
    pub uri: String,
    pub statement: Option<String>,
    pub chain_id: u64,
    pub nonce_ttl: Duration,
    pub max_clock_skew: Duration,
    pub verify_timeout: Duration,
}

impl AuthSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            domain: config.domain.clone(),
            uri: config.login_uri.clone(),
            statement: config.login_statement.clone(),
            chain_id: config.chain_id,
            nonce_ttl: config.nonce_ttl(),
            max_clock_skew: config.max_clock_skew(),
            verify_timeout: config.verify_timeout(),
        }
    }
}

/// A freshly issued challenge: the message the wallet must sign, minus the address.
#[derive(Debug, Clone)]
pub struct Challenge {
    pub context_id: String,
    pub message: ChallengeMessage,
}

/// Outcome of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    /// EIP-55 checksummed address.
    pub address: String,
    pub verified_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct VerifiedLogin {
    pub identity: VerifiedIdentity,
    pub session: StoredSession,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Nonce invalid")]
    NonceInvalid,

    #[error("Message invalid: {0}")]
    MessageInvalid(#[from] MessageError),

    #[error("Signature invalid: {0}")]
    SignatureInvalid(String),

    #[error("Verification timed out")]
    Timeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::NonceInvalid => "nonce_invalid",
            AuthError::MessageInvalid(_) => "message_invalid",
            AuthError::SignatureInvalid(_) => "signature_invalid",
            AuthError::Timeout => "timeout",
            AuthError::Internal(_) => "internal",
        }
    }
}

pub struct AuthProtocol {
    settings: AuthSettings,
    nonces: Arc<dyn NonceStore>,
    verifier: Arc<dyn SignatureVerifier>,
    sessions: Arc<dyn SessionIssuer>,
    clock: Arc<dyn Clock>,
}

impl AuthProtocol {
    pub fn new(
        settings: AuthSettings,
        nonces: Arc<dyn NonceStore>,
        verifier: Arc<dyn SignatureVerifier>,
        sessions: Arc<dyn SessionIssuer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            settings,
            nonces,
            verifier,
            sessions,
            clock,
        }
    }

    pub fn sessions(&self) -> &Arc<dyn SessionIssuer> {
        &self.sessions
    }

    pub fn nonces(&self) -> &Arc<dyn NonceStore> {
        &self.nonces
    }

    /// Issue a new challenge for `context_id`, invalidating any outstanding one.
    pub async fn issue_challenge(&self, context_id: &str) -> Result<Challenge, AuthError> {
        let pending = self
            .nonces
            .issue_nonce(context_id)
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        let issued_at = canonical_timestamp(self.clock.now());
        let expiration_time = chrono::Duration::from_std(self.settings.nonce_ttl)
            .ok()
            .and_then(|ttl| issued_at.checked_add_signed(ttl));

        tracing::debug!(action = "challenge_issued", context = %context_id, "Challenge issued");

        Ok(Challenge {
            context_id: context_id.to_string(),
            message: ChallengeMessage {
                domain: self.settings.domain.clone(),
                address: None,
                statement: self.settings.statement.clone(),
                uri: self.settings.uri.clone(),
                chain_id: self.settings.chain_id,
                nonce: pending.nonce,
                issued_at,
                expiration_time,
            },
        })
    }

    /// Verify a signed challenge and open a session for the signer.
    ///
    /// Every failure is logged with its specific reason; callers should only
    /// ever show a generic failure.
    pub async fn verify_and_login(
        &self,
        context_id: &str,
        request: &VerifyRequest,
    ) -> Result<VerifiedLogin, AuthError> {
        let verified = match tokio::time::timeout(
            self.settings.verify_timeout,
            self.verify_identity(context_id, request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(AuthError::Timeout),
        };

        let result = match verified {
            Ok(identity) => self.open_session(identity).await,
            Err(e) => Err(e),
        };

        match &result {
            Ok(login) => tracing::info!(
                action = "auth_success",
                context = %context_id,
                address = %login.identity.address,
                user_id = %login.session.user_id,
                "Wallet authenticated"
            ),
            Err(e) => tracing::warn!(
                action = "auth_failed",
                context = %context_id,
                kind = e.kind(),
                reason = %e,
                "Wallet authentication failed"
            ),
        }

        result
    }

    async fn verify_identity(
        &self,
        context_id: &str,
        request: &VerifyRequest,
    ) -> Result<VerifiedIdentity, AuthError> {
        // 1. Consume the nonce, whatever happens next
        let nonce = extract_nonce(&request.message).unwrap_or_default();
        let consumed = self
            .nonces
            .consume_nonce(context_id, nonce)
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?;
        if !consumed {
            return Err(AuthError::NonceInvalid);
        }

        // 2. Fields must agree with server configuration
        if request.chain_id != self.settings.chain_id {
            return Err(MessageError::ChainIdMismatch {
                expected: self.settings.chain_id,
                found: request.chain_id,
            }
            .into());
        }

        let now = self.clock.now();
        let message = parse_and_validate(
            &request.message,
            &ExpectedFields {
                domain: &self.settings.domain,
                chain_id: self.settings.chain_id,
                nonce,
                max_clock_skew: self.settings.max_clock_skew,
                now,
            },
        )?;

        let claimed = parse_address(&request.address)
            .map_err(|e| AuthError::SignatureInvalid(e.to_string()))?;
        if message.address != Some(claimed) {
            return Err(MessageError::AddressMismatch.into());
        }

        // 3. Only the canonical rendering is ever signed off
        let canonical = build_challenge(&message);
        if canonical != request.message {
            return Err(MessageError::NotCanonical.into());
        }

        // 4. Recover the signer off the async workers
        let signature = decode_signature(&request.signature)
            .map_err(|e| AuthError::SignatureInvalid(e.to_string()))?;
        let verifier = self.verifier.clone();
        let claimed_address = request.address.clone();
        let verified = tokio::task::spawn_blocking(move || {
            verifier.verify(&canonical, &signature, &claimed_address)
        })
        .await
        .map_err(|e| AuthError::Internal(format!("Verifier task failed: {}", e)))?
        .map_err(|e| AuthError::SignatureInvalid(e.to_string()))?;
        if !verified {
            return Err(AuthError::SignatureInvalid(
                "recovered address does not match".to_string(),
            ));
        }

        Ok(VerifiedIdentity {
            address: claimed.to_checksum(None),
            verified_at: now,
        })
    }

    async fn open_session(&self, identity: VerifiedIdentity) -> Result<VerifiedLogin, AuthError> {
        // 5. Hand the identity to the session layer
        let session = self
            .sessions
            .issue_session(&identity)
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        Ok(VerifiedLogin { identity, session })
    }
}
