//! In-process nonce and session stores.
//!
//! Used when no Redis is configured (single node, development) and by tests.
//! Each store keeps its state behind one mutex, which makes every operation,
//! including the nonce take-and-check, a single atomic step.

use crate::auth::nonce::{generate_nonce, NonceStore, NonceStoreError, PendingLogin};
use crate::auth::protocol::VerifiedIdentity;
use crate::auth::session::{generate_session_token, SessionError, SessionIssuer};
use crate::clock::Clock;
use crate::models::{StoredSession, StoredUser};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

fn ttl_from(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// ============================================================================
// Nonces
// ============================================================================

pub struct MemoryNonceStore {
    pending: Mutex<HashMap<String, PendingLogin>>,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl MemoryNonceStore {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            ttl: ttl_from(ttl),
            clock,
        }
    }

    /// Number of outstanding pending logins.
    pub fn len(&self) -> usize {
        lock(&self.pending).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl NonceStore for MemoryNonceStore {
    async fn issue_nonce(&self, context_id: &str) -> Result<PendingLogin, NonceStoreError> {
        let login = PendingLogin {
            context_id: context_id.to_string(),
            nonce: generate_nonce(),
            created_at: self.clock.now(),
        };
        lock(&self.pending).insert(context_id.to_string(), login.clone());
        Ok(login)
    }

    async fn consume_nonce(&self, context_id: &str, nonce: &str) -> Result<bool, NonceStoreError> {
        let taken = lock(&self.pending).remove(context_id);
        Ok(taken.is_some_and(|login| login.accepts(nonce, self.clock.now(), self.ttl)))
    }

    async fn purge_expired(&self) -> Result<usize, NonceStoreError> {
        let now = self.clock.now();
        let mut pending = lock(&self.pending);
        let before = pending.len();
        pending.retain(|_, login| now.signed_duration_since(login.created_at) <= self.ttl);
        Ok(before - pending.len())
    }
}

// ============================================================================
// Sessions
// ============================================================================

#[derive(Default)]
struct SessionState {
    users_by_address: HashMap<String, StoredUser>,
    sessions: HashMap<String, StoredSession>,
}

pub struct MemorySessionIssuer {
    state: Mutex<SessionState>,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl MemorySessionIssuer {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(SessionState::default()),
            ttl: ttl_from(ttl),
            clock,
        }
    }

    pub fn user_by_address(&self, address: &str) -> Option<StoredUser> {
        lock(&self.state).users_by_address.get(address).cloned()
    }

    /// Number of sessions held, expired or not.
    pub fn session_count(&self) -> usize {
        lock(&self.state).sessions.len()
    }
}

#[async_trait]
impl SessionIssuer for MemorySessionIssuer {
    async fn issue_session(
        &self,
        identity: &VerifiedIdentity,
    ) -> Result<StoredSession, SessionError> {
        let now = self.clock.now();
        let mut state = lock(&self.state);

        let user = state
            .users_by_address
            .entry(identity.address.clone())
            .and_modify(|user| user.last_login_at = now)
            .or_insert_with(|| StoredUser {
                id: nanoid::nanoid!(12),
                address: identity.address.clone(),
                created_at: now,
                last_login_at: now,
            })
            .clone();

        let session = StoredSession {
            token: generate_session_token(),
            user_id: user.id,
            address: user.address,
            created_at: now,
        };
        state
            .sessions
            .insert(session.token.clone(), session.clone());

        Ok(session)
    }

    async fn get_session(&self, token: &str) -> Result<Option<StoredSession>, SessionError> {
        let now = self.clock.now();
        let mut state = lock(&self.state);

        match state.sessions.get(token) {
            Some(session) if now.signed_duration_since(session.created_at) <= self.ttl => {
                Ok(Some(session.clone()))
            }
            Some(_) => {
                state.sessions.remove(token);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn revoke_session(&self, token: &str) -> Result<bool, SessionError> {
        Ok(lock(&self.state).sessions.remove(token).is_some())
    }

    async fn purge_expired(&self) -> Result<usize, SessionError> {
        let now = self.clock.now();
        let mut state = lock(&self.state);
        let before = state.sessions.len();
        state
            .sessions
            .retain(|_, session| now.signed_duration_since(session.created_at) <= self.ttl);
        Ok(before - state.sessions.len())
    }
}
