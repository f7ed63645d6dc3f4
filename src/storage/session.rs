//! Session Redis operations.
//!
//! Redis key patterns:
//! - `session:{token}`: session data (JSON, TTL)
//! - `user_sessions:{user_id}`: set of a user's session tokens
//!
//! Session keys carry the session TTL, so `purge_expired` has nothing to do.
//!
//! Session JSON read back from Redis is zeroized after deserialization. Redis
//! keeps its own copy, so this only covers the application's memory.

use crate::auth::protocol::VerifiedIdentity;
use crate::auth::session::{generate_session_token, SessionError, SessionIssuer};
use crate::clock::Clock;
use crate::models::StoredSession;
use crate::storage::{from_json, to_json, user};
use async_trait::async_trait;
use redis::AsyncCommands;
use std::sync::Arc;

fn session_key(token: &str) -> String {
    format!("session:{}", token)
}

fn user_sessions_key(user_id: &str) -> String {
    format!("user_sessions:{}", user_id)
}

/// Store a session in Redis with TTL.
///
/// Also adds the session token to the user's session tracking set
/// (`user_sessions:{user_id}`) so all of a user's sessions can be found.
pub async fn store_session<C>(
    con: &mut C,
    session: &StoredSession,
    ttl_secs: u64,
) -> Result<(), redis::RedisError>
where
    C: AsyncCommands,
{
    let json = to_json(session)?;
    let user_sessions_key = user_sessions_key(&session.user_id);

    con.set_ex::<_, _, ()>(session_key(&session.token), json, ttl_secs)
        .await?;

    con.sadd::<_, _, ()>(&user_sessions_key, &session.token)
        .await?;
    // Keep the set alive at least as long as the newest session
    con.expire::<_, ()>(&user_sessions_key, ttl_secs as i64)
        .await?;

    Ok(())
}

/// Get a session by token.
pub async fn get_session<C>(
    con: &mut C,
    token: &str,
) -> Result<Option<StoredSession>, redis::RedisError>
where
    C: AsyncCommands,
{
    let json: Option<String> = con.get(session_key(token)).await?;
    json.map(from_json).transpose()
}

/// Delete a session from Redis.
///
/// Also removes the token from the user's session tracking set.
/// Returns true if the session was deleted, false if it didn't exist.
pub async fn delete_session<C>(
    con: &mut C,
    token: &str,
    user_id: &str,
) -> Result<bool, redis::RedisError>
where
    C: AsyncCommands,
{
    let deleted: i32 = con.del(session_key(token)).await?;
    con.srem::<_, _, ()>(user_sessions_key(user_id), token)
        .await?;

    Ok(deleted > 0)
}

/// Tokens of every session recorded for a user (some may already have expired).
pub async fn list_user_sessions<C>(
    con: &mut C,
    user_id: &str,
) -> Result<Vec<String>, redis::RedisError>
where
    C: AsyncCommands,
{
    con.smembers(user_sessions_key(user_id)).await
}

/// Redis-backed `SessionIssuer`: users keyed by address, sessions with TTL.
pub struct RedisSessionIssuer {
    redis: redis::Client,
    ttl_secs: u64,
    clock: Arc<dyn Clock>,
}

impl RedisSessionIssuer {
    pub fn new(redis: redis::Client, ttl_secs: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            redis,
            ttl_secs,
            clock,
        }
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, SessionError> {
        self.redis
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| SessionError::Backend(format!("Redis connection error: {}", e)))
    }
}

#[async_trait]
impl SessionIssuer for RedisSessionIssuer {
    async fn issue_session(
        &self,
        identity: &VerifiedIdentity,
    ) -> Result<StoredSession, SessionError> {
        let now = self.clock.now();
        let mut con = self.connection().await?;

        let user = user::get_or_create_user(&mut con, &identity.address, now).await?;

        let session = StoredSession {
            token: generate_session_token(),
            user_id: user.id,
            address: user.address,
            created_at: now,
        };
        store_session(&mut con, &session, self.ttl_secs).await?;

        Ok(session)
    }

    async fn get_session(&self, token: &str) -> Result<Option<StoredSession>, SessionError> {
        let mut con = self.connection().await?;
        Ok(get_session(&mut con, token).await?)
    }

    async fn revoke_session(&self, token: &str) -> Result<bool, SessionError> {
        let mut con = self.connection().await?;
        match get_session(&mut con, token).await? {
            Some(session) => Ok(delete_session(&mut con, token, &session.user_id).await?),
            None => Ok(false),
        }
    }

    async fn purge_expired(&self) -> Result<usize, SessionError> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_patterns() {
        assert_eq!(session_key("tok"), "session:tok");
        assert_eq!(user_sessions_key("u1"), "user_sessions:u1");
    }
}
