//! Pending-login Redis operations.
//!
//! Redis key patterns:
//! - `pending_login:{context_id}`: outstanding nonce for a login context (JSON, TTL)
//!
//! The key TTL is the nonce TTL, so expired logins disappear on their own and
//! `purge_expired` has nothing to do.

use crate::auth::nonce::{generate_nonce, NonceStore, NonceStoreError, PendingLogin};
use crate::clock::Clock;
use crate::storage::{from_json, to_json};
use async_trait::async_trait;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;

fn pending_key(context_id: &str) -> String {
    format!("pending_login:{}", context_id)
}

/// Store a pending login, replacing any previous one for the same context.
pub async fn store_pending_login<C>(
    con: &mut C,
    login: &PendingLogin,
    ttl_secs: u64,
) -> Result<(), redis::RedisError>
where
    C: AsyncCommands,
{
    let json = to_json(login)?;
    con.set_ex::<_, _, ()>(pending_key(&login.context_id), json, ttl_secs)
        .await?;
    Ok(())
}

/// Get and delete a pending login atomically.
///
/// Uses a Lua script so two concurrent takers can never both see the record.
pub async fn take_pending_login<C>(
    con: &mut C,
    context_id: &str,
) -> Result<Option<PendingLogin>, redis::RedisError>
where
    C: AsyncCommands,
{
    let script = redis::Script::new(
        r"
        local val = redis.call('GET', KEYS[1])
        if val then
            redis.call('DEL', KEYS[1])
        end
        return val
        ",
    );

    let json: Option<String> = script
        .key(pending_key(context_id))
        .invoke_async(con)
        .await?;

    json.map(from_json).transpose()
}

pub struct RedisNonceStore {
    redis: redis::Client,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl RedisNonceStore {
    pub fn new(redis: redis::Client, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { redis, ttl, clock }
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, NonceStoreError> {
        self.redis
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| NonceStoreError::Backend(format!("Redis connection error: {}", e)))
    }

    fn ttl_secs(&self) -> u64 {
        // Round up so the key never vanishes before the logical TTL
        let secs = self.ttl.as_secs();
        if self.ttl.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs.max(1)
        }
    }
}

#[async_trait]
impl NonceStore for RedisNonceStore {
    async fn issue_nonce(&self, context_id: &str) -> Result<PendingLogin, NonceStoreError> {
        let login = PendingLogin {
            context_id: context_id.to_string(),
            nonce: generate_nonce(),
            created_at: self.clock.now(),
        };

        let mut con = self.connection().await?;
        store_pending_login(&mut con, &login, self.ttl_secs()).await?;
        Ok(login)
    }

    async fn consume_nonce(&self, context_id: &str, nonce: &str) -> Result<bool, NonceStoreError> {
        let mut con = self.connection().await?;
        let taken = take_pending_login(&mut con, context_id).await?;

        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
        Ok(taken.is_some_and(|login| login.accepts(nonce, self.clock.now(), ttl)))
    }

    async fn purge_expired(&self) -> Result<usize, NonceStoreError> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_key() {
        assert_eq!(pending_key("abc"), "pending_login:abc");
    }

    #[test]
    fn test_ttl_rounds_up() {
        let client = redis::Client::open("redis://127.0.0.1:6379").unwrap();
        let clock: Arc<dyn Clock> = Arc::new(crate::clock::SystemClock);

        let store =
            RedisNonceStore::new(client.clone(), Duration::from_millis(1500), clock.clone());
        assert_eq!(store.ttl_secs(), 2);

        let store = RedisNonceStore::new(client, Duration::from_secs(300), clock);
        assert_eq!(store.ttl_secs(), 300);
    }
}
