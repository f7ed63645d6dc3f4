//! Storage backends for pending logins, users, and sessions.
//!
//! `memory` keeps everything in-process. The Redis modules are plain async
//! functions over `redis::AsyncCommands`, wrapped by `RedisNonceStore` and
//! `RedisSessionIssuer`. Records are serialized to JSON.

pub mod memory;
pub mod nonce;
pub mod session;
pub mod user;

use serde::{de::DeserializeOwned, Serialize};
use zeroize::Zeroizing;

pub use memory::{MemoryNonceStore, MemorySessionIssuer};
pub use nonce::RedisNonceStore;
pub use session::RedisSessionIssuer;

fn to_json<T: Serialize>(value: &T) -> Result<String, redis::RedisError> {
    serde_json::to_string(value).map_err(|e| {
        redis::RedisError::from((
            redis::ErrorKind::UnexpectedReturnType,
            "JSON serialize",
            e.to_string(),
        ))
    })
}

/// Deserialize a stored record. The raw JSON is zeroized once parsed.
fn from_json<T: DeserializeOwned>(data: String) -> Result<T, redis::RedisError> {
    let data = Zeroizing::new(data);
    serde_json::from_str(&data).map_err(|e| {
        redis::RedisError::from((
            redis::ErrorKind::UnexpectedReturnType,
            "JSON deserialize",
            e.to_string(),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StoredSession;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_json_helpers() {
        let session = StoredSession {
            token: "tok".to_string(),
            user_id: "user1".to_string(),
            address: "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        };
        let json = to_json(&session).unwrap();
        let back: StoredSession = from_json(json).unwrap();
        assert_eq!(back, session);
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        let result: Result<StoredSession, _> = from_json("{not json".to_string());
        let err = result.unwrap_err();
        assert_eq!(err.kind(), redis::ErrorKind::UnexpectedReturnType);
    }
}
