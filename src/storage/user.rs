//! User Redis operations.
//!
//! Redis key patterns:
//! - `user:{nanoid}`: individual user data (JSON)
//! - `address:{checksum_address}`: address lookup to user_id (STRING)
//!
//! Users are permanent; only sessions expire.

use crate::models::StoredUser;
use crate::storage::{from_json, to_json};
use chrono::{DateTime, Utc};
use redis::AsyncCommands;

fn user_key(id: &str) -> String {
    format!("user:{}", id)
}

fn address_key(address: &str) -> String {
    format!("address:{}", address)
}

/// Store a user record.
pub async fn store_user<C>(con: &mut C, user: &StoredUser) -> Result<(), redis::RedisError>
where
    C: AsyncCommands,
{
    let json = to_json(user)?;
    con.set::<_, _, ()>(user_key(&user.id), json).await?;
    Ok(())
}

/// Get a user by ID.
pub async fn get_user<C>(con: &mut C, id: &str) -> Result<Option<StoredUser>, redis::RedisError>
where
    C: AsyncCommands,
{
    let json: Option<String> = con.get(user_key(id)).await?;
    json.map(from_json).transpose()
}

/// Get a user by checksummed address.
///
/// Performs a two-step lookup: address -> user_id -> user data.
pub async fn get_user_by_address<C>(
    con: &mut C,
    address: &str,
) -> Result<Option<StoredUser>, redis::RedisError>
where
    C: AsyncCommands,
{
    let user_id: Option<String> = con.get(address_key(address)).await?;

    match user_id {
        Some(id) => get_user(con, &id).await,
        None => Ok(None),
    }
}

/// Find the user for `address`, creating it on first login, and record the login time.
///
/// The address claim is taken with `SET NX`, so concurrent first logins for the
/// same address agree on a single user id.
pub async fn get_or_create_user<C>(
    con: &mut C,
    address: &str,
    now: DateTime<Utc>,
) -> Result<StoredUser, redis::RedisError>
where
    C: AsyncCommands,
{
    let candidate_id = nanoid::nanoid!(12);
    let claimed: bool = con.set_nx(address_key(address), &candidate_id).await?;

    let user_id = if claimed {
        candidate_id
    } else {
        let existing: Option<String> = con.get(address_key(address)).await?;
        existing.ok_or_else(|| {
            redis::RedisError::from((
                redis::ErrorKind::from(redis::ServerErrorKind::ResponseError),
                "address lookup vanished",
            ))
        })?
    };

    // The record may not be written yet if another login just claimed the address
    let user = match get_user(con, &user_id).await? {
        Some(mut user) => {
            user.last_login_at = now;
            user
        }
        None => StoredUser {
            id: user_id,
            address: address.to_string(),
            created_at: now,
            last_login_at: now,
        },
    };

    store_user(con, &user).await?;
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_patterns() {
        assert_eq!(user_key("abc123"), "user:abc123");
        assert_eq!(
            address_key("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"),
            "address:0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
        );
    }
}
