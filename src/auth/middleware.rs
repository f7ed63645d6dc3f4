//! Axum extractors for sessions and login contexts.

use crate::auth::nonce::NonceStore;
use crate::auth::protocol::{AuthProtocol, AuthSettings};
use crate::auth::session::SessionIssuer;
use crate::auth::verify::PersonalMessageVerifier;
use crate::clock::Clock;
use crate::config::Config;
use crate::error::AppError;
use crate::storage::{MemoryNonceStore, MemorySessionIssuer, RedisNonceStore, RedisSessionIssuer};
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use std::sync::Arc;

/// Cookie carrying the session token.
pub const SESSION_COOKIE: &str = "session";

/// Cookie carrying the anonymous login context id.
pub const CONTEXT_COOKIE: &str = "login_context";

/// Header alternative to the context cookie for non-browser clients.
pub const CONTEXT_HEADER: &str = "x-login-context";

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub auth: Arc<AuthProtocol>,
}

impl AppState {
    /// Wire up the login flow: Redis-backed stores when `REDIS_URL` is set,
    /// in-process stores otherwise.
    pub fn new(config: Config, clock: Arc<dyn Clock>) -> Result<Self, redis::RedisError> {
        let (nonces, sessions): (Arc<dyn NonceStore>, Arc<dyn SessionIssuer>) =
            match &config.redis_url {
                Some(url) => {
                    let client = redis::Client::open(url.as_str())?;
                    (
                        Arc::new(RedisNonceStore::new(
                            client.clone(),
                            config.nonce_ttl(),
                            clock.clone(),
                        )),
                        Arc::new(RedisSessionIssuer::new(
                            client,
                            config.session_ttl_secs,
                            clock.clone(),
                        )),
                    )
                }
                None => (
                    Arc::new(MemoryNonceStore::new(config.nonce_ttl(), clock.clone())),
                    Arc::new(MemorySessionIssuer::new(
                        std::time::Duration::from_secs(config.session_ttl_secs),
                        clock.clone(),
                    )),
                ),
            };

        let auth = AuthProtocol::new(
            AuthSettings::from_config(&config),
            nonces,
            Arc::new(PersonalMessageVerifier),
            sessions,
            clock,
        );

        Ok(Self {
            config: Arc::new(config),
            auth: Arc::new(auth),
        })
    }

    pub fn sessions(&self) -> &Arc<dyn SessionIssuer> {
        self.auth.sessions()
    }
}

/// Value of cookie `name` from the request's `Cookie` headers.
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

/// Client-supplied context ids are accepted only as 8 to 64 characters of
/// `[A-Za-z0-9_-]`. Anything else is treated as no context at all.
fn valid_context_id(id: &str) -> bool {
    (8..=64).contains(&id.len())
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Login context the request belongs to, from the `login_context` cookie or the
/// `X-Login-Context` header.
pub fn login_context(headers: &HeaderMap) -> Option<String> {
    let from_header = headers
        .get(CONTEXT_HEADER)
        .and_then(|v| v.to_str().ok());

    cookie_value(headers, CONTEXT_COOKIE)
        .or(from_header)
        .filter(|id| valid_context_id(id))
        .map(str::to_string)
}

/// Authenticated session extractor.
///
/// Reads the token from the `session` cookie or an `Authorization: Bearer {token}`
/// header. Returns 401 Unauthorized if missing or invalid.
pub struct AuthSession {
    pub user_id: String,
    pub address: String,
    pub token: String,
}

impl FromRequestParts<AppState> for AuthSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let bearer = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        let token = cookie_value(&parts.headers, SESSION_COOKIE)
            .or(bearer)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Unauthorized("Missing session".to_string()))?
            .to_string();

        let session = state
            .sessions()
            .get_session(&token)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Invalid or expired session".to_string()))?;

        Ok(AuthSession {
            user_id: session.user_id,
            address: session.address,
            token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_cookie_value() {
        let map = headers(&[("cookie", "a=1; session=tok123; b=2")]);
        assert_eq!(cookie_value(&map, "session"), Some("tok123"));
        assert_eq!(cookie_value(&map, "a"), Some("1"));
        assert_eq!(cookie_value(&map, "missing"), None);

        // Split across several Cookie headers
        let map = headers(&[("cookie", "a=1"), ("cookie", "session=tok456")]);
        assert_eq!(cookie_value(&map, "session"), Some("tok456"));
    }

    #[test]
    fn test_cookie_name_must_match_exactly() {
        let map = headers(&[("cookie", "xsession=evil; session_old=old")]);
        assert_eq!(cookie_value(&map, "session"), None);
    }

    #[test]
    fn test_login_context_sources() {
        let map = headers(&[("cookie", "login_context=ctx_from_cookie")]);
        assert_eq!(login_context(&map).as_deref(), Some("ctx_from_cookie"));

        let map = headers(&[("x-login-context", "ctx_from_header")]);
        assert_eq!(login_context(&map).as_deref(), Some("ctx_from_header"));

        // Cookie wins over header
        let map = headers(&[
            ("cookie", "login_context=ctx_from_cookie"),
            ("x-login-context", "ctx_from_header"),
        ]);
        assert_eq!(login_context(&map).as_deref(), Some("ctx_from_cookie"));

        assert_eq!(login_context(&HeaderMap::new()), None);
    }

    #[test]
    fn test_login_context_rejects_odd_values() {
        let too_long = "a".repeat(65);
        for bad in ["short", "has space in it", "semi;colon;value", too_long.as_str()] {
            let map = headers(&[("x-login-context", bad)]);
            assert_eq!(login_context(&map), None, "accepted {:?}", bad);
        }
    }
}
