//! Auth API endpoints.

use crate::auth::message::{format_timestamp, MESSAGE_VERSION};
use crate::auth::middleware::{
    login_context, AppState, AuthSession, CONTEXT_COOKIE, SESSION_COOKIE,
};
use crate::auth::session::generate_context_id;
use crate::config::Config;
use crate::error::AppError;
use crate::models::{NonceResponse, VerifyRequest, VerifyResponse};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};

/// `Set-Cookie` value for an HttpOnly, same-site cookie. `Secure` is added when the
/// login URI is served over https.
pub fn cookie(config: &Config, name: &str, value: &str, max_age_secs: u64) -> String {
    let secure = if config.login_uri.starts_with("https://") {
        "; Secure"
    } else {
        ""
    };
    format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Strict{}",
        name, value, max_age_secs, secure
    )
}

/// Whether the request's `Host` is the domain challenges are bound to.
///
/// Always true when host matching is disabled (e.g. behind a proxy that rewrites it).
fn host_matches(config: &Config, headers: &HeaderMap) -> bool {
    if !config.enforce_host_match {
        return true;
    }
    headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|host| host.eq_ignore_ascii_case(&config.domain))
}

/// GET /api/auth/nonce: Issue a sign-in challenge for this login context
pub async fn issue_nonce(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    if !host_matches(&state.config, &headers) {
        tracing::warn!(
            action = "host_mismatch",
            endpoint = "auth/nonce",
            "Request host does not match configured domain"
        );
        return Err(AppError::BadRequest("Unexpected host".to_string()));
    }

    let context_id = login_context(&headers).unwrap_or_else(generate_context_id);

    let challenge = state.auth.issue_challenge(&context_id).await.map_err(|e| {
        AppError::Internal(format!("Challenge issuance failed: {}", e))
    })?;
    let message = challenge.message;

    let set_cookie = cookie(
        &state.config,
        CONTEXT_COOKIE,
        &context_id,
        state.config.nonce_ttl_secs,
    );

    let body = NonceResponse {
        nonce: message.nonce,
        context: context_id,
        domain: message.domain,
        uri: message.uri,
        statement: message.statement,
        version: MESSAGE_VERSION.to_string(),
        chain_id: message.chain_id,
        issued_at: format_timestamp(&message.issued_at),
        expiration_time: message.expiration_time.as_ref().map(format_timestamp),
    };

    Ok(([(header::SET_COOKIE, set_cookie)], Json(body)))
}

/// POST /api/auth/verify: Verify a signed challenge and create a session
///
/// A body that does not decode gets the same generic failure as a bad signature.
pub async fn verify(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    if !host_matches(&state.config, &headers) {
        tracing::warn!(
            action = "auth_failed",
            kind = "host_mismatch",
            "Request host does not match configured domain"
        );
        return Err(AppError::AuthenticationFailed);
    }

    let Json(req) = payload.map_err(|rejection| {
        tracing::warn!(
            action = "auth_failed",
            kind = "bad_request",
            status = rejection.status().as_u16(),
            reason = %rejection.body_text(),
            "Verify request body rejected"
        );
        AppError::AuthenticationFailed
    })?;

    let context_id = login_context(&headers).ok_or_else(|| {
        tracing::warn!(
            action = "auth_failed",
            kind = "missing_context",
            "No login context on request"
        );
        AppError::AuthenticationFailed
    })?;

    let login = state.auth.verify_and_login(&context_id, &req).await?;

    let set_cookie = cookie(
        &state.config,
        SESSION_COOKIE,
        &login.session.token,
        state.config.session_ttl_secs,
    );

    Ok((
        [(header::SET_COOKIE, set_cookie)],
        Json(VerifyResponse {
            ok: true,
            address: Some(login.identity.address),
        }),
    ))
}

/// POST /api/auth/logout: Invalidate current session
pub async fn logout(
    session: AuthSession,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    state.sessions().revoke_session(&session.token).await?;

    tracing::info!(action = "logout", user_id = %session.user_id, "User logged out");

    let clear = cookie(&state.config, SESSION_COOKIE, "", 0);
    Ok((StatusCode::NO_CONTENT, [(header::SET_COOKIE, clear)]))
}
