//! API route handlers.

pub mod auth;
pub mod me;

use crate::auth::middleware::AppState;
use crate::middleware::security_headers;
use axum::{routing::get, routing::post, Router};

/// Build the API router with all endpoints.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/nonce", get(auth::issue_nonce))
        .route("/api/auth/verify", post(auth::verify))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/me", get(me::me))
}

/// The API router with security headers, bound to `state`.
pub fn app(state: AppState) -> Router {
    api_router()
        .layer(axum::middleware::from_fn(security_headers))
        .with_state(state)
}
