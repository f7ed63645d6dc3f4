//! Session-protected endpoints.

use crate::auth::middleware::AuthSession;
use crate::models::MeResponse;
use axum::Json;

/// GET /api/me: Identity behind the current session
pub async fn me(session: AuthSession) -> Json<MeResponse> {
    Json(MeResponse {
        address: session.address,
        user_id: session.user_id,
    })
}
