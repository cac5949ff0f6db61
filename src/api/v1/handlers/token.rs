use axum::{
    Json,
    extract::State,
    http::{HeaderMap, header},
};
use serde::Serialize;

use crate::error::AuthError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
}

/// Re-issues a locally signed token with a fresh lifetime.
///
/// Only tokens the local signer can verify are refreshable; OIDC ID tokens
/// fail here even though the access middleware accepted them.
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<RefreshResponse>, AuthError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(AuthError::missing_token)?;

    let token = state.local.refresh_token(token.trim())?;
    Ok(Json(RefreshResponse {
        token,
        token_type: "Bearer",
        expires_in: state.local.token_duration().as_secs(),
    }))
}
