//! Browser login through the configured OpenID Connect provider.
//!
//! `/login` redirects to the provider with a random `state` kept in a
//! cookie; `/callback` checks it, exchanges the code and returns the tokens.
use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AuthError;
use crate::services::auth::OidcValidator;
use crate::state::AppState;

const STATE_COOKIE: &str = "oidc_state";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(login))
        .route("/callback", get(callback))
}

fn provider(state: &AppState) -> Result<&OidcValidator, AuthError> {
    state
        .oidc
        .as_deref()
        .ok_or_else(|| AuthError::not_implemented("oidc login is not configured"))
}

async fn login(State(state): State<AppState>) -> Result<Response, AuthError> {
    let oidc = provider(&state)?;
    let csrf = Uuid::new_v4().simple().to_string();
    let location = oidc.authorization_url(&csrf)?;

    let cookie = format!("{STATE_COOKIE}={csrf}; Path=/auth/oidc; HttpOnly; SameSite=Lax; Max-Age=600");
    let mut response = StatusCode::FOUND.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::LOCATION,
        HeaderValue::from_str(&location)
            .map_err(|e| AuthError::external("invalid authorization url").with_source(e))?,
    );
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&cookie)
            .map_err(|e| AuthError::invalid_config("invalid state cookie").with_source(e))?,
    );
    Ok(response)
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct CallbackResponse {
    user_id: String,
    is_admin: bool,
    access_token: String,
    token_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    id_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_in: Option<u64>,
}

async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Result<Json<CallbackResponse>, AuthError> {
    let oidc = provider(&state)?;

    if let Some(error) = params.error {
        warn!(%error, "provider returned an authorization error");
        return Err(AuthError::unauthorized("authorization was denied").with_detail("error", error));
    }

    let expected = state_cookie(&headers)
        .ok_or_else(|| AuthError::unauthorized("missing login state"))?;
    if params.state.as_deref() != Some(expected) {
        return Err(AuthError::unauthorized("login state mismatch"));
    }
    let code = params
        .code
        .ok_or_else(|| AuthError::invalid_token("authorization code is required"))?;

    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let tokens = oidc.exchange(&cancel, &code).await?;

    // Prefer the ID token for identity; fall back to userinfo.
    let (user_id, roles) = match &tokens.id_token {
        Some(id_token) => {
            let claims = oidc.validate_token(&cancel, id_token).await?;
            (claims.user_id, claims.roles)
        }
        None => {
            let info = oidc.user_info(&cancel, &tokens.access_token).await?;
            (info.sub, info.roles)
        }
    };
    guard.disarm();

    let is_admin = oidc.is_admin(&roles);
    info!(%user_id, is_admin, "oidc login completed");

    Ok(Json(CallbackResponse {
        user_id,
        is_admin,
        access_token: tokens.access_token,
        token_type: tokens.token_type,
        id_token: tokens.id_token,
        refresh_token: tokens.refresh_token,
        expires_in: tokens.expires_in,
    }))
}

fn state_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == STATE_COOKIE)
        .map(|(_, value)| value)
}
