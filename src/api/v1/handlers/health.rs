use axum::{Json, http::StatusCode, response::IntoResponse};
use serde_json::json;

use crate::api::v1::extractors::OptionalAuthCtx;

/// Liveness check. Served from a skip path, so it never carries an identity.
pub async fn health(OptionalAuthCtx(ctx): OptionalAuthCtx) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({"status": "ok", "authenticated": ctx.is_some()})),
    )
}
