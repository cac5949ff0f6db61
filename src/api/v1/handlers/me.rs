use axum::Json;
use serde::Serialize;

use crate::api::v1::extractors::AuthCtxExtractor;

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user_id: String,
    pub roles: Vec<String>,
    pub scopes: Vec<String>,
    pub resources: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

pub async fn me(AuthCtxExtractor(ctx): AuthCtxExtractor) -> Json<MeResponse> {
    Json(MeResponse {
        user_id: ctx.user_id().to_string(),
        roles: ctx.roles().to_vec(),
        scopes: ctx.scopes().to_vec(),
        resources: ctx.resources().to_vec(),
        email: ctx.email().map(str::to_string),
        name: ctx.name().map(str::to_string),
    })
}
