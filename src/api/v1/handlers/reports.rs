use axum::{
    Json,
    extract::{Path, State},
    http::Extensions,
};
use serde_json::{Value, json};

use crate::error::AuthError;
use crate::services::auth::context;
use crate::state::AppState;

const REPORT_ROLES: &[&str] = &["analyst", "admin"];
const REPORT_SCOPES: &[&str] = &["reports:read"];

/// Report access needs a reporting role, the `reports:read` scope and the
/// requested resource in the caller's resource set.
pub async fn get_report(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    extensions: Extensions,
) -> Result<Json<Value>, AuthError> {
    let user_id = context::get_user_id(&extensions)
        .ok_or_else(|| AuthError::unauthorized("no identity on request"))?;

    if !state
        .authz
        .is_authorized_with_scopes(&extensions, REPORT_ROLES, REPORT_SCOPES, &resource)
    {
        return Err(AuthError::forbidden("report access denied")
            .with_detail("resource", resource)
            .with_detail("user_id", user_id));
    }

    Ok(Json(json!({
        "resource": resource,
        "requested_by": user_id,
    })))
}
