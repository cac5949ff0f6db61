use axum::{
    Router,
    routing::{delete, get, post},
};

use crate::api::v1::handlers::{
    items::{delete_item, list_items},
    me::me,
    reports::get_report,
    token::refresh,
};
use crate::middleware::auth::require_operation;
use crate::state::AppState;

/// Routes under `/api/v1`. Every route expects the access middleware in front.
pub fn routes(state: &AppState) -> Router<AppState> {
    let authz = state.authz.clone();

    Router::new()
        .route("/me", get(me))
        .route("/token/refresh", post(refresh))
        .route(
            "/items",
            require_operation(get(list_items), authz.clone(), "list:items"),
        )
        .route(
            "/items/{id}",
            require_operation(delete(delete_item), authz, "delete:items"),
        )
        .route("/reports/{resource}", get(get_report))
}
