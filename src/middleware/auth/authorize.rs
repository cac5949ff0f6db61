//! Per-route RBAC guard.
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::MethodRouter,
};

use crate::services::authz::AuthorizationEngine;

#[derive(Debug, Clone)]
struct OperationGuard {
    engine: Arc<AuthorizationEngine>,
    operation: &'static str,
}

/// Only let the request through when the authenticated identity may perform
/// `operation`. Must run behind the access middleware.
///
/// ```ignore
/// .route("/items/{id}", require_operation(delete(delete_item), engine, "delete:items"))
/// ```
pub fn require_operation<S>(
    route: MethodRouter<S>,
    engine: Arc<AuthorizationEngine>,
    operation: &'static str,
) -> MethodRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    route.route_layer(middleware::from_fn_with_state(
        OperationGuard { engine, operation },
        operation_guard,
    ))
}

async fn operation_guard(
    State(guard): State<OperationGuard>,
    req: Request<Body>,
    next: Next,
) -> Response {
    match guard.engine.is_authorized(req.extensions(), guard.operation) {
        Ok(true) => next.run(req).await,
        Ok(false) => crate::error::AuthError::forbidden("operation not permitted")
            .with_detail("operation", guard.operation)
            .into_response(),
        Err(err) => {
            tracing::info!(error = %err, operation = guard.operation, "authorization denied");
            err.into_response()
        }
    }
}
