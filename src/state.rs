/*
 * Responsibility
 * - Shared context handed to the Router (cheap to Clone)
 */
use std::sync::Arc;

use crate::api::v1::handlers::items::ItemStore;
use crate::middleware::auth::AuthMiddleware;
use crate::services::auth::{LocalValidator, OidcValidator};
use crate::services::authz::AuthorizationEngine;

/// Shared router state. Everything inside is cheap to clone.
#[derive(Clone, Debug)]
pub struct AppState {
    pub auth: AuthMiddleware,
    pub authz: Arc<AuthorizationEngine>,
    pub local: Arc<LocalValidator>,
    pub oidc: Option<Arc<OidcValidator>>,
    pub items: ItemStore,
}
