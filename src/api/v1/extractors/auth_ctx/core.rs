use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AuthError;
use crate::services::auth::context;

use super::AuthCtx;

/// Identity of an authenticated request.
///
/// Rejects with 401 when the access middleware did not run or let the
/// request through unauthenticated.
#[derive(Debug, Clone)]
pub struct AuthCtxExtractor(pub AuthCtx);

impl<S> FromRequestParts<S> for AuthCtxExtractor
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        context::get_identity(&parts.extensions)
            .cloned()
            .map(AuthCtxExtractor)
            .ok_or_else(|| AuthError::unauthorized("no identity on request"))
    }
}

/// Identity when present; for routes that also serve anonymous callers.
#[derive(Debug, Clone)]
pub struct OptionalAuthCtx(pub Option<AuthCtx>);

impl<S> FromRequestParts<S> for OptionalAuthCtx
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalAuthCtx(context::get_identity(&parts.extensions).cloned()))
    }
}
