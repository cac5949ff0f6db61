//! Bearer token validation → identity in the request extensions.
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, Request, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::AuthError;
use crate::services::auth::context::{self, AuthCtx};
use crate::services::auth::pipeline::ValidationPipeline;

const BEARER_PREFIX: &str = "Bearer ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiddlewareConfig {
    /// Path prefixes served without authentication.
    pub skip_paths: Vec<String>,
    /// When false, requests without an `Authorization` header pass through
    /// unauthenticated. A header that is present is always validated.
    pub require_auth: bool,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self {
            skip_paths: vec!["/health".into()],
            require_auth: true,
        }
    }
}

impl MiddlewareConfig {
    pub fn should_skip(&self, path: &str) -> bool {
        self.skip_paths
            .iter()
            .any(|prefix| !prefix.is_empty() && path.starts_with(prefix.as_str()))
    }
}

/// State for [`apply`]: the validator chain plus dispatch settings.
#[derive(Debug, Clone)]
pub struct AuthMiddleware {
    pipeline: Arc<ValidationPipeline>,
    config: Arc<MiddlewareConfig>,
}

impl AuthMiddleware {
    pub fn new(pipeline: Arc<ValidationPipeline>, config: MiddlewareConfig) -> Self {
        Self {
            pipeline,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &MiddlewareConfig {
        &self.config
    }
}

/// Put token authentication in front of every route of `router`.
///
/// ```ignore
/// let app = middleware::auth::access::apply(app, state.auth.clone());
/// ```
pub fn apply<S>(router: Router<S>, auth: AuthMiddleware) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(middleware::from_fn_with_state(auth, access_middleware))
}

async fn access_middleware(
    State(auth): State<AuthMiddleware>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if auth.config.should_skip(req.uri().path()) {
        return next.run(req).await;
    }

    let token = match bearer_token(req.headers()) {
        Ok(Some(token)) => token,
        Ok(None) if !auth.config.require_auth => return next.run(req).await,
        Ok(None) => return reject(&AuthError::missing_token()),
        Err(err) => return reject(&err),
    };

    // Cancelled if this future is dropped, e.g. when the client goes away.
    let cancel = req
        .extensions()
        .get::<CancellationToken>()
        .map(CancellationToken::child_token)
        .unwrap_or_default();
    let guard = cancel.clone().drop_guard();
    let result = auth.pipeline.validate(&cancel, &token).await;
    guard.disarm();

    match result {
        Ok(claims) => {
            debug!(user_id = %claims.user_id, "request authenticated");
            context::with_identity(req.extensions_mut(), AuthCtx::from(claims));
            next.run(req).await
        }
        Err(err) => {
            warn!(error = %err, kind = %err.kind(), "access token rejected");
            reject(&err)
        }
    }
}

/// `Ok(None)` when no `Authorization` header is present.
fn bearer_token(headers: &HeaderMap) -> Result<Option<String>, AuthError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| AuthError::invalid_token("authorization header is not valid text"))?;
    let token = value
        .strip_prefix(BEARER_PREFIX)
        .ok_or_else(|| AuthError::invalid_token("authorization header is not a bearer token"))?
        .trim();
    if token.is_empty() {
        return Err(AuthError::missing_token());
    }
    Ok(Some(token.to_string()))
}

fn reject(err: &AuthError) -> Response {
    let mut response =
        (StatusCode::UNAUTHORIZED, err.kind().rejection_message()).into_response();
    response
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    response
}
