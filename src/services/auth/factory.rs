//! Builds the validator chain from application `Config`.
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::error::AuthError;
use crate::services::auth::jwt::LocalValidator;
use crate::services::auth::oidc::OidcValidator;
use crate::services::auth::pipeline::ValidationPipeline;
use crate::services::auth::remote::RemoteValidator;
use crate::services::auth::validator::{JwtValidator, TokenValidator};

/// Everything the HTTP layer needs from the authentication side.
#[derive(Debug, Clone)]
pub struct AuthComponents {
    pub local: Arc<LocalValidator>,
    pub oidc: Option<Arc<OidcValidator>>,
    pub pipeline: Arc<ValidationPipeline>,
}

/// Chain order: OIDC (when configured), then JWT (remote, then local).
///
/// OIDC discovery happens here, so an unreachable provider fails startup
/// once the retry budget is spent.
pub async fn build_auth_components(
    config: &Config,
    cancel: &CancellationToken,
) -> Result<AuthComponents, AuthError> {
    let local = LocalValidator::new(&config.jwt)?;

    let mut jwt = JwtValidator::new(local.clone());
    if let Some(remote) = &config.remote {
        jwt = jwt.with_remote(RemoteValidator::new(remote)?);
        info!(url = %remote.validation_url, "remote token validation enabled");
    }

    let oidc = match &config.oidc {
        Some(oidc) => Some(Arc::new(OidcValidator::new(oidc.clone(), cancel).await?)),
        None => None,
    };

    let mut validators: Vec<Arc<dyn TokenValidator>> = Vec::with_capacity(2);
    if let Some(oidc) = &oidc {
        validators.push(oidc.clone());
    }
    validators.push(Arc::new(jwt));

    let pipeline = ValidationPipeline::new(validators)?;
    info!(validators = ?pipeline.validator_names(), "token validation pipeline ready");

    Ok(AuthComponents {
        local: Arc::new(local),
        oidc,
        pipeline: Arc::new(pipeline),
    })
}
