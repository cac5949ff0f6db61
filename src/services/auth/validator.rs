use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{AuthError, ErrorKind};
use crate::services::auth::claims::Claims;
use crate::services::auth::jwt::LocalValidator;
use crate::services::auth::remote::RemoteValidator;

/// A backend that turns an opaque bearer token into verified [`Claims`].
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &'static str;

    async fn validate(&self, cancel: &CancellationToken, token: &str) -> Result<Claims, AuthError>;
}

#[async_trait]
impl TokenValidator for LocalValidator {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn validate(&self, _cancel: &CancellationToken, token: &str) -> Result<Claims, AuthError> {
        self.validate_token(token)
    }
}

#[async_trait]
impl TokenValidator for RemoteValidator {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn validate(&self, cancel: &CancellationToken, token: &str) -> Result<Claims, AuthError> {
        self.validate_token(cancel, token).await
    }
}

/// Remote validation with local verification as the fallback.
#[derive(Debug, Clone)]
pub struct JwtValidator {
    remote: Option<RemoteValidator>,
    local: LocalValidator,
}

impl JwtValidator {
    pub fn new(local: LocalValidator) -> Self {
        Self {
            remote: None,
            local,
        }
    }

    pub fn with_remote(mut self, remote: RemoteValidator) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn local(&self) -> &LocalValidator {
        &self.local
    }
}

#[async_trait]
impl TokenValidator for JwtValidator {
    fn name(&self) -> &'static str {
        "jwt"
    }

    async fn validate(&self, cancel: &CancellationToken, token: &str) -> Result<Claims, AuthError> {
        if let Some(remote) = &self.remote {
            match remote.validate_token(cancel, token).await {
                Ok(claims) => return Ok(claims),
                Err(err) if err.kind() == ErrorKind::NotImplemented => {
                    debug!("remote validation not implemented, using local validation");
                }
                Err(err) => {
                    warn!(error = %err, "remote validation failed, falling back to local validation");
                }
            }
        }
        self.local.validate_token(token)
    }
}
