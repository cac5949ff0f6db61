//! Ordered validator fallback chain used by the access middleware.
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::error::AuthError;
use crate::services::auth::claims::Claims;
use crate::services::auth::validator::TokenValidator;

/// Tries validators in priority order and stops at the first success.
///
/// On total failure the error of the last (lowest-priority) validator is
/// returned, so it decides the message the client sees.
#[derive(Clone)]
pub struct ValidationPipeline {
    validators: Vec<Arc<dyn TokenValidator>>,
}

impl std::fmt::Debug for ValidationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.validators.iter().map(|v| v.name()))
            .finish()
    }
}

impl ValidationPipeline {
    pub fn new(validators: Vec<Arc<dyn TokenValidator>>) -> Result<Self, AuthError> {
        if validators.is_empty() {
            return Err(AuthError::invalid_config("at least one token validator is required"));
        }
        Ok(Self { validators })
    }

    pub fn validator_names(&self) -> Vec<&'static str> {
        self.validators.iter().map(|v| v.name()).collect()
    }

    #[instrument(skip_all, fields(accepted_by = tracing::field::Empty))]
    pub async fn validate(
        &self,
        cancel: &CancellationToken,
        token: &str,
    ) -> Result<Claims, AuthError> {
        let mut last_err = None;

        for validator in &self.validators {
            match validator.validate(cancel, token).await {
                Ok(claims) => {
                    tracing::Span::current().record("accepted_by", validator.name());
                    debug!(validator = validator.name(), user_id = %claims.user_id, "token accepted");
                    return Ok(claims);
                }
                Err(err) => {
                    debug!(validator = validator.name(), error = %err, "token rejected");
                    last_err = Some(err);
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| AuthError::invalid_config("no token validators configured")))
    }
}
