//! Delegates token verification to an external HTTP validation endpoint.
//!
//! Contract: `POST {"token": "..."}` answered by
//! `{"valid": bool, "user_id": "...", "roles": [...], "scopes": [...], "error": "..."}`.
use std::fmt;
use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use url::Url;

use crate::error::AuthError;
use crate::services::auth::claims::Claims;
use crate::services::auth::retry::Cancelled;

#[derive(Clone)]
pub struct RemoteConfig {
    pub validation_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub timeout: Duration,
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("validation_url", &self.validation_url)
            .field("client_id", &self.client_id)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RemoteConfig {
    pub fn new(validation_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            validation_url: validation_url.into(),
            client_id: String::new(),
            client_secret: String::new(),
            timeout,
        }
    }

    pub fn with_client_credentials(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.client_id = client_id.into();
        self.client_secret = client_secret.into();
        self
    }

    pub fn validate(&self) -> Result<Url, AuthError> {
        if self.timeout.is_zero() {
            return Err(AuthError::invalid_config("remote validation timeout must be positive"));
        }
        Url::parse(&self.validation_url).map_err(|e| {
            AuthError::invalid_config("remote validation url is invalid").with_source(e)
        })
    }
}

#[derive(Serialize)]
struct ValidationRequest<'a> {
    token: &'a str,
}

#[derive(Debug, Deserialize)]
struct ValidationResponse {
    valid: bool,
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    roles: Vec<String>,
    #[serde(default)]
    scopes: Vec<String>,
    #[serde(default)]
    resources: Vec<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RemoteValidator {
    client: reqwest::Client,
    url: Url,
    client_id: String,
    client_secret: String,
    timeout: Duration,
}

impl RemoteValidator {
    pub fn new(config: &RemoteConfig) -> Result<Self, AuthError> {
        let url = config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AuthError::invalid_config("failed to build http client").with_source(e))?;

        Ok(Self {
            client,
            url,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            timeout: config.timeout,
        })
    }

    #[instrument(skip_all, fields(validator = "remote", url = %self.url))]
    pub async fn validate_token(
        &self,
        cancel: &CancellationToken,
        token: &str,
    ) -> Result<Claims, AuthError> {
        if token.trim().is_empty() {
            return Err(AuthError::missing_token());
        }

        let mut request = self
            .client
            .post(self.url.clone())
            .timeout(self.timeout)
            .json(&ValidationRequest { token });
        if !self.client_id.is_empty() {
            request = request.basic_auth(&self.client_id, Some(&self.client_secret));
        }

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(Cancelled.into()),
            res = request.send() => res.map_err(|e| {
                AuthError::external("remote validation request failed").with_source(e)
            })?,
        };

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_IMPLEMENTED => {
                return Err(AuthError::not_implemented(
                    "remote validation is not implemented by the endpoint",
                ));
            }
            status => {
                return Err(AuthError::invalid_token("remote validation rejected the token")
                    .with_detail("status", status.as_u16().to_string()));
            }
        }

        let body: ValidationResponse = tokio::select! {
            _ = cancel.cancelled() => return Err(Cancelled.into()),
            res = response.json::<ValidationResponse>() => res.map_err(|e| {
                AuthError::external("malformed remote validation response").with_source(e)
            })?,
        };

        if !body.valid {
            let mut err = AuthError::invalid_token("remote validation reported an invalid token");
            if let Some(reason) = body.error {
                err = err.with_detail("reason", reason);
            }
            return Err(err);
        }

        Claims {
            user_id: body.user_id,
            roles: body.roles,
            scopes: body.scopes,
            resources: body.resources,
            ..Claims::default()
        }
        .ensure_subject()
    }
}
