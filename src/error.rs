/*
 * Responsibility
 * - ErrorKind / AuthError shared by validators, middleware and the authorization engine
 * - kind -> HTTP status and client-facing message (message, details, source stay internal)
 * - jsonwebtoken::errors::Error -> ErrorKind
 * - IntoResponse
 */
use std::collections::BTreeMap;
use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MissingToken,
    ExpiredToken,
    InvalidSignature,
    InvalidClaims,
    InvalidToken,
    InvalidConfig,
    Unauthorized,
    Forbidden,
    NotImplemented,
    ExternalServiceError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingToken => "missing_token",
            Self::ExpiredToken => "expired_token",
            Self::InvalidSignature => "invalid_signature",
            Self::InvalidClaims => "invalid_claims",
            Self::InvalidToken => "invalid_token",
            Self::InvalidConfig => "invalid_config",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotImplemented => "not_implemented",
            Self::ExternalServiceError => "external_service_error",
        }
    }

    /// Status code and plain-text body for this kind at an HTTP boundary.
    pub fn http_parts(&self) -> (StatusCode, &'static str) {
        match self {
            Self::MissingToken | Self::Unauthorized => {
                (StatusCode::UNAUTHORIZED, "Authorization required")
            }
            Self::ExpiredToken => (StatusCode::UNAUTHORIZED, "Token expired"),
            Self::InvalidSignature => (StatusCode::UNAUTHORIZED, "Invalid token signature"),
            Self::InvalidClaims => (StatusCode::UNAUTHORIZED, "Invalid token claims"),
            Self::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid token"),
            Self::Forbidden => (StatusCode::FORBIDDEN, "Forbidden"),
            Self::InvalidConfig => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
            Self::NotImplemented => (StatusCode::NOT_IMPLEMENTED, "Not implemented"),
            Self::ExternalServiceError => (StatusCode::BAD_GATEWAY, "Upstream service unavailable"),
        }
    }

    /// Message used when a bearer token is rejected. Always paired with 401.
    pub fn rejection_message(&self) -> &'static str {
        match self.http_parts() {
            (StatusCode::UNAUTHORIZED, message) => message,
            _ => "Invalid token",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct AuthError {
    kind: ErrorKind,
    message: String,
    details: BTreeMap<String, String>,
    #[source]
    source: Option<BoxError>,
}

impl AuthError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: BTreeMap::new(),
            source: None,
        }
    }

    pub fn missing_token() -> Self {
        Self::new(ErrorKind::MissingToken, "token is missing")
    }

    pub fn expired_token() -> Self {
        Self::new(ErrorKind::ExpiredToken, "token has expired")
    }

    pub fn invalid_signature(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidSignature, message)
    }

    pub fn invalid_claims(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidClaims, message)
    }

    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidToken, message)
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidConfig, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotImplemented, message)
    }

    pub fn external(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ExternalServiceError, message)
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> &BTreeMap<String, String> {
        &self.details
    }

    pub fn detail(&self, key: &str) -> Option<&str> {
        self.details.get(key).map(String::as_str)
    }

    pub fn is_transient(&self) -> bool {
        self.kind == ErrorKind::ExternalServiceError
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind as Jwt;

        let base = match err.kind() {
            Jwt::ExpiredSignature => Self::expired_token(),
            Jwt::InvalidSignature | Jwt::InvalidAlgorithm => {
                Self::invalid_signature("token signature verification failed")
            }
            Jwt::InvalidIssuer => Self::invalid_claims("unexpected token issuer"),
            Jwt::InvalidAudience => Self::invalid_claims("unexpected token audience"),
            Jwt::MissingRequiredClaim(claim) => {
                Self::invalid_claims(format!("missing required claim '{claim}'"))
            }
            Jwt::ImmatureSignature => Self::invalid_token("token is not valid yet"),
            _ => Self::invalid_token("malformed token"),
        };
        base.with_source(err)
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, body) = self.kind.http_parts();
        if status.is_server_error() {
            tracing::error!(kind = %self.kind, error = %self, "request failed");
        } else {
            tracing::debug!(kind = %self.kind, error = %self, "request rejected");
        }
        (status, body).into_response()
    }
}
