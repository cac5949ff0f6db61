//! Self-contained signed tokens: issuing and local verification.
//!
//! Tokens are compact JWS values carrying the registered claims
//! (`sub`, `iss`, `iat`, `nbf`, `exp`) plus `roles`, `scopes` and `resources`.
//! Verification only accepts algorithms from the configured family so an
//! HMAC deployment cannot be fed an RSA/ECDSA-signed token and vice versa.
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::AuthError;
use crate::services::auth::claims::Claims;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    Hmac,
    Rsa,
    Ecdsa,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SigningMethod {
    #[default]
    Hs256,
    Hs384,
    Hs512,
    Rs256,
    Rs384,
    Rs512,
    Es256,
    Es384,
}

impl SigningMethod {
    pub fn algorithm(self) -> Algorithm {
        match self {
            Self::Hs256 => Algorithm::HS256,
            Self::Hs384 => Algorithm::HS384,
            Self::Hs512 => Algorithm::HS512,
            Self::Rs256 => Algorithm::RS256,
            Self::Rs384 => Algorithm::RS384,
            Self::Rs512 => Algorithm::RS512,
            Self::Es256 => Algorithm::ES256,
            Self::Es384 => Algorithm::ES384,
        }
    }

    pub fn family(self) -> KeyFamily {
        match self {
            Self::Hs256 | Self::Hs384 | Self::Hs512 => KeyFamily::Hmac,
            Self::Rs256 | Self::Rs384 | Self::Rs512 => KeyFamily::Rsa,
            Self::Es256 | Self::Es384 => KeyFamily::Ecdsa,
        }
    }

    /// Algorithms accepted when verifying a token signed by this method's family.
    fn accepted_algorithms(self) -> Vec<Algorithm> {
        match self.family() {
            KeyFamily::Hmac => vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512],
            KeyFamily::Rsa => vec![
                Algorithm::RS256,
                Algorithm::RS384,
                Algorithm::RS512,
                Algorithm::PS256,
                Algorithm::PS384,
                Algorithm::PS512,
            ],
            KeyFamily::Ecdsa => vec![Algorithm::ES256, Algorithm::ES384],
        }
    }
}

impl FromStr for SigningMethod {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HS256" => Ok(Self::Hs256),
            "HS384" => Ok(Self::Hs384),
            "HS512" => Ok(Self::Hs512),
            "RS256" => Ok(Self::Rs256),
            "RS384" => Ok(Self::Rs384),
            "RS512" => Ok(Self::Rs512),
            "ES256" => Ok(Self::Es256),
            "ES384" => Ok(Self::Es384),
            other => Err(AuthError::invalid_config(format!(
                "unsupported signing method: {other}"
            ))),
        }
    }
}

/// Upper bound for [`JwtConfig::token_duration`].
pub const MAX_TOKEN_DURATION: Duration = Duration::from_secs(366 * 24 * 60 * 60);

#[derive(Clone)]
pub struct JwtConfig {
    /// HMAC secret, or the PEM private key for RSA/ECDSA methods.
    pub secret_key: String,
    /// PEM public key used to verify RSA/ECDSA tokens.
    pub public_key_pem: Option<String>,
    pub token_duration: Duration,
    pub issuer: String,
    pub signing_method: SigningMethod,
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Do not print key material
        f.debug_struct("JwtConfig")
            .field("token_duration", &self.token_duration)
            .field("issuer", &self.issuer)
            .field("signing_method", &self.signing_method)
            .finish()
    }
}

impl JwtConfig {
    pub fn new(secret_key: impl Into<String>, issuer: impl Into<String>, token_duration: Duration) -> Self {
        Self {
            secret_key: secret_key.into(),
            public_key_pem: None,
            token_duration,
            issuer: issuer.into(),
            signing_method: SigningMethod::default(),
        }
    }

    pub fn with_signing_method(mut self, method: SigningMethod) -> Self {
        self.signing_method = method;
        self
    }

    pub fn with_public_key_pem(mut self, pem: impl Into<String>) -> Self {
        self.public_key_pem = Some(pem.into());
        self
    }

    pub fn validate(&self) -> Result<(), AuthError> {
        if self.secret_key.is_empty() {
            return Err(AuthError::invalid_config("jwt secret key is required"));
        }
        if self.token_duration.is_zero() {
            return Err(AuthError::invalid_config("jwt token duration must be positive"));
        }
        if self.token_duration > MAX_TOKEN_DURATION {
            return Err(AuthError::invalid_config("jwt token duration is too long")
                .with_detail("max_secs", MAX_TOKEN_DURATION.as_secs().to_string()));
        }
        if self.signing_method.family() != KeyFamily::Hmac
            && self.public_key_pem.as_deref().is_none_or(str::is_empty)
        {
            return Err(AuthError::invalid_config(
                "a public key is required for asymmetric signing methods",
            ));
        }
        Ok(())
    }
}

/// Wire form of the token payload.
#[derive(Debug, Serialize, Deserialize)]
struct TokenClaims {
    #[serde(default)]
    sub: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    iss: String,
    #[serde(default)]
    iat: Option<i64>,
    #[serde(default)]
    nbf: Option<i64>,
    exp: i64,
    #[serde(default)]
    roles: Vec<String>,
    #[serde(default)]
    scopes: Vec<String>,
    #[serde(default)]
    resources: Vec<String>,
}

impl From<TokenClaims> for Claims {
    fn from(c: TokenClaims) -> Self {
        Claims {
            user_id: c.sub,
            roles: c.roles,
            scopes: c.scopes,
            resources: c.resources,
            issuer: c.iss,
            issued_at: c.iat,
            not_before: c.nbf,
            expires_at: Some(c.exp),
            email: None,
            name: None,
        }
    }
}

#[derive(Deserialize)]
struct PeekedExpiry {
    #[serde(default)]
    exp: Option<i64>,
}

/// Issues tokens and verifies them with locally held key material.
#[derive(Clone)]
pub struct LocalValidator {
    issuer: String,
    token_duration: Duration,
    signing_method: SigningMethod,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl fmt::Debug for LocalValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Do not print key material
        f.debug_struct("LocalValidator")
            .field("issuer", &self.issuer)
            .field("signing_method", &self.signing_method)
            .field("validation", &self.validation)
            .finish()
    }
}

impl LocalValidator {
    pub fn new(config: &JwtConfig) -> Result<Self, AuthError> {
        config.validate()?;

        let method = config.signing_method;
        let (encoding_key, decoding_key) = match method.family() {
            KeyFamily::Hmac => (
                EncodingKey::from_secret(config.secret_key.as_bytes()),
                DecodingKey::from_secret(config.secret_key.as_bytes()),
            ),
            KeyFamily::Rsa => (
                EncodingKey::from_rsa_pem(config.secret_key.as_bytes())
                    .map_err(|e| key_error("rsa private key", e))?,
                DecodingKey::from_rsa_pem(public_pem(config)?)
                    .map_err(|e| key_error("rsa public key", e))?,
            ),
            KeyFamily::Ecdsa => (
                EncodingKey::from_ec_pem(config.secret_key.as_bytes())
                    .map_err(|e| key_error("ec private key", e))?,
                DecodingKey::from_ec_pem(public_pem(config)?)
                    .map_err(|e| key_error("ec public key", e))?,
            ),
        };

        let mut validation = Validation::new(method.algorithm());
        validation.algorithms = method.accepted_algorithms();
        validation.validate_nbf = true;
        validation.validate_aud = false;
        validation.leeway = 0;
        if !config.issuer.is_empty() {
            validation.set_issuer(&[config.issuer.as_str()]);
        }

        Ok(Self {
            issuer: config.issuer.clone(),
            token_duration: config.token_duration,
            signing_method: method,
            encoding_key,
            decoding_key,
            validation,
        })
    }

    pub fn signing_method(&self) -> SigningMethod {
        self.signing_method
    }

    pub fn token_duration(&self) -> Duration {
        self.token_duration
    }

    pub fn generate_token(
        &self,
        user_id: &str,
        roles: Vec<String>,
        scopes: Vec<String>,
        resources: Vec<String>,
    ) -> Result<String, AuthError> {
        if user_id.trim().is_empty() {
            return Err(AuthError::invalid_claims("user id is required"));
        }

        let now = chrono::Utc::now().timestamp();
        let exp = i64::try_from(self.token_duration.as_secs())
            .ok()
            .and_then(|secs| now.checked_add(secs))
            .ok_or_else(|| AuthError::invalid_config("jwt token duration out of range"))?;
        let claims = TokenClaims {
            sub: user_id.to_string(),
            iss: self.issuer.clone(),
            iat: Some(now),
            nbf: Some(now),
            exp,
            roles,
            scopes,
            resources,
        };

        let mut header = Header::new(self.signing_method.algorithm());
        header.typ = Some("JWT".to_string());
        jsonwebtoken::encode(&header, &claims, &self.encoding_key).map_err(|e| {
            tracing::error!(error = %e, "failed to sign token");
            AuthError::invalid_config("failed to sign token").with_source(e)
        })
    }

    #[instrument(skip_all, fields(validator = "local"))]
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::missing_token());
        }

        let header = jsonwebtoken::decode_header(token)
            .map_err(|e| AuthError::invalid_token("malformed token header").with_source(e))?;
        if !self.validation.algorithms.contains(&header.alg) {
            return Err(AuthError::invalid_signature("unexpected signing method")
                .with_detail("alg", format!("{:?}", header.alg)));
        }

        // Expiry is reported before the signature check.
        if let Some(exp) = peek_expiry(token)? {
            if exp < chrono::Utc::now().timestamp() {
                return Err(AuthError::expired_token());
            }
        }

        let data = jsonwebtoken::decode::<TokenClaims>(token, &self.decoding_key, &self.validation)?;
        Claims::from(data.claims).ensure_subject()
    }

    /// Validates `token` and issues a fresh one for the same identity.
    pub fn refresh_token(&self, token: &str) -> Result<String, AuthError> {
        let claims = self.validate_token(token)?;
        self.generate_token(&claims.user_id, claims.roles, claims.scopes, claims.resources)
    }
}

fn public_pem(config: &JwtConfig) -> Result<&[u8], AuthError> {
    config
        .public_key_pem
        .as_deref()
        .map(str::as_bytes)
        .ok_or_else(|| AuthError::invalid_config("public key is required"))
}

fn key_error(what: &str, err: jsonwebtoken::errors::Error) -> AuthError {
    AuthError::invalid_config(format!("invalid {what}")).with_source(err)
}

/// Reads `exp` from the unverified payload segment.
fn peek_expiry(token: &str) -> Result<Option<i64>, AuthError> {
    let mut segments = token.split('.');
    let (Some(_), Some(payload), Some(_), None) =
        (segments.next(), segments.next(), segments.next(), segments.next())
    else {
        return Err(AuthError::invalid_token("token must have three segments"));
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| AuthError::invalid_token("malformed token payload").with_source(e))?;
    let peeked: PeekedExpiry = serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::invalid_token("malformed token payload").with_source(e))?;
    Ok(peeked.exp)
}
