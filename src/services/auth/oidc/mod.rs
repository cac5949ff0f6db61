//! OpenID Connect: discovery, ID-token verification, code exchange and userinfo.
//!
//! Every network call goes through the shared [`RetryPolicy`]; only transient
//! failures (transport errors, 5xx, unreadable documents) are retried.
//! Verification failures that another attempt cannot change, such as an
//! expired token or a bad signature, are returned at once.
mod discovery;
mod types;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use parking_lot::RwLock;
use reqwest::Client;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use url::Url;

use crate::error::AuthError;
use crate::services::auth::claims::Claims;
use crate::services::auth::retry::RetryPolicy;
use crate::services::auth::validator::TokenValidator;

pub use types::{OidcConfig, ProviderMetadata, TokenResponse, UserInfo};

use discovery::{discover, fetch_jwks};
use types::IdTokenClaims;

const ID_TOKEN_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
];

/// An unknown `kid` refreshes the key set at most once per this interval.
pub const MIN_JWKS_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

fn is_transient(err: &AuthError) -> bool {
    err.is_transient()
}

pub struct OidcValidator {
    config: OidcConfig,
    client: Client,
    retry: RetryPolicy,
    provider: ProviderMetadata,
    keys: RwLock<KeyCache>,
}

#[derive(Default)]
struct KeyCache {
    set: Option<JwkSet>,
    /// Time of the last successful fetch.
    refreshed_at: Option<Instant>,
}

impl KeyCache {
    fn is_fresh(&self) -> bool {
        self.refreshed_at
            .is_some_and(|at| at.elapsed() < MIN_JWKS_REFRESH_INTERVAL)
    }
}

impl fmt::Debug for OidcValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OidcValidator")
            .field("config", &self.config)
            .field("provider", &self.provider)
            .finish()
    }
}

impl OidcValidator {
    /// Validates the configuration, then discovers the provider.
    pub async fn new(config: OidcConfig, cancel: &CancellationToken) -> Result<Self, AuthError> {
        config.validate()?;

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AuthError::invalid_config("failed to build http client").with_source(e))?;
        let retry = RetryPolicy::new(config.retry);

        let provider = {
            let client = &client;
            let issuer_url = config.issuer_url.as_str();
            let timeout = config.timeout;
            retry
                .run_with(cancel, move || discover(client, issuer_url, timeout), is_transient)
                .await?
        };
        info!(issuer = %provider.issuer, "oidc provider discovered");

        Ok(Self {
            config,
            client,
            retry,
            provider,
            keys: RwLock::new(KeyCache::default()),
        })
    }

    pub fn config(&self) -> &OidcConfig {
        &self.config
    }

    pub fn provider(&self) -> &ProviderMetadata {
        &self.provider
    }

    #[instrument(skip_all, fields(validator = "oidc", user_id = tracing::field::Empty))]
    pub async fn validate_token(
        &self,
        cancel: &CancellationToken,
        token: &str,
    ) -> Result<Claims, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::missing_token());
        }

        let claims = self
            .retry
            .run_with(cancel, move || self.verify_once(token), is_transient)
            .await?;
        tracing::Span::current().record("user_id", claims.user_id.as_str());
        Ok(claims)
    }

    async fn verify_once(&self, token: &str) -> Result<Claims, AuthError> {
        let header = jsonwebtoken::decode_header(token)
            .map_err(|e| AuthError::invalid_token("malformed token header").with_source(e))?;
        if !ID_TOKEN_ALGORITHMS.contains(&header.alg) {
            return Err(AuthError::invalid_signature("unsupported id token algorithm")
                .with_detail("alg", format!("{:?}", header.alg)));
        }

        let key = self.decoding_key(header.kid.as_deref()).await?;

        let mut validation = Validation::new(header.alg);
        validation.set_audience(&[self.config.client_id.as_str()]);
        validation.set_issuer(&[self.provider.issuer.as_str()]);
        validation.validate_nbf = true;

        let data = jsonwebtoken::decode::<IdTokenClaims>(token, &key, &validation)?;
        let id = data.claims;
        Claims {
            user_id: id.sub,
            roles: id.roles,
            scopes: id
                .scope
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            resources: id.resources,
            issuer: id.iss,
            issued_at: id.iat,
            not_before: id.nbf,
            expires_at: id.exp,
            email: id.email,
            name: id.name,
        }
        .ensure_subject()
    }

    /// Key for `kid`. An unknown kid refreshes the cached key set, unless
    /// it was refreshed within [`MIN_JWKS_REFRESH_INTERVAL`].
    async fn decoding_key(&self, kid: Option<&str>) -> Result<DecodingKey, AuthError> {
        if let Some(key) = self.cached_key(kid)? {
            return Ok(key);
        }
        if self.keys.read().is_fresh() {
            debug!(kid = ?kid, "unknown signing key, jwks refreshed recently");
            return Err(AuthError::invalid_signature("no matching signing key"));
        }

        debug!(kid = ?kid, "signing key not cached, refreshing jwks");
        let fresh = fetch_jwks(&self.client, &self.provider.jwks_uri, self.config.timeout).await?;
        *self.keys.write() = KeyCache {
            set: Some(fresh),
            refreshed_at: Some(Instant::now()),
        };

        self.cached_key(kid)?
            .ok_or_else(|| AuthError::invalid_signature("no matching signing key"))
    }

    fn cached_key(&self, kid: Option<&str>) -> Result<Option<DecodingKey>, AuthError> {
        let guard = self.keys.read();
        let Some(set) = guard.set.as_ref() else {
            return Ok(None);
        };
        let jwk = match kid {
            Some(kid) => set.find(kid),
            None => set.keys.first(),
        };
        jwk.map(|jwk| {
            DecodingKey::from_jwk(jwk)
                .map_err(|e| AuthError::invalid_signature("unusable signing key").with_source(e))
        })
        .transpose()
    }

    /// URL the user agent is sent to for the authorization-code flow.
    pub fn authorization_url(&self, state: &str) -> Result<String, AuthError> {
        let mut url = Url::parse(&self.provider.authorization_endpoint).map_err(|e| {
            AuthError::external("invalid authorization endpoint").with_source(e)
        })?;

        let mut scopes = self.config.scopes.clone();
        if !scopes.iter().any(|s| s == "openid") {
            scopes.insert(0, "openid".to_string());
        }

        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_url)
            .append_pair("scope", &scopes.join(" "))
            .append_pair("state", state);
        Ok(url.into())
    }

    #[instrument(skip_all)]
    pub async fn exchange(
        &self,
        cancel: &CancellationToken,
        code: &str,
    ) -> Result<TokenResponse, AuthError> {
        if code.trim().is_empty() {
            return Err(AuthError::invalid_token("authorization code is required"));
        }

        let client = &self.client;
        let config = &self.config;
        let endpoint = self.provider.token_endpoint.as_str();
        self.retry
            .run_with(
                cancel,
                move || request_token(client, config, endpoint, code),
                is_transient,
            )
            .await
    }

    #[instrument(skip_all)]
    pub async fn user_info(
        &self,
        cancel: &CancellationToken,
        access_token: &str,
    ) -> Result<UserInfo, AuthError> {
        if access_token.trim().is_empty() {
            return Err(AuthError::missing_token());
        }
        let endpoint = self
            .provider
            .userinfo_endpoint
            .as_deref()
            .ok_or_else(|| AuthError::not_implemented("provider has no userinfo endpoint"))?;

        let client = &self.client;
        let timeout = self.config.timeout;
        self.retry
            .run_with(
                cancel,
                move || request_user_info(client, endpoint, access_token, timeout),
                is_transient,
            )
            .await
    }

    pub fn is_admin(&self, roles: &[String]) -> bool {
        !self.config.admin_role_name.is_empty()
            && roles.iter().any(|r| *r == self.config.admin_role_name)
    }
}

#[async_trait]
impl TokenValidator for OidcValidator {
    fn name(&self) -> &'static str {
        "oidc"
    }

    async fn validate(&self, cancel: &CancellationToken, token: &str) -> Result<Claims, AuthError> {
        self.validate_token(cancel, token).await
    }
}

async fn request_token(
    client: &Client,
    config: &OidcConfig,
    endpoint: &str,
    code: &str,
) -> Result<TokenResponse, AuthError> {
    let params = [
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", config.redirect_url.as_str()),
        ("client_id", config.client_id.as_str()),
    ];

    let response = client
        .post(endpoint)
        .timeout(config.timeout)
        .basic_auth(&config.client_id, Some(&config.client_secret))
        .form(&params)
        .send()
        .await
        .map_err(|e| AuthError::external("token exchange request failed").with_source(e))?;

    let status = response.status();
    if status.is_server_error() {
        return Err(AuthError::external("token endpoint unavailable")
            .with_detail("status", status.as_u16().to_string()));
    }
    if !status.is_success() {
        return Err(AuthError::invalid_token("authorization code was rejected")
            .with_detail("status", status.as_u16().to_string()));
    }

    response
        .json()
        .await
        .map_err(|e| AuthError::external("malformed token response").with_source(e))
}

async fn request_user_info(
    client: &Client,
    endpoint: &str,
    access_token: &str,
    timeout: Duration,
) -> Result<UserInfo, AuthError> {
    let response = client
        .get(endpoint)
        .timeout(timeout)
        .bearer_auth(access_token)
        .send()
        .await
        .map_err(|e| AuthError::external("userinfo request failed").with_source(e))?;

    let status = response.status();
    if status.is_server_error() {
        return Err(AuthError::external("userinfo endpoint unavailable")
            .with_detail("status", status.as_u16().to_string()));
    }
    if !status.is_success() {
        return Err(AuthError::invalid_token("access token was rejected by userinfo")
            .with_detail("status", status.as_u16().to_string()));
    }

    response
        .json()
        .await
        .map_err(|e| AuthError::external("malformed userinfo response").with_source(e))
}
