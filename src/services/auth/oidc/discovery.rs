//! Provider discovery and key-set retrieval. Single attempts only; callers
//! wrap these in the retry policy.
use std::time::Duration;

use jsonwebtoken::jwk::JwkSet;
use reqwest::Client;

use crate::error::AuthError;
use crate::services::auth::oidc::types::ProviderMetadata;

const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";

pub(crate) fn same_issuer(a: &str, b: &str) -> bool {
    a.trim_end_matches('/') == b.trim_end_matches('/')
}

pub(crate) async fn discover(
    client: &Client,
    issuer_url: &str,
    timeout: Duration,
) -> Result<ProviderMetadata, AuthError> {
    let url = format!("{}{}", issuer_url.trim_end_matches('/'), DISCOVERY_PATH);
    let response = client
        .get(&url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| AuthError::external("oidc discovery request failed").with_source(e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(AuthError::external("oidc discovery failed")
            .with_detail("status", status.as_u16().to_string()));
    }

    let metadata: ProviderMetadata = response
        .json()
        .await
        .map_err(|e| AuthError::external("malformed oidc discovery document").with_source(e))?;

    if !same_issuer(&metadata.issuer, issuer_url) {
        return Err(AuthError::invalid_config("oidc issuer mismatch")
            .with_detail("expected", issuer_url)
            .with_detail("discovered", metadata.issuer.clone()));
    }

    Ok(metadata)
}

pub(crate) async fn fetch_jwks(
    client: &Client,
    jwks_uri: &str,
    timeout: Duration,
) -> Result<JwkSet, AuthError> {
    let response = client
        .get(jwks_uri)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| AuthError::external("jwks request failed").with_source(e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(AuthError::external("jwks fetch failed")
            .with_detail("status", status.as_u16().to_string()));
    }

    response
        .json::<JwkSet>()
        .await
        .map_err(|e| AuthError::external("malformed jwks document").with_source(e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issuer_comparison_ignores_trailing_slash() {
        assert!(same_issuer("https://idp.example.com/", "https://idp.example.com"));
        assert!(same_issuer("https://idp.example.com", "https://idp.example.com"));
        assert!(!same_issuer("https://idp.example.com/a", "https://idp.example.com"));
    }
}
