/*
 * Responsibility
 * - Load environment variables (.env via dotenvy)
 * - Parse only; each component validates its own config when constructed
 */
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::middleware::auth::MiddlewareConfig;
use crate::middleware::http::HttpConfig;
use crate::services::auth::{JwtConfig, OidcConfig, RemoteConfig, RetryConfig, SigningMethod};
use crate::services::authz::RbacConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    fn parse(value: Option<String>) -> Self {
        match value
            .unwrap_or_else(|| "development".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing configuration: {0}")]
    Missing(&'static str),
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,
    pub http: HttpConfig,
    pub jwt: JwtConfig,
    pub remote: Option<RemoteConfig>,
    pub oidc: Option<OidcConfig>,
    pub retry: RetryConfig,
    pub middleware: MiddlewareConfig,
    pub rbac: RbacConfig,
}

/// Reads keys through `lookup`; blank values count as unset.
struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn require(&self, key: &'static str) -> Result<String, ConfigError> {
        self.get(key).ok_or(ConfigError::Missing(key))
    }

    fn parse_or<T: FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        match self.get(key) {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid(key)),
            None => Ok(default),
        }
    }

    fn list_or(&self, key: &str, default: &[&str]) -> Vec<String> {
        match self.get(key) {
            Some(raw) => raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => default.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// PEM values are often stored on one line with literal `\n`.
    fn pem(&self, key: &str) -> Option<String> {
        self.get(key).map(|v| v.replace("\\n", "\n"))
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let port: u16 = env.parse_or("PORT", 3000)?;
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let app_env = AppEnv::parse(env.get("APP_ENV"));

        let http = HttpConfig {
            request_timeout: Duration::from_secs(env.parse_or("HTTP_REQUEST_TIMEOUT_SECS", 30)?),
            body_limit: env.parse_or("HTTP_BODY_LIMIT_BYTES", 1024 * 1024)?,
        };

        let signing_method: SigningMethod = match env.get("AUTH_JWT_SIGNING_METHOD") {
            Some(raw) => raw
                .parse()
                .map_err(|_| ConfigError::Invalid("AUTH_JWT_SIGNING_METHOD"))?,
            None => SigningMethod::default(),
        };
        let secret = env
            .pem("AUTH_JWT_SECRET")
            .ok_or(ConfigError::Missing("AUTH_JWT_SECRET"))?;
        let mut jwt = JwtConfig::new(
            secret,
            env.get("AUTH_JWT_ISSUER").unwrap_or_default(),
            Duration::from_secs(env.parse_or("AUTH_JWT_TOKEN_DURATION_SECS", 3600)?),
        )
        .with_signing_method(signing_method);
        if let Some(pem) = env.pem("AUTH_JWT_PUBLIC_KEY_PEM") {
            jwt = jwt.with_public_key_pem(pem);
        }

        let remote = match env.get("AUTH_REMOTE_VALIDATION_URL") {
            Some(url) => {
                let timeout = Duration::from_secs(env.parse_or("AUTH_REMOTE_TIMEOUT_SECS", 5)?);
                let mut remote = RemoteConfig::new(url, timeout);
                if let Some(client_id) = env.get("AUTH_REMOTE_CLIENT_ID") {
                    remote = remote.with_client_credentials(
                        client_id,
                        env.get("AUTH_REMOTE_CLIENT_SECRET").unwrap_or_default(),
                    );
                }
                Some(remote)
            }
            None => None,
        };

        let defaults = RetryConfig::default();
        let retry = RetryConfig {
            max_retries: env.parse_or("AUTH_RETRY_MAX_RETRIES", defaults.max_retries)?,
            initial_backoff: Duration::from_millis(env.parse_or("AUTH_RETRY_INITIAL_BACKOFF_MS", 100)?),
            max_backoff: Duration::from_millis(env.parse_or("AUTH_RETRY_MAX_BACKOFF_MS", 2000)?),
            backoff_factor: env.parse_or("AUTH_RETRY_BACKOFF_FACTOR", defaults.backoff_factor)?,
        };

        let oidc = match env.get("AUTH_OIDC_ISSUER_URL") {
            Some(issuer_url) => {
                let mut oidc = OidcConfig::new(issuer_url, env.require("AUTH_OIDC_CLIENT_ID")?);
                oidc.client_secret = env.get("AUTH_OIDC_CLIENT_SECRET").unwrap_or_default();
                oidc.redirect_url = env.get("AUTH_OIDC_REDIRECT_URL").unwrap_or_default();
                oidc.scopes = env.list_or("AUTH_OIDC_SCOPES", &["openid", "profile", "email"]);
                if let Some(role) = env.get("AUTH_OIDC_ADMIN_ROLE") {
                    oidc.admin_role_name = role;
                }
                oidc.timeout = Duration::from_secs(env.parse_or("AUTH_OIDC_TIMEOUT_SECS", 10)?);
                oidc.retry = retry;
                Some(oidc)
            }
            None => None,
        };

        let mut skip_paths = env.list_or("AUTH_SKIP_PATHS", &["/health"]);
        if oidc.is_some() && !skip_paths.iter().any(|p| p == "/auth/oidc") {
            skip_paths.push("/auth/oidc".to_string());
        }
        let middleware = MiddlewareConfig {
            skip_paths,
            require_auth: env.parse_or("AUTH_REQUIRE_AUTH", true)?,
        };

        let rbac_defaults = RbacConfig::default();
        let rbac = RbacConfig {
            admin_role_name: env
                .get("AUTH_ADMIN_ROLE")
                .unwrap_or(rbac_defaults.admin_role_name),
            read_only_role_name: env
                .get("AUTH_READONLY_ROLE")
                .unwrap_or(rbac_defaults.read_only_role_name),
            read_operation_prefixes: env.list_or("AUTH_READ_PREFIXES", &["get", "list", "read"]),
        };

        Ok(Self {
            addr,
            app_env,
            http,
            jwt,
            remote,
            oidc,
            retry,
            middleware,
            rbac,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(move |key| map.get(key).cloned())
    }

    #[test]
    fn secret_is_required() {
        assert_eq!(load(&[]).unwrap_err(), ConfigError::Missing("AUTH_JWT_SECRET"));
    }

    #[test]
    fn defaults_apply() {
        let config = load(&[("AUTH_JWT_SECRET", "s")]).unwrap();
        assert_eq!(config.addr.port(), 3000);
        assert_eq!(config.app_env, AppEnv::Development);
        assert_eq!(config.jwt.token_duration, Duration::from_secs(3600));
        assert_eq!(config.jwt.signing_method, SigningMethod::Hs256);
        assert!(config.remote.is_none());
        assert!(config.oidc.is_none());
        assert_eq!(config.retry, RetryConfig::default());
        assert_eq!(config.middleware, MiddlewareConfig::default());
        assert_eq!(config.rbac, RbacConfig::default());
        assert_eq!(config.http, HttpConfig::default());
    }

    #[test]
    fn reads_optional_backends() {
        let config = load(&[
            ("AUTH_JWT_SECRET", "s"),
            ("AUTH_REMOTE_VALIDATION_URL", "http://auth.local/validate"),
            ("AUTH_REMOTE_CLIENT_ID", "svc"),
            ("AUTH_REMOTE_CLIENT_SECRET", "pw"),
            ("AUTH_OIDC_ISSUER_URL", "https://idp.example.com"),
            ("AUTH_OIDC_CLIENT_ID", "web"),
            ("AUTH_OIDC_SCOPES", "openid, groups"),
            ("AUTH_RETRY_MAX_RETRIES", "5"),
        ])
        .unwrap();

        let remote = config.remote.unwrap();
        assert_eq!(remote.client_id, "svc");
        assert_eq!(remote.timeout, Duration::from_secs(5));

        let oidc = config.oidc.unwrap();
        assert_eq!(oidc.client_id, "web");
        assert_eq!(oidc.scopes, vec!["openid", "groups"]);
        assert_eq!(oidc.retry.max_retries, 5);
        assert!(config.middleware.should_skip("/auth/oidc/login"));
    }

    #[test]
    fn oidc_issuer_needs_client_id() {
        let err = load(&[
            ("AUTH_JWT_SECRET", "s"),
            ("AUTH_OIDC_ISSUER_URL", "https://idp.example.com"),
        ])
        .unwrap_err();
        assert_eq!(err, ConfigError::Missing("AUTH_OIDC_CLIENT_ID"));
    }

    #[test]
    fn malformed_values_are_invalid() {
        let err = load(&[("AUTH_JWT_SECRET", "s"), ("PORT", "http")]).unwrap_err();
        assert_eq!(err, ConfigError::Invalid("PORT"));

        let err = load(&[("AUTH_JWT_SECRET", "s"), ("AUTH_JWT_SIGNING_METHOD", "none")]).unwrap_err();
        assert_eq!(err, ConfigError::Invalid("AUTH_JWT_SIGNING_METHOD"));

        let err = load(&[("AUTH_JWT_SECRET", "s"), ("AUTH_REQUIRE_AUTH", "maybe")]).unwrap_err();
        assert_eq!(err, ConfigError::Invalid("AUTH_REQUIRE_AUTH"));
    }

    #[test]
    fn pem_newlines_are_unescaped() {
        let config = load(&[
            ("AUTH_JWT_SECRET", "-----BEGIN-----\\nabc\\n-----END-----"),
            ("AUTH_JWT_SIGNING_METHOD", "es256"),
        ])
        .unwrap();
        assert_eq!(config.jwt.secret_key, "-----BEGIN-----\nabc\n-----END-----");
        assert_eq!(config.jwt.signing_method, SigningMethod::Es256);
    }
}
