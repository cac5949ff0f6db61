#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use jsonwebtoken::{EncodingKey, Header};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use gatekeeper::api::v1::handlers::items::{Item, ItemStore};
use gatekeeper::app::build_router;
use gatekeeper::error::{AuthError, ErrorKind};
use gatekeeper::middleware::auth::{AuthMiddleware, MiddlewareConfig};
use gatekeeper::middleware::http::HttpConfig;
use gatekeeper::services::auth::{
    Claims, JwtConfig, JwtValidator, LocalValidator, TokenValidator, ValidationPipeline,
};
use gatekeeper::services::authz::{AuthorizationEngine, RbacConfig};
use gatekeeper::state::AppState;

pub const SECRET: &str = "integration-secret";
pub const ISSUER: &str = "gatekeeper-tests";

pub const EC_PRIVATE_PEM: &str = include_str!("../fixtures/ec256_private.pem");
pub const EC_PUBLIC_PEM: &str = include_str!("../fixtures/ec256_public.pem");
pub const EC_OTHER_PRIVATE_PEM: &str = include_str!("../fixtures/ec256_other_private.pem");
pub const EC_JWK_X: &str = "UyPWuB4lCMgkBxzJkM-ghC-gIoiPmkM3nXAZynzGHss";
pub const EC_JWK_Y: &str = "eneqMQXwz8mn-GqL8wkbOq2DBfZihCjeC_SJOE2HP9s";

pub fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn local() -> LocalValidator {
    LocalValidator::new(&JwtConfig::new(SECRET, ISSUER, Duration::from_secs(3600))).unwrap()
}

pub fn token(user: &str, roles: &[&str], scopes: &[&str], resources: &[&str]) -> String {
    local()
        .generate_token(user, strings(roles), strings(scopes), strings(resources))
        .unwrap()
}

/// HS256 token with arbitrary claims, signed with `secret`.
pub fn hs256(secret: &str, claims: Value) -> String {
    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

pub fn expired_token() -> String {
    hs256(
        SECRET,
        json!({"sub": "u1", "iss": ISSUER, "iat": now() - 7200, "exp": now() - 3600, "roles": ["admin"]}),
    )
}

pub fn jwks() -> Value {
    json!({
        "keys": [{
            "kty": "EC",
            "crv": "P-256",
            "kid": "test-key",
            "alg": "ES256",
            "use": "sig",
            "x": EC_JWK_X,
            "y": EC_JWK_Y,
        }]
    })
}

/// ES256 token signed with `private_pem`, `kid` in the header.
pub fn es256(private_pem: &str, kid: &str, claims: Value) -> String {
    let mut header = Header::new(jsonwebtoken::Algorithm::ES256);
    header.kid = Some(kid.to_string());
    jsonwebtoken::encode(
        &header,
        &claims,
        &EncodingKey::from_ec_pem(private_pem.as_bytes()).unwrap(),
    )
    .unwrap()
}

/// Validator with a fixed outcome that counts its calls.
pub struct Scripted {
    name: &'static str,
    outcome: Result<Claims, ErrorKind>,
    calls: AtomicU32,
}

impl Scripted {
    pub fn accept(name: &'static str, user: &str, roles: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            name,
            outcome: Ok(Claims {
                user_id: user.to_string(),
                roles: strings(roles),
                ..Claims::default()
            }),
            calls: AtomicU32::new(0),
        })
    }

    pub fn reject(name: &'static str, kind: ErrorKind) -> Arc<Self> {
        Arc::new(Self {
            name,
            outcome: Err(kind),
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenValidator for Scripted {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn validate(&self, _: &CancellationToken, _: &str) -> Result<Claims, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.outcome {
            Ok(claims) => Ok(claims.clone()),
            Err(kind) => Err(AuthError::new(*kind, self.name)),
        }
    }
}

pub fn state_with(validators: Vec<Arc<dyn TokenValidator>>, config: MiddlewareConfig) -> AppState {
    let pipeline = ValidationPipeline::new(validators).unwrap();
    AppState {
        auth: AuthMiddleware::new(Arc::new(pipeline), config),
        authz: Arc::new(AuthorizationEngine::new(RbacConfig::default()).unwrap()),
        local: Arc::new(local()),
        oidc: None,
        items: ItemStore::with_items([
            Item { id: 1, name: "alpha".into() },
            Item { id: 2, name: "beta".into() },
        ]),
    }
}

pub fn app_with(validators: Vec<Arc<dyn TokenValidator>>, config: MiddlewareConfig) -> Router {
    build_router(state_with(validators, config), HttpConfig::default())
}

/// Full router with only the local JWT validator in the chain.
pub fn local_app() -> Router {
    app_with(
        vec![Arc::new(JwtValidator::new(local()))],
        MiddlewareConfig::default(),
    )
}

pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    request("GET", uri, token)
}

pub fn request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn send(app: Router, req: Request<Body>) -> (StatusCode, String) {
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(body.to_vec()).unwrap())
}
