mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::{Value, json};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use gatekeeper::app::build_router;
use gatekeeper::error::{AuthError, ErrorKind};
use gatekeeper::middleware::auth::MiddlewareConfig;
use gatekeeper::middleware::http::HttpConfig;
use gatekeeper::services::auth::{Claims, TokenValidator};

use common::*;

#[tokio::test]
async fn health_is_served_without_identity() {
    let (status, body) = send(local_app(), get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);

    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body, json!({"status": "ok", "authenticated": false}));
}

#[tokio::test]
async fn skip_path_ignores_a_bad_token() {
    let (status, body) = send(local_app(), get("/health", Some("garbage"))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("\"authenticated\":false"));
}

#[tokio::test]
async fn missing_header_is_rejected() {
    let (status, body) = send(local_app(), get("/api/v1/me", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, "Authorization required");
}

#[tokio::test]
async fn non_bearer_header_is_rejected() {
    let req = axum::http::Request::builder()
        .uri("/api/v1/me")
        .header("authorization", "Basic dXNlcjpwYXNz")
        .body(axum::body::Body::empty())
        .unwrap();

    let (status, body) = send(local_app(), req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, "Invalid token");
}

#[tokio::test]
async fn rejection_message_follows_error_kind() {
    let cases = [
        (expired_token(), "Token expired"),
        (
            hs256("another-secret", json!({"sub": "u1", "exp": now() + 600})),
            "Invalid token signature",
        ),
        (
            hs256(SECRET, json!({"iss": ISSUER, "exp": now() + 600})),
            "Invalid token claims",
        ),
        ("not-a-token".to_string(), "Invalid token"),
    ];

    for (token, expected) in cases {
        let (status, body) = send(local_app(), get("/api/v1/me", Some(&token))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{expected}");
        assert_eq!(body, expected);
    }
}

#[tokio::test]
async fn valid_token_injects_identity() {
    let token = token("u1", &["admin"], &["reports:read"], &["sales"]);
    let (status, body) = send(local_app(), get("/api/v1/me", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);

    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["user_id"], "u1");
    assert_eq!(body["roles"], json!(["admin"]));
    assert_eq!(body["scopes"], json!(["reports:read"]));
    assert_eq!(body["resources"], json!(["sales"]));
}

#[tokio::test]
async fn optional_auth_passes_anonymous_requests() {
    let config = MiddlewareConfig {
        skip_paths: vec![],
        require_auth: false,
    };
    let validator = Scripted::reject("jwt", ErrorKind::InvalidToken);
    let app = app_with(vec![validator.clone()], config);

    // Anonymous callers reach the handler; the extractor then rejects.
    let (status, body) = send(app.clone(), get("/api/v1/me", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, "Authorization required");

    let (status, _) = send(app.clone(), get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(validator.calls(), 0);

    // A presented token is still validated.
    let (status, body) = send(app, get("/api/v1/me", Some("t"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, "Invalid token");
    assert_eq!(validator.calls(), 1);
}

#[tokio::test]
async fn first_success_short_circuits_the_chain() {
    let oidc = Scripted::accept("oidc", "from-oidc", &["readonly"]);
    let jwt = Scripted::accept("jwt", "from-jwt", &["readonly"]);
    let app = app_with(vec![oidc.clone(), jwt.clone()], MiddlewareConfig::default());

    let (status, body) = send(app, get("/api/v1/me", Some("t"))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("from-oidc"));
    assert_eq!(oidc.calls(), 1);
    assert_eq!(jwt.calls(), 0);
}

#[tokio::test]
async fn falls_back_to_lower_priority_validator() {
    let oidc = Scripted::reject("oidc", ErrorKind::InvalidSignature);
    let jwt = Scripted::accept("jwt", "from-jwt", &["readonly"]);
    let app = app_with(vec![oidc.clone(), jwt.clone()], MiddlewareConfig::default());

    let (status, body) = send(app, get("/api/v1/me", Some("t"))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("from-jwt"));
    assert_eq!(oidc.calls(), 1);
    assert_eq!(jwt.calls(), 1);
}

#[tokio::test]
async fn last_validator_decides_the_message() {
    let oidc = Scripted::reject("oidc", ErrorKind::InvalidSignature);
    let jwt = Scripted::reject("jwt", ErrorKind::ExpiredToken);
    let app = app_with(vec![oidc, jwt], MiddlewareConfig::default());

    let (status, body) = send(app, get("/api/v1/me", Some("t"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, "Token expired");
}

#[tokio::test]
async fn upstream_failure_is_still_a_401() {
    let jwt = Scripted::reject("jwt", ErrorKind::ExternalServiceError);
    let app = app_with(vec![jwt], MiddlewareConfig::default());

    let (status, body) = send(app, get("/api/v1/me", Some("t"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, "Invalid token");
}

#[tokio::test]
async fn response_carries_request_id() {
    let response = local_app().oneshot(get("/health", None)).await.unwrap();
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn refresh_issues_a_new_local_token() {
    let original = token("u1", &["admin"], &[], &[]);
    let (status, body) = send(
        local_app(),
        request("POST", "/api/v1/token/refresh", Some(&original)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 3600);
    let refreshed = body["token"].as_str().unwrap();
    let claims = local().validate_token(refreshed).unwrap();
    assert_eq!(claims.user_id, "u1");
    assert_eq!(claims.roles, strings(&["admin"]));
}

/// Never finishes on its own; reports through `notify` when its cancel token fires.
struct Hanging {
    notify: std::sync::Mutex<Option<oneshot::Sender<()>>>,
}

#[async_trait]
impl TokenValidator for Hanging {
    fn name(&self) -> &'static str {
        "hanging"
    }

    async fn validate(&self, cancel: &CancellationToken, _: &str) -> Result<Claims, AuthError> {
        let notify = self.notify.lock().unwrap().take();
        if let Some(tx) = notify {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                cancel.cancelled().await;
                let _ = tx.send(());
            });
        }
        std::future::pending().await
    }
}

#[tokio::test]
async fn global_timeout_answers_408_and_cancels_validation() {
    let (tx, rx) = oneshot::channel();
    let hanging = Arc::new(Hanging {
        notify: std::sync::Mutex::new(Some(tx)),
    });
    let app = build_router(
        state_with(vec![hanging], MiddlewareConfig::default()),
        HttpConfig {
            request_timeout: Duration::from_millis(50),
            ..HttpConfig::default()
        },
    );

    let (status, _) = send(app, get("/api/v1/me", Some("t"))).await;
    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);

    tokio::time::timeout(Duration::from_secs(1), rx)
        .await
        .expect("validation was not cancelled")
        .unwrap();
}
