/*
 * Responsibility
 * - Config -> dependencies -> Router
 * - axum::serve() with graceful shutdown
 */
use std::panic;
use std::process;
use std::sync::Arc;

use anyhow::Result;
use axum::{Router, routing::get};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api;
use crate::api::v1::handlers::health::health;
use crate::api::v1::handlers::items::{Item, ItemStore};
use crate::config::Config;
use crate::error::AuthError;
use crate::middleware;
use crate::middleware::auth::AuthMiddleware;
use crate::middleware::http::HttpConfig;
use crate::services::auth::build_auth_components;
use crate::services::authz::AuthorizationEngine;
use crate::state::AppState;

fn init_tracing() {
    // RUST_LOG=info,gatekeeper=debug,tower_http=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        tracing::error!(?info, "panic");

        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> Result<()> {
    init_tracing();
    let config = Config::from_env()?;
    init_panic_hook(!config.app_env.is_production());

    tracing::info!(
        "starting gatekeeper in {:?} mode on {}",
        config.app_env,
        config.addr
    );

    let shutdown = CancellationToken::new();
    let state = build_state(&config, &shutdown).await?;
    let app = build_router(state, config.http);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;
    Ok(())
}

/// Fails when any component configuration is invalid or OIDC discovery
/// does not succeed within the retry budget.
pub async fn build_state(config: &Config, cancel: &CancellationToken) -> Result<AppState, AuthError> {
    let components = build_auth_components(config, cancel).await?;
    let authz = AuthorizationEngine::new(config.rbac.clone())?;

    Ok(AppState {
        auth: AuthMiddleware::new(components.pipeline, config.middleware.clone()),
        authz: Arc::new(authz),
        local: components.local,
        oidc: components.oidc,
        items: ItemStore::with_items([
            Item { id: 1, name: "alpha".into() },
            Item { id: 2, name: "beta".into() },
            Item { id: 3, name: "gamma".into() },
        ]),
    })
}

pub fn build_router(state: AppState, http: HttpConfig) -> Router {
    let mut app = Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api::v1::routes(&state));
    if state.oidc.is_some() {
        app = app.nest("/auth/oidc", api::oidc::routes());
    }

    let app = middleware::auth::access::apply(app, state.auth.clone()).with_state(state);
    middleware::http::apply(app, http)
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
    tracing::info!("shutdown signal received");
    shutdown.cancel();
}
