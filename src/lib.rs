//! Bearer-token authentication and RBAC/ABAC authorization for axum services.
//!
//! Tokens are validated by an ordered chain (OIDC, remote endpoint, local
//! signature check); the accepted identity is stored in the request
//! extensions, where the authorization engine and handlers read it.
pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod services;
pub mod state;

pub use error::{AuthError, ErrorKind};
