//! Authentication and authorization middleware.
//!
//! `access` validates the bearer token and stores the identity in the request
//! extensions; `authorize` guards individual routes with an RBAC operation.
pub mod access;
pub mod authorize;

pub use access::{AuthMiddleware, MiddlewareConfig};
pub use authorize::require_operation;
