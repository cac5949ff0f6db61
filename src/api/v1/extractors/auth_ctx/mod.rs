//! Hands the identity stored by the access middleware to handlers.
mod core;

pub use crate::services::auth::context::AuthCtx;
pub use core::{AuthCtxExtractor, OptionalAuthCtx};
