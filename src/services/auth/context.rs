//! Request-scoped identity.
//!
//! The access middleware stores exactly one [`AuthCtx`] in the request
//! extensions after a token is accepted. Handlers and the authorization
//! engine read it back through the accessors below; nothing mutates it.
use axum::http::Extensions;

use crate::services::auth::claims::Claims;

/// Identity attached to an authenticated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthCtx {
    user_id: String,
    roles: Vec<String>,
    scopes: Vec<String>,
    resources: Vec<String>,
    email: Option<String>,
    name: Option<String>,
}

impl AuthCtx {
    pub fn new(
        user_id: impl Into<String>,
        roles: Vec<String>,
        scopes: Vec<String>,
        resources: Vec<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            roles,
            scopes,
            resources,
            email: None,
            name: None,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn resources(&self) -> &[String] {
        &self.resources
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    pub fn has_resource(&self, resource: &str) -> bool {
        self.resources.iter().any(|r| r == resource)
    }
}

impl From<Claims> for AuthCtx {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.user_id,
            roles: claims.roles,
            scopes: claims.scopes,
            resources: claims.resources,
            email: claims.email,
            name: claims.name,
        }
    }
}

pub fn with_identity(extensions: &mut Extensions, ctx: AuthCtx) {
    extensions.insert(ctx);
}

pub fn get_identity(extensions: &Extensions) -> Option<&AuthCtx> {
    extensions.get::<AuthCtx>()
}

pub fn is_authenticated(extensions: &Extensions) -> bool {
    get_identity(extensions).is_some()
}

pub fn get_user_id(extensions: &Extensions) -> Option<&str> {
    get_identity(extensions).map(AuthCtx::user_id)
}

pub fn get_user_roles(extensions: &Extensions) -> &[String] {
    get_identity(extensions).map(AuthCtx::roles).unwrap_or_default()
}

pub fn get_user_scopes(extensions: &Extensions) -> &[String] {
    get_identity(extensions).map(AuthCtx::scopes).unwrap_or_default()
}

pub fn get_user_resources(extensions: &Extensions) -> &[String] {
    get_identity(extensions)
        .map(AuthCtx::resources)
        .unwrap_or_default()
}

pub fn has_role(extensions: &Extensions, role: &str) -> bool {
    get_identity(extensions).is_some_and(|ctx| ctx.has_role(role))
}

pub fn has_scope(extensions: &Extensions, scope: &str) -> bool {
    get_identity(extensions).is_some_and(|ctx| ctx.has_scope(scope))
}

pub fn has_resource(extensions: &Extensions, resource: &str) -> bool {
    get_identity(extensions).is_some_and(|ctx| ctx.has_resource(resource))
}
