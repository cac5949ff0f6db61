//! Role checks (RBAC) and scope/resource checks (ABAC) over the identity the
//! access middleware stored in the request extensions.
use axum::http::Extensions;
use tracing::debug;

use crate::error::AuthError;
use crate::services::auth::context::{self, AuthCtx};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RbacConfig {
    pub admin_role_name: String,
    pub read_only_role_name: String,
    /// Operation prefixes the read-only role may perform, e.g. `get`.
    pub read_operation_prefixes: Vec<String>,
}

impl Default for RbacConfig {
    fn default() -> Self {
        Self {
            admin_role_name: "admin".into(),
            read_only_role_name: "readonly".into(),
            read_operation_prefixes: vec!["get".into(), "list".into(), "read".into()],
        }
    }
}

impl RbacConfig {
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.admin_role_name.trim().is_empty() {
            return Err(AuthError::invalid_config("admin role name is required"));
        }
        if self.read_operation_prefixes.iter().any(|p| p.trim().is_empty()) {
            return Err(AuthError::invalid_config("read operation prefixes must not be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AuthorizationEngine {
    config: RbacConfig,
}

impl AuthorizationEngine {
    pub fn new(config: RbacConfig) -> Result<Self, AuthError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RbacConfig {
        &self.config
    }

    /// RBAC decision for `operation`.
    ///
    /// `Ok(true)` when allowed. Missing identity or an identity without roles
    /// is `Unauthorized`; a denial is `Forbidden` with the operation attached.
    pub fn is_authorized(&self, extensions: &Extensions, operation: &str) -> Result<bool, AuthError> {
        let ctx = context::get_identity(extensions)
            .ok_or_else(|| AuthError::unauthorized("request is not authenticated"))?;
        self.authorize(ctx, operation)
    }

    pub fn authorize(&self, ctx: &AuthCtx, operation: &str) -> Result<bool, AuthError> {
        if ctx.roles().is_empty() {
            return Err(AuthError::unauthorized("identity has no roles")
                .with_detail("user_id", ctx.user_id()));
        }

        if ctx.has_role(&self.config.admin_role_name) {
            return Ok(true);
        }

        if !self.config.read_only_role_name.is_empty()
            && ctx.has_role(&self.config.read_only_role_name)
            && self.is_read_operation(operation)
        {
            return Ok(true);
        }

        debug!(user_id = ctx.user_id(), operation, "operation denied");
        Err(AuthError::forbidden("operation not permitted").with_detail("operation", operation))
    }

    fn is_read_operation(&self, operation: &str) -> bool {
        self.config
            .read_operation_prefixes
            .iter()
            .any(|prefix| operation.starts_with(prefix.as_str()))
    }

    /// ABAC decision: the identity must hold one of `allowed_roles`; when
    /// `required_scopes` is non-empty it must also own `resource` and hold
    /// every required scope.
    pub fn is_authorized_with_scopes(
        &self,
        extensions: &Extensions,
        allowed_roles: &[&str],
        required_scopes: &[&str],
        resource: &str,
    ) -> bool {
        context::get_identity(extensions).is_some_and(|ctx| {
            check_scopes(ctx, allowed_roles, required_scopes, resource)
        })
    }
}

pub fn check_scopes(
    ctx: &AuthCtx,
    allowed_roles: &[&str],
    required_scopes: &[&str],
    resource: &str,
) -> bool {
    if !allowed_roles.iter().any(|role| ctx.has_role(role)) {
        return false;
    }
    if required_scopes.is_empty() {
        return true;
    }
    ctx.has_resource(resource) && required_scopes.iter().all(|scope| ctx.has_scope(scope))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::ErrorKind;
    use crate::services::auth::jwt::{JwtConfig, LocalValidator};

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn extensions_for(roles: &[&str], scopes: &[&str], resources: &[&str]) -> Extensions {
        let mut ext = Extensions::new();
        context::with_identity(
            &mut ext,
            AuthCtx::new("u1", strings(roles), strings(scopes), strings(resources)),
        );
        ext
    }

    fn engine() -> AuthorizationEngine {
        AuthorizationEngine::new(RbacConfig::default()).unwrap()
    }

    #[test]
    fn unauthenticated_request_is_unauthorized() {
        let err = engine().is_authorized(&Extensions::new(), "get:items").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[test]
    fn identity_without_roles_is_unauthorized() {
        let ext = extensions_for(&[], &[], &[]);
        let err = engine().is_authorized(&ext, "get:items").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[test]
    fn admin_is_allowed_everything() {
        let ext = extensions_for(&["admin"], &[], &[]);
        for op in ["delete:anything", "get:items", "", "update:users"] {
            assert!(engine().is_authorized(&ext, op).unwrap(), "{op}");
        }
    }

    #[test]
    fn readonly_is_limited_to_read_prefixes() {
        let ext = extensions_for(&["readonly"], &[], &[]);
        let engine = engine();
        assert!(engine.is_authorized(&ext, "get:items").unwrap());
        assert!(engine.is_authorized(&ext, "list:items").unwrap());
        assert!(engine.is_authorized(&ext, "readReport").unwrap());

        let err = engine.is_authorized(&ext, "delete:items").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(err.detail("operation"), Some("delete:items"));
    }

    #[test]
    fn other_roles_are_forbidden() {
        let ext = extensions_for(&["editor"], &[], &[]);
        let err = engine().is_authorized(&ext, "get:items").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[test]
    fn custom_role_names_apply() {
        let engine = AuthorizationEngine::new(RbacConfig {
            admin_role_name: "root".into(),
            read_only_role_name: "viewer".into(),
            read_operation_prefixes: vec!["view".into()],
        })
        .unwrap();

        assert!(engine.is_authorized(&extensions_for(&["root"], &[], &[]), "x").unwrap());
        assert!(engine.is_authorized(&extensions_for(&["viewer"], &[], &[]), "view:a").unwrap());
        assert!(engine.is_authorized(&extensions_for(&["admin"], &[], &[]), "x").is_err());
    }

    #[test]
    fn rejects_invalid_config() {
        let err = AuthorizationEngine::new(RbacConfig {
            admin_role_name: " ".into(),
            ..RbacConfig::default()
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    }

    #[test]
    fn scopes_require_role() {
        let ext = extensions_for(&["viewer"], &["reports:read"], &["sales"]);
        assert!(!engine().is_authorized_with_scopes(&ext, &["analyst"], &[], "sales"));
    }

    #[test]
    fn role_alone_suffices_without_required_scopes() {
        let ext = extensions_for(&["analyst"], &[], &[]);
        assert!(engine().is_authorized_with_scopes(&ext, &["analyst", "admin"], &[], "sales"));
    }

    #[test]
    fn scopes_and_resource_are_all_required() {
        let engine = engine();
        let ext = extensions_for(&["analyst"], &["reports:read", "reports:export"], &["sales"]);

        assert!(engine.is_authorized_with_scopes(&ext, &["analyst"], &["reports:read"], "sales"));
        assert!(engine.is_authorized_with_scopes(
            &ext,
            &["analyst"],
            &["reports:read", "reports:export"],
            "sales"
        ));
        assert!(!engine.is_authorized_with_scopes(&ext, &["analyst"], &["reports:read"], "hr"));
        assert!(!engine.is_authorized_with_scopes(
            &ext,
            &["analyst"],
            &["reports:read", "reports:delete"],
            "sales"
        ));
    }

    #[test]
    fn scopes_without_identity_is_denied() {
        assert!(!engine().is_authorized_with_scopes(&Extensions::new(), &["admin"], &[], "x"));
    }

    #[test]
    fn generated_admin_token_authorizes_any_operation() {
        let local =
            LocalValidator::new(&JwtConfig::new("s", "i", Duration::from_secs(3600))).unwrap();
        let token = local
            .generate_token("u1", strings(&["admin"]), vec![], vec![])
            .unwrap();
        assert_eq!(token.split('.').count(), 3);

        let claims = local.validate_token(&token).unwrap();
        assert_eq!(claims.user_id, "u1");
        assert_eq!(claims.roles, strings(&["admin"]));
        assert_eq!(claims.issuer, "i");

        let mut ext = Extensions::new();
        context::with_identity(&mut ext, AuthCtx::from(claims));
        assert!(engine().is_authorized(&ext, "delete:anything").unwrap());
    }
}
