pub mod oidc;
pub mod v1;
