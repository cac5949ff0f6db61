pub mod claims;
pub mod context;
pub mod factory;
pub mod jwt;
pub mod oidc;
pub mod pipeline;
pub mod remote;
pub mod retry;
pub mod validator;

pub use claims::Claims;
pub use context::AuthCtx;
pub use factory::{AuthComponents, build_auth_components};
pub use jwt::{JwtConfig, LocalValidator, SigningMethod};
pub use oidc::{OidcConfig, OidcValidator};
pub use pipeline::ValidationPipeline;
pub use remote::{RemoteConfig, RemoteValidator};
pub use retry::{Cancelled, RetryConfig, RetryPolicy};
pub use validator::{JwtValidator, TokenValidator};
