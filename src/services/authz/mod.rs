pub mod engine;

pub use engine::{AuthorizationEngine, RbacConfig};
