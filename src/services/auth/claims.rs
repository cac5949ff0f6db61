use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Verified identity payload produced by every token validator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub issuer: String,
    #[serde(default)]
    pub issued_at: Option<i64>,
    #[serde(default)]
    pub not_before: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Claims {
    /// Every accepted token must name a subject.
    pub fn ensure_subject(self) -> Result<Self, AuthError> {
        if self.user_id.trim().is_empty() {
            return Err(AuthError::invalid_claims("token subject is empty"));
        }
        Ok(self)
    }
}
