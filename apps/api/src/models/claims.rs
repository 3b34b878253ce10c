//! Bearer token claims

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// JWT claims payload accepted on REST calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,

    /// Issued at timestamp (Unix epoch)
    pub iat: i64,

    /// Expiration timestamp (Unix epoch)
    pub exp: i64,

    /// Issuer
    pub iss: String,

    /// Audience
    pub aud: String,
}

impl Claims {
    /// Create claims for a user valid for `ttl_secs`
    pub fn new(
        user_id: impl Into<String>,
        ttl_secs: i64,
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        let now = Utc::now().timestamp();
        Self {
            sub: user_id.into(),
            iat: now,
            exp: now + ttl_secs,
            iss: issuer.into(),
            aud: audience.into(),
        }
    }
}
