//! Bearer token authentication for REST calls
//!
//! Accounts and token minting belong to the main PlayCo API. This service
//! only needs to turn a bearer token into a user id, which it does by
//! verifying HS256 JWTs signed with the shared secret.

use std::sync::Arc;

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};

use crate::error::{ApiError, ApiResult};
use crate::models::{Claims, UserId};

/// Resolves a bearer token to the user it was issued for
pub trait BearerAuthenticator: Send + Sync {
    /// # Errors
    /// - `ApiError::InvalidToken` if the token is invalid, expired or malformed
    fn authenticate(&self, bearer: &str) -> ApiResult<UserId>;
}

/// Shared authenticator handle, installed as a request extension
pub type SharedAuthenticator = Arc<dyn BearerAuthenticator>;

/// JWT verification settings
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// JWT signing secret
    pub jwt_secret: String,
    /// Expected `iss` claim
    pub issuer: String,
    /// Expected `aud` claim
    pub audience: String,
}

impl AuthConfig {
    /// Create an AuthConfig with the default issuer and audience
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            issuer: "playco".to_string(),
            audience: "playco".to_string(),
        }
    }
}

/// HS256 JWT authenticator
#[derive(Clone)]
pub struct JwtAuthenticator {
    config: AuthConfig,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtAuthenticator {
    pub fn new(config: AuthConfig) -> Self {
        let mut validation = Validation::default();
        validation.set_issuer(&[&config.issuer]);
        validation.set_audience(&[&config.audience]);

        Self {
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            config,
        }
    }

    /// Mint an access token, for tests and local tooling
    pub fn issue_access_token(&self, user_id: &str, ttl_secs: i64) -> ApiResult<String> {
        let claims = Claims::new(
            user_id,
            ttl_secs,
            self.config.issuer.clone(),
            self.config.audience.clone(),
        );
        Ok(encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )?)
    }
}

impl BearerAuthenticator for JwtAuthenticator {
    fn authenticate(&self, bearer: &str) -> ApiResult<UserId> {
        let token_data = decode::<Claims>(bearer, &self.decoding_key, &self.validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "Access token verification failed");
                ApiError::InvalidToken(e.to_string())
            })?;

        if token_data.claims.sub.is_empty() {
            return Err(ApiError::InvalidToken("empty subject".to_string()));
        }

        Ok(UserId::new(token_data.claims.sub))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const SECRET: &str = "test-secret-that-is-at-least-32-chars";

    #[test]
    fn test_issue_and_authenticate() {
        let auth = JwtAuthenticator::new(AuthConfig::new(SECRET));
        let token = auth.issue_access_token("user-42", 60).unwrap();

        assert_eq!(auth.authenticate(&token).unwrap(), UserId::new("user-42"));
    }

    #[test]
    fn test_rejects_wrong_secret() {
        let issuer = JwtAuthenticator::new(AuthConfig::new("another-secret-of-sufficient-size!!"));
        let token = issuer.issue_access_token("user-42", 60).unwrap();

        let auth = JwtAuthenticator::new(AuthConfig::new(SECRET));
        assert_matches!(auth.authenticate(&token), Err(ApiError::InvalidToken(_)));
    }

    #[test]
    fn test_rejects_wrong_audience() {
        let mut config = AuthConfig::new(SECRET);
        config.audience = "someone-else".to_string();
        let token = JwtAuthenticator::new(config)
            .issue_access_token("user-42", 60)
            .unwrap();

        let auth = JwtAuthenticator::new(AuthConfig::new(SECRET));
        assert_matches!(auth.authenticate(&token), Err(ApiError::InvalidToken(_)));
    }

    #[test]
    fn test_rejects_expired() {
        let auth = JwtAuthenticator::new(AuthConfig::new(SECRET));
        // Beyond the default 60s leeway
        let token = auth.issue_access_token("user-42", -120).unwrap();
        assert_matches!(auth.authenticate(&token), Err(ApiError::InvalidToken(_)));
    }

    #[test]
    fn test_rejects_garbage() {
        let auth = JwtAuthenticator::new(AuthConfig::new(SECRET));
        assert_matches!(auth.authenticate("not-a-jwt"), Err(ApiError::InvalidToken(_)));
    }
}
