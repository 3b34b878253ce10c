//! Authentication extractor for Axum handlers
//!
//! `AuthUser` requires a valid bearer token and returns 401 if it is missing
//! or invalid. The verifier comes from the `SharedAuthenticator` request
//! extension.
//!
//! ```rust,ignore
//! async fn protected_handler(auth: AuthUser) -> impl IntoResponse {
//!     format!("Hello, {}!", auth.user_id)
//! }
//! ```

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::error::{ApiError, ErrorResponse};
use crate::models::UserId;
use crate::services::auth::SharedAuthenticator;

/// Authenticated caller
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: UserId,
}

/// Authentication rejection types
#[derive(Debug)]
pub enum AuthRejection {
    /// Missing or non-bearer Authorization header
    MissingToken,
    /// Token is malformed or expired
    InvalidToken(String),
    /// No authenticator installed on the router
    MissingServices,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AuthRejection::MissingToken => {
                tracing::debug!("Authentication rejected: missing token");
                (StatusCode::UNAUTHORIZED, ApiError::Unauthorized)
            }
            AuthRejection::InvalidToken(reason) => {
                tracing::debug!(reason = %reason, "Authentication rejected: invalid token");
                (StatusCode::UNAUTHORIZED, ApiError::InvalidToken(reason))
            }
            AuthRejection::MissingServices => {
                tracing::error!("Authentication rejected: missing authenticator extension");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError::Internal("authentication is not configured".to_string()),
                )
            }
        };

        let body = Json(ErrorResponse {
            code: error.error_code(),
            message: error.to_string(),
            details: None,
        });

        (status, body).into_response()
    }
}

/// Extract the bearer token from the Authorization header
fn extract_bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(parts).ok_or(AuthRejection::MissingToken)?;

        let authenticator = parts
            .extensions
            .get::<SharedAuthenticator>()
            .ok_or(AuthRejection::MissingServices)?;

        let user_id = authenticator.authenticate(token).map_err(|e| match e {
            ApiError::InvalidToken(reason) => AuthRejection::InvalidToken(reason),
            other => AuthRejection::InvalidToken(other.to_string()),
        })?;

        Ok(AuthUser { user_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with_header(value: Option<&str>) -> Parts {
        let mut builder = Request::builder();
        if let Some(value) = value {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_extract_bearer_token_valid() {
        let parts = parts_with_header(Some("Bearer test_token_123"));
        assert_eq!(extract_bearer_token(&parts), Some("test_token_123"));
    }

    #[test]
    fn test_extract_bearer_token_missing() {
        let parts = parts_with_header(None);
        assert_eq!(extract_bearer_token(&parts), None);
    }

    #[test]
    fn test_extract_bearer_token_invalid_scheme() {
        let parts = parts_with_header(Some("Basic dXNlcjpwYXNz"));
        assert_eq!(extract_bearer_token(&parts), None);

        let parts = parts_with_header(Some("Bearer "));
        assert_eq!(extract_bearer_token(&parts), None);
    }

    #[test]
    fn test_auth_rejection_responses() {
        let response = AuthRejection::MissingToken.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = AuthRejection::InvalidToken("expired".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = AuthRejection::MissingServices.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
