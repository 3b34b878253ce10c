//! Handshake token issuance
//!
//! - `POST /playco/socketio/auth` - Bind a handshake token to a live realtime
//!   session id and a client-chosen CSRF nonce

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthUser;
use crate::models::{HandshakeToken, NonceError, SessionId};
use crate::services::HandshakeCoordinator;
use crate::websocket::ConnectionManager;

/// Shared state for the issuance handler
#[derive(Clone)]
pub struct SocketioAuthState {
    pub coordinator: HandshakeCoordinator,
    pub connections: ConnectionManager,
}

impl SocketioAuthState {
    pub fn new(coordinator: HandshakeCoordinator, connections: ConnectionManager) -> Self {
        Self {
            coordinator,
            connections,
        }
    }
}

/// Create the issuance router
///
/// Expects a `SharedAuthenticator` extension for [`AuthUser`].
pub fn socketio_auth_router(state: SocketioAuthState) -> Router {
    Router::new()
        .route("/playco/socketio/auth", post(issue_handshake_token))
        .with_state(state)
}

// ========== Request/Response Types ==========

/// Issuance request body
///
/// Both fields are optional at the serde level so that omissions map onto
/// the API's own error codes instead of a generic 422.
#[derive(Debug, Deserialize)]
pub struct SocketioAuthRequest {
    /// Session id announced on the realtime `connect` event
    pub sid: Option<String>,
    /// Client-chosen CSRF nonce
    pub sio_csrf_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SioToken {
    pub token: String,
    /// Expiry as RFC 3339
    pub exp: String,
}

#[derive(Debug, Serialize)]
pub struct SioTokenData {
    pub sio_token: SioToken,
}

#[derive(Debug, Serialize)]
pub struct SocketioAuthResponse {
    pub data: SioTokenData,
}

impl From<HandshakeToken> for SocketioAuthResponse {
    fn from(token: HandshakeToken) -> Self {
        Self {
            data: SioTokenData {
                sio_token: SioToken {
                    exp: token.expires_at.to_rfc3339(),
                    token: token.token,
                },
            },
        }
    }
}

// ========== Handlers ==========

/// Issue a handshake token
///
/// # Request
/// - Method: POST
/// - Path: /playco/socketio/auth
/// - Headers: Authorization: Bearer <access_token>
/// - Body: JSON with sid and sio_csrf_token
///
/// # Response
/// - 201 Created: token issued, superseding any earlier token for the sid
/// - 400 Bad Request: malformed body, bad sid, or nonce rejected
/// - 401 Unauthorized: missing or invalid bearer token
/// - 404 Not Found: no live realtime connection has this sid
/// - 503 Service Unavailable: token store unreachable
async fn issue_handshake_token(
    State(state): State<SocketioAuthState>,
    auth: AuthUser,
    body: Result<Json<SocketioAuthRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = body.map_err(|e| ApiError::InvalidBody(e.body_text()))?;

    let sid = request.sid.ok_or(ApiError::MissingField("sid"))?;
    let session_id = SessionId::parse(&sid)?;
    let nonce = request
        .sio_csrf_token
        .ok_or(ApiError::InvalidNonce(NonceError::Missing))?;

    if !state.connections.is_connected(&session_id) {
        return Err(ApiError::not_found("session", session_id.as_str()));
    }

    let token = state
        .coordinator
        .issue_token(&auth.user_id, &session_id, &nonce)
        .await?;

    Ok((StatusCode::CREATED, Json(SocketioAuthResponse::from(token))))
}
