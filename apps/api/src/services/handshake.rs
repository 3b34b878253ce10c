//! Handshake coordinator
//!
//! Issues, validates and revokes the short-lived tokens that bind a realtime
//! session id to the CSRF nonce a bearer-authenticated client submitted over
//! REST.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Duration;
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::SharedClock;
use crate::error::{ApiError, ApiResult};
use crate::models::{CsrfNonce, HandshakeToken, SessionId, UserId, TOKEN_TTL_SECS};
use crate::repositories::{StoreError, TokenStore};

/// Random bytes per handshake token (256 bits)
const TOKEN_BYTES: usize = 32;

/// Why a token failed validation
///
/// Clients only ever learn that authentication failed; the variant is kept
/// for server-side diagnostics.
#[derive(Debug, Error)]
pub enum AuthFailure {
    #[error("no token issued for session")]
    NotFound,

    #[error("token expired")]
    Expired,

    #[error("csrf nonce mismatch")]
    NonceMismatch,

    #[error("token mismatch")]
    TokenMismatch,

    #[error("token store unavailable: {0}")]
    Store(#[from] StoreError),
}

impl AuthFailure {
    /// Short reason for structured logs
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Expired => "expired",
            Self::NonceMismatch => "nonce_mismatch",
            Self::TokenMismatch => "token_mismatch",
            Self::Store(_) => "store_error",
        }
    }

    /// Failures caused by the server rather than by the presented credentials
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

/// Issues and checks handshake tokens
#[derive(Clone)]
pub struct HandshakeCoordinator {
    store: Arc<dyn TokenStore>,
    clock: SharedClock,
    min_nonce_len: usize,
}

impl HandshakeCoordinator {
    pub fn new(store: Arc<dyn TokenStore>, clock: SharedClock, min_nonce_len: usize) -> Self {
        Self {
            store,
            clock,
            min_nonce_len,
        }
    }

    /// Name of the backing store
    pub fn store_backend(&self) -> &'static str {
        self.store.backend()
    }

    /// Probe the backing store
    pub async fn ping_store(&self) -> Result<(), StoreError> {
        self.store.ping().await
    }

    /// Issue a token for `session_id`, superseding any earlier one.
    ///
    /// The caller has already authenticated `user_id` and checked that
    /// `session_id` belongs to a live realtime connection. Realtime session
    /// state is left untouched.
    ///
    /// # Errors
    /// - `ApiError::InvalidNonce` if the nonce fails the length or entropy rules
    /// - `ApiError::TokenSuperseded` if a later issuance for the session already won
    /// - `ApiError::Store` if the token store is unreachable
    pub async fn issue_token(
        &self,
        user_id: &UserId,
        session_id: &SessionId,
        csrf_nonce: &str,
    ) -> ApiResult<HandshakeToken> {
        let csrf_nonce = CsrfNonce::parse(csrf_nonce, self.min_nonce_len)?;

        let issued_at = self.clock.now();
        let token = HandshakeToken {
            token: generate_token(),
            session_id: session_id.clone(),
            csrf_nonce,
            user_id: user_id.clone(),
            issued_at,
            expires_at: issued_at + Duration::seconds(TOKEN_TTL_SECS),
        };

        if !self.store.put(token.to_record()).await? {
            // A concurrent issuance with a later timestamp already won
            warn!(
                session_id = %session_id,
                user_id = %user_id,
                "Handshake token superseded on arrival"
            );
            return Err(ApiError::TokenSuperseded(session_id.to_string()));
        }

        info!(
            session_id = %session_id,
            user_id = %user_id,
            expires_at = %token.expires_at,
            "Handshake token issued"
        );

        Ok(token)
    }

    /// Check a presented `(session_id, csrf_nonce, token)` triple.
    ///
    /// Checks run in order: a record exists, it has not expired, the nonce
    /// matches, the token matches. A successful check leaves the token in
    /// place so later realtime events can present it again.
    pub async fn validate_auth(
        &self,
        session_id: &SessionId,
        csrf_nonce: &str,
        token: &str,
    ) -> Result<UserId, AuthFailure> {
        let result = self.check(session_id, csrf_nonce, token).await;

        match &result {
            Ok(user_id) => {
                debug!(session_id = %session_id, user_id = %user_id, "Handshake token accepted");
            }
            Err(failure) if failure.is_server_error() => {
                warn!(session_id = %session_id, error = %failure, "Handshake validation failed");
            }
            Err(failure) => {
                debug!(
                    session_id = %session_id,
                    reason = failure.reason(),
                    "Handshake token rejected"
                );
            }
        }

        result
    }

    async fn check(
        &self,
        session_id: &SessionId,
        csrf_nonce: &str,
        token: &str,
    ) -> Result<UserId, AuthFailure> {
        let record = self
            .store
            .get(session_id)
            .await?
            .ok_or(AuthFailure::NotFound)?;

        // Never delete here: a re-issuance may have replaced the record since the read
        if record.is_expired(self.clock.now()) {
            return Err(AuthFailure::Expired);
        }
        if !record.matches_nonce(csrf_nonce) {
            return Err(AuthFailure::NonceMismatch);
        }
        if !record.matches_token(token) {
            return Err(AuthFailure::TokenMismatch);
        }

        Ok(record.user_id)
    }

    /// Remove the token for a session. Realtime session state is untouched.
    pub async fn revoke_session(&self, session_id: &SessionId) -> Result<bool, StoreError> {
        let removed = self.store.delete(session_id).await?;
        if removed {
            debug!(session_id = %session_id, "Handshake token revoked");
        }
        Ok(removed)
    }

    /// Drop every expired token from the store
    pub async fn purge_expired(&self) -> Result<usize, StoreError> {
        self.store.purge_expired(self.clock.now()).await
    }

    /// Run [`purge_expired`](Self::purge_expired) every `interval`.
    ///
    /// Returns `None` without spawning anything when `interval` is zero.
    pub fn spawn_cleanup_task(&self, interval: StdDuration) -> Option<JoinHandle<()>> {
        if interval.is_zero() {
            return None;
        }

        let coordinator = self.clone();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick fires immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match coordinator.purge_expired().await {
                    Ok(0) => {}
                    Ok(purged) => debug!(purged, "Purged expired handshake tokens"),
                    Err(e) => warn!(error = %e, "Handshake token purge failed"),
                }
            }
        }))
    }
}

/// 256 random bits, base64url encoded without padding
fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
