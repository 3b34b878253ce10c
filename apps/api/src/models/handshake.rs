//! Handshake identifiers, nonces and tokens
//!
//! A handshake token binds a realtime session id to the CSRF nonce the
//! client submitted alongside its bearer credentials. The plaintext token is
//! only ever handed back to the issuing client; stores keep a SHA-256 digest
//! of it (and of the nonce) inside a [`TokenRecord`].

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Handshake tokens live for exactly one hour
pub const TOKEN_TTL_SECS: i64 = 60 * 60;

/// Default minimum nonce length (overridable through `SIO_CSRF_MIN_LENGTH`)
pub const DEFAULT_MIN_NONCE_LEN: usize = 16;

/// Upper bound on nonce length
pub const MAX_NONCE_LEN: usize = 256;

/// A nonce must contain at least this many distinct characters, or as many
/// as the configured minimum length when that is smaller
pub const MIN_DISTINCT_NONCE_CHARS: usize = 6;

/// Maximum length for a realtime session id
pub const MAX_SESSION_ID_LEN: usize = 128;

// ========== Identifiers ==========

/// Identifier the REST authenticator resolved from a bearer token
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors from parsing a realtime session id
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionIdError {
    #[error("sid cannot be empty")]
    Empty,
    #[error("sid exceeds maximum length of {MAX_SESSION_ID_LEN} (got {0})")]
    TooLong(usize),
    #[error("sid may only contain ASCII letters, digits, '-' and '_'")]
    InvalidCharacter,
}

/// Identifier the realtime transport assigns to a connection
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Parse and validate a session id
    pub fn parse(raw: impl Into<String>) -> Result<Self, SessionIdError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(SessionIdError::Empty);
        }
        if raw.len() > MAX_SESSION_ID_LEN {
            return Err(SessionIdError::TooLong(raw.len()));
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(SessionIdError::InvalidCharacter);
        }
        Ok(Self(raw))
    }

    /// Fresh random session id for a new connection
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SessionId {
    type Error = SessionIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<SessionId> for String {
    fn from(value: SessionId) -> Self {
        value.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ========== CSRF nonce ==========

/// Reasons a CSRF nonce is rejected at issuance
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NonceError {
    #[error("sio_csrf_token is required")]
    Missing,
    #[error("sio_csrf_token must be at least {min} characters")]
    TooShort { min: usize },
    #[error("sio_csrf_token must be at most {MAX_NONCE_LEN} characters")]
    TooLong,
    #[error("sio_csrf_token must not contain whitespace or control characters")]
    InvalidCharacter,
    #[error("sio_csrf_token must contain at least {required} distinct characters")]
    LowEntropy { required: usize },
}

/// Client-chosen nonce that must accompany the token on every realtime call
#[derive(Clone, PartialEq, Eq)]
pub struct CsrfNonce(String);

impl CsrfNonce {
    /// Validate a nonce submitted at issuance
    pub fn parse(raw: &str, min_len: usize) -> Result<Self, NonceError> {
        if raw.is_empty() {
            return Err(NonceError::Missing);
        }
        let len = raw.chars().count();
        if len < min_len {
            return Err(NonceError::TooShort { min: min_len });
        }
        if len > MAX_NONCE_LEN {
            return Err(NonceError::TooLong);
        }
        if raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(NonceError::InvalidCharacter);
        }
        let required = MIN_DISTINCT_NONCE_CHARS.min(min_len);
        if raw.chars().collect::<HashSet<_>>().len() < required {
            return Err(NonceError::LowEntropy { required });
        }
        Ok(Self(raw.to_string()))
    }

    pub fn digest(&self) -> String {
        sha256_hex(&self.0)
    }
}

// Nonces are secrets, keep them out of logs
impl fmt::Debug for CsrfNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CsrfNonce(..)")
    }
}

// ========== Tokens ==========

/// Token handed back to the client that requested it
#[derive(Clone)]
pub struct HandshakeToken {
    pub token: String,
    pub session_id: SessionId,
    pub csrf_nonce: CsrfNonce,
    pub user_id: UserId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for HandshakeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandshakeToken")
            .field("session_id", &self.session_id)
            .field("user_id", &self.user_id)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl HandshakeToken {
    /// The form kept by token stores
    pub fn to_record(&self) -> TokenRecord {
        TokenRecord {
            session_id: self.session_id.clone(),
            user_id: self.user_id.clone(),
            token_hash: sha256_hex(&self.token),
            nonce_hash: self.csrf_nonce.digest(),
            issued_at: self.issued_at,
            expires_at: self.expires_at,
        }
    }
}

/// Stored form of a handshake token, one per session id
///
/// Timestamps serialize as epoch milliseconds so Redis scripts can compare
/// them numerically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub token_hash: String,
    pub nonce_hash: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub issued_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
}

impl TokenRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn matches_nonce(&self, presented: &str) -> bool {
        constant_time_eq(self.nonce_hash.as_bytes(), sha256_hex(presented).as_bytes())
    }

    pub fn matches_token(&self, presented: &str) -> bool {
        constant_time_eq(self.token_hash.as_bytes(), sha256_hex(presented).as_bytes())
    }
}

fn sha256_hex(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
