//! Domain models for the realtime handshake
//!
//! - Identifiers (`SessionId`, `UserId`) and the CSRF nonce
//! - Handshake tokens and their stored records
//! - Realtime sessions and the application state they carry
//! - Bearer token claims

pub mod claims;
pub mod handshake;
pub mod session;

pub use claims::Claims;
pub use handshake::{
    CsrfNonce, HandshakeToken, NonceError, SessionId, SessionIdError, TokenRecord, UserId,
    DEFAULT_MIN_NONCE_LEN, MAX_NONCE_LEN, TOKEN_TTL_SECS,
};
pub use session::{AppState, RealtimeSession, RoomPresence};
