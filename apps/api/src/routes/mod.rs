//! HTTP route handlers
//!
//! - Handshake token issuance
//! - Health check and status endpoints

pub mod health;
pub mod socketio_auth;

pub use health::{health_router, HealthState};
pub use socketio_auth::{socketio_auth_router, SocketioAuthState};
