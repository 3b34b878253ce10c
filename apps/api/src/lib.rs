//! PlayCo realtime handshake service
//!
//! Issues short-lived handshake tokens over REST and binds them to realtime
//! WebSocket sessions. Exposed as a library for the binary and the
//! integration tests.

pub mod app;
pub mod clock;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod websocket;

// Re-export commonly used types
pub use app::{build_cors_layer, build_router, AppServices, REALTIME_PATH};
pub use error::{ApiError, ApiResult, ErrorResponse};
pub use services::{AuthConfig, HandshakeCoordinator, SessionRegistry};
