//! Realtime channel
//!
//! - `handler`: WebSocket upgrade and per-connection read/write loops
//! - `connection`: live connections keyed by session id
//! - `messages`: wire frames and response payloads
//! - `correlation`: one response per request, to the requester only
//! - `events`: request handling for authentication and playlist rooms

pub mod connection;
pub mod correlation;
pub mod events;
pub mod handler;
pub mod messages;

pub use connection::{ConnectionManager, Outbound};
pub use correlation::PendingRequests;
pub use events::RealtimeState;
pub use handler::ws_handler;
pub use messages::{ClientEvent, ClientFrame, ResponsePayload, ServerMessage, SubCode};
