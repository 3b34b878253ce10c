//! Services behind the HTTP and realtime endpoints
//!
//! - `auth`: bearer token verification for the REST side
//! - `handshake`: handshake token issuance and validation
//! - `session_registry`: realtime session state per connection
//! - `room`: playlist rooms shared by realtime sessions
//! - `health`: dependency checks

pub mod auth;
pub mod handshake;
pub mod health;
pub mod room;
pub mod session_registry;

pub use auth::{AuthConfig, BearerAuthenticator, JwtAuthenticator, SharedAuthenticator};
pub use handshake::{AuthFailure, HandshakeCoordinator};
pub use health::HealthService;
pub use room::{LeaveOutcome, Participant, RoomError, RoomRegistry, RoomView};
pub use session_registry::{RegistryConfig, RegistryError, SessionOutcome, SessionRegistry};
