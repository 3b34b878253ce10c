//! Middleware components for the PlayCo API
//!
//! - `AuthUser`: bearer authentication extractor, 401 if missing or invalid

pub mod auth;

pub use auth::{AuthRejection, AuthUser};
