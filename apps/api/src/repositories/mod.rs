//! Storage layer for handshake tokens
//!
//! Token stores are explicitly owned objects injected into the handshake
//! coordinator. Two backends exist:
//! - `InMemoryTokenStore` for single-instance deployments and tests
//! - `RedisTokenStore` for deployments running several API instances

pub mod redis_token_store;
pub mod token_store;

pub use redis_token_store::RedisTokenStore;
pub use token_store::{InMemoryTokenStore, StoreError, TokenStore};
