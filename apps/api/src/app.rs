//! Service wiring and router assembly
//!
//! `main` and the integration tests build the same router from
//! [`AppServices`]; only the outer layers (tracing, CORS) differ.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{header, Method},
    routing::get,
    Router,
};
use tower_http::cors::CorsLayer;

use crate::clock::SharedClock;
use crate::config::Config;
use crate::repositories::TokenStore;
use crate::routes::{health_router, socketio_auth_router, HealthState, SocketioAuthState};
use crate::services::{
    HandshakeCoordinator, HealthService, RegistryConfig, RoomRegistry, SessionRegistry,
    SharedAuthenticator,
};
use crate::websocket::{ws_handler, ConnectionManager, RealtimeState};

/// Path of the realtime WebSocket endpoint
pub const REALTIME_PATH: &str = "/playco_ws";

/// Long-lived services shared by every request
#[derive(Clone)]
pub struct AppServices {
    pub coordinator: HandshakeCoordinator,
    pub registry: SessionRegistry,
    pub rooms: RoomRegistry,
    pub connections: ConnectionManager,
    pub authenticator: SharedAuthenticator,
}

impl AppServices {
    pub fn new(
        store: Arc<dyn TokenStore>,
        clock: SharedClock,
        authenticator: SharedAuthenticator,
        csrf_min_length: usize,
        registry_config: RegistryConfig,
    ) -> Self {
        Self {
            coordinator: HandshakeCoordinator::new(store, clock.clone(), csrf_min_length),
            registry: SessionRegistry::new(clock, registry_config),
            rooms: RoomRegistry::new(),
            connections: ConnectionManager::new(),
            authenticator,
        }
    }

    /// State handed to the realtime endpoint
    pub fn realtime(&self) -> RealtimeState {
        RealtimeState::new(
            self.coordinator.clone(),
            self.registry.clone(),
            self.rooms.clone(),
            self.connections.clone(),
        )
    }
}

/// Build the router without the outer tracing and CORS layers
pub fn build_router(services: &AppServices) -> Router {
    let health_state = HealthState::new(HealthService::new(services.coordinator.clone()));
    let auth_state =
        SocketioAuthState::new(services.coordinator.clone(), services.connections.clone());

    Router::new()
        .route("/", get(root))
        // Nested health routes: /health, /health/live, /health/ready
        .nest("/health", health_router(health_state))
        // Handshake token issuance: /playco/socketio/auth
        .merge(socketio_auth_router(auth_state))
        .route(REALTIME_PATH, get(ws_handler))
        // Services as extensions for extractors
        .layer(Extension(services.realtime()))
        .layer(Extension(services.authenticator.clone()))
}

async fn root() -> &'static str {
    "PlayCo realtime handshake service"
}

/// Build the CORS layer based on configuration.
///
/// In production mode:
/// - If `CORS_ORIGINS` is set, only those origins are allowed
/// - If `CORS_ORIGINS` is not set, CORS requests are rejected
///
/// In development mode:
/// - If `CORS_ORIGINS` is set, those origins are used
/// - If `CORS_ORIGINS` is not set, permissive CORS is used
pub fn build_cors_layer(config: &Config) -> CorsLayer {
    let is_production = config.environment().is_production();

    match &config.cors_allowed_origins {
        Some(origins) if !origins.is_empty() => {
            let allowed_origins: Vec<_> = origins
                .iter()
                .filter_map(|origin| {
                    origin.parse().ok().or_else(|| {
                        tracing::warn!("Invalid CORS origin '{}', skipping", origin);
                        None
                    })
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::error!("No valid CORS origins configured, CORS requests will be rejected");
                CorsLayer::new()
            } else {
                tracing::info!(
                    "CORS configured with {} allowed origin(s): {:?}",
                    allowed_origins.len(),
                    origins
                );
                CorsLayer::new()
                    .allow_origin(allowed_origins)
                    .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                    .allow_headers([
                        header::AUTHORIZATION,
                        header::CONTENT_TYPE,
                        header::ACCEPT,
                        header::ORIGIN,
                    ])
                    .allow_credentials(true)
                    .max_age(std::time::Duration::from_secs(3600))
            }
        }
        _ if is_production => {
            tracing::warn!(
                "CORS_ORIGINS not configured in production mode. \
                 CORS requests will be rejected. Set CORS_ORIGINS to allow cross-origin requests."
            );
            CorsLayer::new()
        }
        _ => {
            tracing::warn!(
                "Using permissive CORS in development mode. \
                 Set CORS_ORIGINS for production-like behavior."
            );
            CorsLayer::permissive()
        }
    }
}
