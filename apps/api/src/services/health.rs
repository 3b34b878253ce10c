//! Health checks for the handshake service's dependencies
//!
//! Only the token store is external. The in-memory backend is always
//! healthy; the Redis backend is probed with `PING`.

use serde::Serialize;
use std::time::{Duration, Instant};

use super::handshake::HandshakeCoordinator;

/// Upper bound on a single dependency probe
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Status of an individual service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Healthy,
    Unhealthy,
}

/// Result of a single service health check
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    pub name: &'static str,
    pub status: ServiceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ServiceHealth {
    pub fn healthy_with_details(
        name: &'static str,
        response_time: Duration,
        details: serde_json::Value,
    ) -> Self {
        Self {
            name,
            status: ServiceStatus::Healthy,
            response_time_ms: Some(response_time.as_millis() as u64),
            error: None,
            details: Some(details),
        }
    }

    pub fn unhealthy_with_time(
        name: &'static str,
        error: impl Into<String>,
        response_time: Duration,
    ) -> Self {
        Self {
            name,
            status: ServiceStatus::Unhealthy,
            response_time_ms: Some(response_time.as_millis() as u64),
            error: Some(error.into()),
            details: None,
        }
    }
}

/// Aggregated health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResponse {
    /// Healthy only if every service is healthy
    pub status: ServiceStatus,
    pub services: Vec<ServiceHealth>,
    pub total_time_ms: u64,
    pub version: &'static str,
}

impl HealthCheckResponse {
    pub fn new(services: Vec<ServiceHealth>, total_time: Duration) -> Self {
        let status = if services.iter().all(|s| s.status == ServiceStatus::Healthy) {
            ServiceStatus::Healthy
        } else {
            ServiceStatus::Unhealthy
        };

        Self {
            status,
            services,
            total_time_ms: total_time.as_millis() as u64,
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == ServiceStatus::Healthy
    }
}

/// Health check service
#[derive(Clone)]
pub struct HealthService {
    coordinator: HandshakeCoordinator,
}

impl HealthService {
    pub fn new(coordinator: HandshakeCoordinator) -> Self {
        Self { coordinator }
    }

    /// Probe the handshake token store
    pub async fn check_token_store(&self) -> ServiceHealth {
        let backend = self.coordinator.store_backend();
        let start = Instant::now();

        match tokio::time::timeout(PROBE_TIMEOUT, self.coordinator.ping_store()).await {
            Ok(Ok(())) => ServiceHealth::healthy_with_details(
                "token_store",
                start.elapsed(),
                serde_json::json!({ "backend": backend }),
            ),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, backend, "Token store health check failed");
                ServiceHealth::unhealthy_with_time(
                    "token_store",
                    format!("{} unreachable: {}", backend, e),
                    start.elapsed(),
                )
            }
            Err(_) => ServiceHealth::unhealthy_with_time(
                "token_store",
                format!("{} probe timed out", backend),
                start.elapsed(),
            ),
        }
    }

    /// Run every check
    pub async fn check_all(&self) -> HealthCheckResponse {
        let start = Instant::now();
        let services = vec![self.check_token_store().await];
        HealthCheckResponse::new(services, start.elapsed())
    }
}
