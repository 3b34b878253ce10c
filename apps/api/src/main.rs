use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use playco_api::clock::SystemClock;
use playco_api::config::{Config, TokenStoreKind};
use playco_api::repositories::{InMemoryTokenStore, RedisTokenStore, TokenStore};
use playco_api::services::JwtAuthenticator;
use playco_api::{build_cors_layer, build_router, AppServices, REALTIME_PATH};

/// Pick the handshake token backend.
///
/// `auto` uses Redis when it answers a PING and falls back to memory
/// otherwise; `redis` refuses to start without it.
async fn open_token_store(config: &Config) -> anyhow::Result<Arc<dyn TokenStore>> {
    if config.token_store == TokenStoreKind::Memory {
        tracing::info!("Using in-memory handshake token store");
        return Ok(Arc::new(InMemoryTokenStore::new()));
    }

    let redis = RedisTokenStore::open(config.redis().clone());
    let probe = match redis {
        Ok(store) => {
            let timeout = std::time::Duration::from_secs(config.redis().connect_timeout_secs);
            match tokio::time::timeout(timeout, store.ping()).await {
                Ok(Ok(())) => Ok(store),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err("connection timed out".to_string()),
            }
        }
        Err(e) => Err(e.to_string()),
    };

    match probe {
        Ok(store) => {
            tracing::info!("Redis connected for handshake tokens");
            Ok(Arc::new(store))
        }
        Err(e) if config.token_store == TokenStoreKind::Redis => {
            anyhow::bail!("TOKEN_STORE=redis but Redis is unavailable: {}", e)
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Redis unavailable, falling back to in-memory handshake tokens. \
                 Tokens will not be shared between API instances."
            );
            Ok(Arc::new(InMemoryTokenStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "playco_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    tracing::info!(
        environment = %config.environment(),
        log_level = %config.common.log_level,
        "Starting PlayCo API server on port {}",
        config.port
    );

    let store = open_token_store(&config).await?;
    let authenticator = Arc::new(JwtAuthenticator::new(config.auth()));

    let services = AppServices::new(
        store,
        Arc::new(SystemClock),
        authenticator,
        config.csrf_min_length,
        config.registry()?,
    );

    let _cleanup = services
        .coordinator
        .spawn_cleanup_task(config.token_cleanup_interval);
    if config.token_cleanup_interval.is_zero() {
        tracing::info!("Handshake token purge task disabled");
    }

    let app = build_router(&services)
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(&config));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Listening on {}", addr);
    tracing::info!("Realtime endpoint at ws://{}{}", addr, REALTIME_PATH);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
