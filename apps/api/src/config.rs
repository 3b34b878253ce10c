//! API server configuration

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use playco_shared_config::{
    parse_duration_env, parse_env, CommonConfig, Environment, RedisConfig,
};

use crate::models::{DEFAULT_MIN_NONCE_LEN, MAX_NONCE_LEN};
use crate::services::{AuthConfig, RegistryConfig};

/// Minimum required length for JWT_SECRET to be considered secure
const MIN_JWT_SECRET_LENGTH: usize = 32;

/// Which backend holds handshake tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenStoreKind {
    /// Redis if it answers at startup, memory otherwise
    #[default]
    Auto,
    Memory,
    Redis,
}

impl FromStr for TokenStoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "memory" | "in-memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            other => Err(format!(
                "unknown token store '{}', expected auto, memory or redis",
                other
            )),
        }
    }
}

impl fmt::Display for TokenStoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Memory => write!(f, "memory"),
            Self::Redis => write!(f, "redis"),
        }
    }
}

/// API server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Common configuration shared with other services
    pub common: CommonConfig,

    /// Server port (default: 8080)
    pub port: u16,

    /// Secret for verifying bearer tokens
    pub jwt_secret: String,

    /// Expected `iss` claim (default: playco)
    pub jwt_issuer: String,

    /// Expected `aud` claim (default: playco)
    pub jwt_audience: String,

    /// Handshake token backend (default: auto)
    pub token_store: TokenStoreKind,

    /// Minimum CSRF nonce length (default: 16)
    pub csrf_min_length: usize,

    /// Authenticated realtime sessions per user (default: 5)
    pub max_sessions_per_user: usize,

    /// Reconnect grace window for parked session state (default: 0s)
    pub session_grace_period: Duration,

    /// Expired token purge interval (default: 5m, 0s disables)
    pub token_cleanup_interval: Duration,

    /// CORS allowed origins (optional)
    pub cors_allowed_origins: Option<Vec<String>>,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// In production mode `JWT_SECRET` must be set and at least 32
    /// characters long. Development and staging fall back to a default.
    pub fn from_env() -> Result<Self> {
        let environment = Environment::from_env();
        let jwt_secret = Self::load_jwt_secret(environment.is_production())?;

        let common = CommonConfig::from_env()
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

        let csrf_min_length = Self::load_csrf_min_length()?;

        let max_sessions_per_user: usize = parse_env("MAX_SESSIONS_PER_USER", 5)
            .context("Invalid MAX_SESSIONS_PER_USER value")?;
        if max_sessions_per_user == 0 {
            bail!("MAX_SESSIONS_PER_USER must be at least 1");
        }

        Ok(Self {
            common,

            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid PORT value")?,

            jwt_secret,

            jwt_issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "playco".to_string()),

            jwt_audience: env::var("JWT_AUDIENCE").unwrap_or_else(|_| "playco".to_string()),

            token_store: env::var("TOKEN_STORE")
                .ok()
                .filter(|s| !s.is_empty())
                .map(|s| s.parse::<TokenStoreKind>())
                .transpose()
                .map_err(|e| anyhow::anyhow!(e))?
                .unwrap_or_default(),

            csrf_min_length,

            max_sessions_per_user,

            session_grace_period: parse_duration_env("SESSION_GRACE_PERIOD", "0s")
                .context("Invalid SESSION_GRACE_PERIOD value")?,

            token_cleanup_interval: parse_duration_env("TOKEN_CLEANUP_INTERVAL", "5m")
                .context("Invalid TOKEN_CLEANUP_INTERVAL value")?,

            cors_allowed_origins: env::var("CORS_ORIGINS").ok().map(|s| {
                s.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            }),
        })
    }

    /// Load and validate JWT_SECRET
    fn load_jwt_secret(is_production: bool) -> Result<String> {
        match env::var("JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => {
                if is_production && secret.len() < MIN_JWT_SECRET_LENGTH {
                    bail!(
                        "JWT_SECRET must be at least {} characters in production (got {})",
                        MIN_JWT_SECRET_LENGTH,
                        secret.len()
                    );
                }
                Ok(secret)
            }
            _ if is_production => {
                bail!(
                    "JWT_SECRET environment variable is required in production. \
                     Please set a secure secret of at least {} characters.",
                    MIN_JWT_SECRET_LENGTH
                );
            }
            _ => {
                tracing::warn!(
                    "JWT_SECRET not set, using insecure default. \
                     This is only acceptable in development mode."
                );
                Ok("development-secret-change-in-production".to_string())
            }
        }
    }

    /// Load SIO_CSRF_MIN_LENGTH, bounded by the maximum nonce length
    fn load_csrf_min_length() -> Result<usize> {
        let min: usize = parse_env("SIO_CSRF_MIN_LENGTH", DEFAULT_MIN_NONCE_LEN)
            .context("Invalid SIO_CSRF_MIN_LENGTH value")?;
        if min == 0 || min > MAX_NONCE_LEN {
            bail!(
                "SIO_CSRF_MIN_LENGTH must be between 1 and {} (got {})",
                MAX_NONCE_LEN,
                min
            );
        }
        Ok(min)
    }

    /// Bearer token verification settings
    pub fn auth(&self) -> AuthConfig {
        AuthConfig {
            jwt_secret: self.jwt_secret.clone(),
            issuer: self.jwt_issuer.clone(),
            audience: self.jwt_audience.clone(),
        }
    }

    /// Session registry settings
    pub fn registry(&self) -> Result<RegistryConfig> {
        Ok(RegistryConfig {
            max_sessions_per_user: self.max_sessions_per_user,
            grace_period: chrono::Duration::from_std(self.session_grace_period)
                .context("SESSION_GRACE_PERIOD is out of range")?,
        })
    }

    /// Get Redis configuration
    pub fn redis(&self) -> &RedisConfig {
        &self.common.redis
    }

    /// Get environment mode
    pub fn environment(&self) -> Environment {
        self.common.environment
    }
}
