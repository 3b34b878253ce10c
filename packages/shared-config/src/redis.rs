//! Redis configuration types

use crate::{get_env_or_default, parse_env, ConfigResult};

/// Redis configuration
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,

    /// Optional password for Redis authentication
    pub password: Option<String>,

    /// Prefix for every key written by PlayCo services
    pub key_prefix: String,

    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
}

impl RedisConfig {
    /// Load Redis configuration from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        Ok(Self {
            url: get_env_or_default("REDIS_URL", "redis://localhost:6379"),
            password: std::env::var("REDIS_PASSWORD").ok().filter(|s| !s.is_empty()),
            key_prefix: get_env_or_default("REDIS_KEY_PREFIX", "playco"),
            connect_timeout_secs: parse_env("REDIS_CONNECT_TIMEOUT", 5)?,
        })
    }

    /// Create a configuration with a custom URL (useful for testing)
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Build the full connection URL including password if set
    pub fn connection_url(&self) -> String {
        if let Some(ref password) = self.password {
            if let Some(pos) = self.url.find("://") {
                let (scheme, rest) = self.url.split_at(pos + 3);
                return format!("{}:{}@{}", scheme, password, rest);
            }
        }
        self.url.clone()
    }

    /// Namespaced key, e.g. `playco.sio_tokens.<sid>`
    pub fn key(&self, parts: &[&str]) -> String {
        let mut key = self.key_prefix.clone();
        for part in parts {
            key.push('.');
            key.push_str(part);
        }
        key
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            password: None,
            key_prefix: "playco".to_string(),
            connect_timeout_secs: 5,
        }
    }
}
