//! Redis-backed token store
//!
//! Records are stored as JSON under `<prefix>.sio_tokens.<sid>` with a `PX`
//! expiry equal to the token's remaining lifetime, so Redis reclaims them on
//! its own. Replacement runs inside a Lua script to keep last-writer-wins
//! atomic across API instances.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use playco_shared_config::RedisConfig;
use tracing::debug;

use super::token_store::{StoreError, TokenStore};
use crate::models::{SessionId, TokenRecord};

/// Replace the stored record unless it was issued later than the new one.
///
/// KEYS[1] = record key
/// ARGV[1] = record JSON, ARGV[2] = issued_at (ms), ARGV[3] = ttl (ms)
const PUT_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if current then
    local ok, decoded = pcall(cjson.decode, current)
    if ok and decoded['issued_at'] and tonumber(decoded['issued_at']) > tonumber(ARGV[2]) then
        return 0
    end
end
redis.call('SET', KEYS[1], ARGV[1], 'PX', ARGV[3])
return 1
"#;

/// Key expiry for a record: its full lifetime, independent of the wall clock
fn ttl_millis(record: &TokenRecord) -> Option<i64> {
    let ttl = (record.expires_at - record.issued_at).num_milliseconds();
    (ttl > 0).then_some(ttl)
}

/// Token store shared by every API instance pointing at the same Redis
#[derive(Clone)]
pub struct RedisTokenStore {
    client: redis::Client,
    config: RedisConfig,
}

impl RedisTokenStore {
    /// Open a client for the configured Redis. Does not connect yet.
    pub fn open(config: RedisConfig) -> Result<Self, StoreError> {
        let client = redis::Client::open(config.connection_url().as_str())?;
        Ok(Self { client, config })
    }

    fn key(&self, session_id: &SessionId) -> String {
        self.config.key(&["sio_tokens", session_id.as_str()])
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, StoreError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl TokenStore for RedisTokenStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, session_id: &SessionId) -> Result<Option<TokenRecord>, StoreError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = redis::cmd("GET")
            .arg(self.key(session_id))
            .query_async(&mut conn)
            .await?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, record: TokenRecord) -> Result<bool, StoreError> {
        let Some(ttl_ms) = ttl_millis(&record) else {
            debug!(session_id = %record.session_id, "Skipping store of token without lifetime");
            return Ok(false);
        };

        let key = self.key(&record.session_id);
        let json = serde_json::to_string(&record)?;
        let mut conn = self.connection().await?;

        let script = redis::Script::new(PUT_SCRIPT);
        let stored: i64 = script
            .key(&key)
            .arg(json)
            .arg(record.issued_at.timestamp_millis())
            .arg(ttl_ms)
            .invoke_async(&mut conn)
            .await?;

        Ok(stored == 1)
    }

    async fn delete(&self, session_id: &SessionId) -> Result<bool, StoreError> {
        let mut conn = self.connection().await?;
        let removed: i64 = redis::cmd("DEL")
            .arg(self.key(session_id))
            .query_async(&mut conn)
            .await?;
        Ok(removed > 0)
    }

    async fn purge_expired(&self, _now: DateTime<Utc>) -> Result<usize, StoreError> {
        // PX expiry already reclaims keys server side
        Ok(0)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
