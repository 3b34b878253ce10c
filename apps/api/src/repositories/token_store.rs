//! Token store abstraction and the in-memory backend

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;

use crate::models::{SessionId, TokenRecord};

/// Errors raised by token store backends
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("corrupt token record: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Keyed storage for handshake token records, one record per session id
///
/// Writes replace a whole record atomically. A write never replaces a record
/// issued later than itself, so concurrent issuances for the same session
/// settle on the newest one.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Short backend name for logs and health output
    fn backend(&self) -> &'static str;

    /// Current record for a session, expired or not
    async fn get(&self, session_id: &SessionId) -> Result<Option<TokenRecord>, StoreError>;

    /// Store a record, replacing any older one for the same session.
    ///
    /// Returns `false` when a newer record was already present and kept.
    async fn put(&self, record: TokenRecord) -> Result<bool, StoreError>;

    /// Remove the record for a session. Returns whether one existed.
    async fn delete(&self, session_id: &SessionId) -> Result<bool, StoreError>;

    /// Drop records that expired at or before `now`, returning how many went
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;

    /// Backend liveness probe
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Process-local token store
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    records: DashMap<SessionId, TokenRecord>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held, expired ones included
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, session_id: &SessionId) -> Result<Option<TokenRecord>, StoreError> {
        Ok(self.records.get(session_id).map(|r| r.value().clone()))
    }

    async fn put(&self, record: TokenRecord) -> Result<bool, StoreError> {
        // The entry guard holds the shard lock for the whole compare-and-replace
        match self.records.entry(record.session_id.clone()) {
            Entry::Occupied(existing) if existing.get().issued_at > record.issued_at => Ok(false),
            Entry::Occupied(mut existing) => {
                existing.insert(record);
                Ok(true)
            }
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(true)
            }
        }
    }

    async fn delete(&self, session_id: &SessionId) -> Result<bool, StoreError> {
        Ok(self.records.remove(session_id).is_some())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let before = self.records.len();
        self.records.retain(|_, record| !record.is_expired(now));
        Ok(before.saturating_sub(self.records.len()))
    }
}
