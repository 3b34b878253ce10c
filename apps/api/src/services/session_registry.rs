//! Realtime session registry
//!
//! Holds one [`RealtimeSession`] per authenticated connection. The registry
//! owns each session's [`AppState`]; handshake token issuance never touches
//! it. Sessions are bound to their owner at the first successful validation
//! and removed when the transport reports a disconnect.
//!
//! When a grace period is configured, a dropped session's state is parked
//! under its owner and handed to that owner's next new session if it
//! authenticates before the window closes.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, info};

use crate::clock::SharedClock;
use crate::models::{AppState, RealtimeSession, SessionId, UserId};

/// Errors from binding a session to a user
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("user {user_id} already has {max} realtime sessions")]
    SessionLimitReached { user_id: UserId, max: usize },

    #[error("session {session_id} belongs to another user")]
    OwnerMismatch { session_id: SessionId },
}

/// How `get_or_create` satisfied the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// New session with empty state
    Created,
    /// New session that picked up state parked by a recent disconnect
    Restored,
    /// Session already existed for this connection
    Resumed,
}

#[derive(Debug, Clone)]
struct ParkedState {
    app_state: AppState,
    parked_at: DateTime<Utc>,
}

/// Registry settings
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Live authenticated sessions allowed per user
    pub max_sessions_per_user: usize,
    /// How long a dropped session's state waits for its owner, zero disables
    pub grace_period: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_sessions_per_user: 5,
            grace_period: Duration::zero(),
        }
    }
}

/// Shared registry of authenticated realtime sessions
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<SessionId, RealtimeSession>>,
    /// Session numbers in use per user
    numbers: Arc<DashMap<UserId, BTreeSet<u32>>>,
    parked: Arc<DashMap<UserId, ParkedState>>,
    clock: SharedClock,
    config: RegistryConfig,
}

impl SessionRegistry {
    pub fn new(clock: SharedClock, config: RegistryConfig) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            numbers: Arc::new(DashMap::new()),
            parked: Arc::new(DashMap::new()),
            clock,
            config,
        }
    }

    /// Return the session for `session_id`, creating it for `user_id` if absent.
    ///
    /// An existing session keeps its state and has `last_seen_at` refreshed.
    pub fn get_or_create(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
    ) -> Result<(RealtimeSession, SessionOutcome), RegistryError> {
        let now = self.clock.now();

        if let Some(session) = self.touch(session_id, user_id, now)? {
            return Ok((session, SessionOutcome::Resumed));
        }

        // The per-user entry guard serializes the limit check with the insert
        let mut numbers = self.numbers.entry(user_id.clone()).or_default();

        let session = match self.sessions.entry(session_id.clone()) {
            Entry::Occupied(mut existing) => {
                if &existing.get().user_id != user_id {
                    return Err(RegistryError::OwnerMismatch {
                        session_id: session_id.clone(),
                    });
                }
                existing.get_mut().last_seen_at = now;
                return Ok((existing.get().clone(), SessionOutcome::Resumed));
            }
            Entry::Vacant(slot) => {
                if numbers.len() >= self.config.max_sessions_per_user {
                    return Err(RegistryError::SessionLimitReached {
                        user_id: user_id.clone(),
                        max: self.config.max_sessions_per_user,
                    });
                }

                let session_number = (1..).find(|n| !numbers.contains(n)).unwrap_or(1);
                numbers.insert(session_number);

                let restored = self.take_parked(user_id, now);
                self.evict_parked(now);
                let outcome = if restored.is_some() {
                    SessionOutcome::Restored
                } else {
                    SessionOutcome::Created
                };

                let session = RealtimeSession {
                    session_id: session_id.clone(),
                    user_id: user_id.clone(),
                    session_number,
                    created_at: now,
                    last_seen_at: now,
                    app_state: restored.unwrap_or_default(),
                };
                slot.insert(session.clone());
                (session, outcome)
            }
        };

        info!(
            session_id = %session_id,
            user_id = %user_id,
            session_number = session.0.session_number,
            outcome = ?session.1,
            "Realtime session registered"
        );

        Ok(session)
    }

    fn touch(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<RealtimeSession>, RegistryError> {
        match self.sessions.get_mut(session_id) {
            Some(mut session) if &session.user_id == user_id => {
                session.last_seen_at = now;
                Ok(Some(session.clone()))
            }
            Some(_) => Err(RegistryError::OwnerMismatch {
                session_id: session_id.clone(),
            }),
            None => Ok(None),
        }
    }

    fn take_parked(&self, user_id: &UserId, now: DateTime<Utc>) -> Option<AppState> {
        let (_, parked) = self.parked.remove(user_id)?;
        if now - parked.parked_at <= self.config.grace_period {
            Some(parked.app_state)
        } else {
            debug!(user_id = %user_id, "Parked session state expired");
            None
        }
    }

    /// Drop parked state whose grace period has run out
    fn evict_parked(&self, now: DateTime<Utc>) -> usize {
        let before = self.parked.len();
        self.parked
            .retain(|_, parked| now - parked.parked_at <= self.config.grace_period);
        let evicted = before.saturating_sub(self.parked.len());
        if evicted > 0 {
            debug!(evicted, "Evicted expired parked session state");
        }
        evicted
    }

    /// Read a session
    pub fn get(&self, session_id: &SessionId) -> Option<RealtimeSession> {
        self.sessions.get(session_id).map(|s| s.clone())
    }

    /// Replace a session's application state. Returns `false` if the session is gone.
    pub fn update_state(&self, session_id: &SessionId, app_state: AppState) -> bool {
        self.modify_state(session_id, |state| *state = app_state)
            .is_some()
    }

    /// Edit a session's application state in place
    pub fn modify_state<R>(
        &self,
        session_id: &SessionId,
        f: impl FnOnce(&mut AppState) -> R,
    ) -> Option<R> {
        let mut session = self.sessions.get_mut(session_id)?;
        session.last_seen_at = self.clock.now();
        Some(f(&mut session.app_state))
    }

    /// Forget a session after its transport disconnected.
    ///
    /// With a grace period configured, non-empty state is parked for the
    /// owner's next session.
    pub fn drop_session(&self, session_id: &SessionId) -> Option<RealtimeSession> {
        let (_, session) = self.sessions.remove(session_id)?;

        if let Entry::Occupied(mut numbers) = self.numbers.entry(session.user_id.clone()) {
            numbers.get_mut().remove(&session.session_number);
            if numbers.get().is_empty() {
                numbers.remove();
            }
        }

        let now = self.clock.now();
        self.evict_parked(now);

        if self.config.grace_period > Duration::zero() && !session.app_state.is_empty() {
            self.parked.insert(
                session.user_id.clone(),
                ParkedState {
                    app_state: session.app_state.clone(),
                    parked_at: now,
                },
            );
            debug!(user_id = %session.user_id, "Parked session state for reconnect");
        }

        info!(
            session_id = %session_id,
            user_id = %session.user_id,
            "Realtime session dropped"
        );

        Some(session)
    }

    /// Live sessions owned by a user
    pub fn session_count(&self, user_id: &UserId) -> usize {
        self.numbers.get(user_id).map(|n| n.len()).unwrap_or(0)
    }

    /// Total live sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
