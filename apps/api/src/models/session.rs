//! Realtime session models

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::handshake::{SessionId, UserId};

/// What a session is doing inside one playlist room
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomPresence {
    /// Index of the playlist item this participant is playing, if any
    pub currently_playing: Option<u32>,
}

/// Application state carried by a realtime session
///
/// Owned by the session registry. Token issuance never touches it, so it
/// survives re-authentication of the same session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppState {
    /// Playlist rooms the session has entered, keyed by playlist id
    pub rooms: BTreeMap<u64, RoomPresence>,
}

impl AppState {
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

/// Authenticated realtime connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeSession {
    pub session_id: SessionId,
    /// Owner, bound at the first successful validation
    pub user_id: UserId,
    /// Ordinal among the owner's live sessions, starting at 1
    pub session_number: u32,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub app_state: AppState,
}
