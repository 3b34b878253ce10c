//! Playlist rooms
//!
//! A room groups the realtime sessions currently looking at one playlist,
//! together with what each of them is playing. Rooms are created by the
//! first entry and closed when the last participant leaves.
//!
//! The published [`RoomView`] identifies participants by owner and session
//! number (`<user_id>#<n>`), never by session id.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;

use crate::models::{SessionId, UserId};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoomError {
    #[error("room {0} does not exist")]
    RoomNotFound(u64),
    #[error("session is not in room {0}")]
    NotInRoom(u64),
}

/// One session inside a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Participant {
    pub user_id: UserId,
    pub session_number: u32,
    pub currently_playing: Option<u32>,
}

impl Participant {
    /// Public label, e.g. `alice#2`
    pub fn label(&self) -> String {
        format!("{}#{}", self.user_id, self.session_number)
    }
}

/// Room state as published to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomView {
    pub playlist_id: u64,
    /// Participants keyed by label
    pub participants: BTreeMap<String, Participant>,
}

/// Result of leaving a room
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// Others remain; carries the updated view and who to notify
    Left {
        view: RoomView,
        remaining: Vec<SessionId>,
    },
    /// The leaver was the last participant
    Closed,
}

type Members = BTreeMap<SessionId, Participant>;

/// Live playlist rooms
#[derive(Debug, Clone, Default)]
pub struct RoomRegistry {
    rooms: Arc<DashMap<u64, Members>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a session in a room, creating the room if needed.
    ///
    /// Returns the updated view and every member to notify, the newcomer included.
    pub fn enter(
        &self,
        playlist_id: u64,
        session_id: &SessionId,
        participant: Participant,
    ) -> (RoomView, Vec<SessionId>) {
        let mut members = self.rooms.entry(playlist_id).or_default();
        members.insert(session_id.clone(), participant);
        (
            view_of(playlist_id, &members),
            members.keys().cloned().collect(),
        )
    }

    /// Remove a session from a room, closing the room if it empties
    pub fn leave(
        &self,
        playlist_id: u64,
        session_id: &SessionId,
    ) -> Result<LeaveOutcome, RoomError> {
        match self.rooms.entry(playlist_id) {
            Entry::Vacant(_) => Err(RoomError::RoomNotFound(playlist_id)),
            Entry::Occupied(mut room) => {
                if room.get_mut().remove(session_id).is_none() {
                    return Err(RoomError::NotInRoom(playlist_id));
                }
                if room.get().is_empty() {
                    room.remove();
                    return Ok(LeaveOutcome::Closed);
                }
                Ok(LeaveOutcome::Left {
                    view: view_of(playlist_id, room.get()),
                    remaining: room.get().keys().cloned().collect(),
                })
            }
        }
    }

    /// Change what a session is playing inside a room
    pub fn set_status(
        &self,
        playlist_id: u64,
        session_id: &SessionId,
        currently_playing: u32,
    ) -> Result<(RoomView, Vec<SessionId>), RoomError> {
        let mut members = self
            .rooms
            .get_mut(&playlist_id)
            .ok_or(RoomError::RoomNotFound(playlist_id))?;
        let participant = members
            .get_mut(session_id)
            .ok_or(RoomError::NotInRoom(playlist_id))?;
        participant.currently_playing = Some(currently_playing);

        Ok((
            view_of(playlist_id, &members),
            members.keys().cloned().collect(),
        ))
    }

    /// Current view of a room
    pub fn view(&self, playlist_id: u64) -> Option<RoomView> {
        self.rooms
            .get(&playlist_id)
            .map(|members| view_of(playlist_id, &members))
    }

    /// Number of open rooms
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

fn view_of(playlist_id: u64, members: &Members) -> RoomView {
    RoomView {
        playlist_id,
        participants: members
            .values()
            .map(|p| (p.label(), p.clone()))
            .collect(),
    }
}
