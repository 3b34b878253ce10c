//! Realtime event handling
//!
//! Turns client events into coordinator, registry and room operations and
//! produces exactly one response per request. Room changes are broadcast to
//! every member of the affected room.

use serde_json::json;
use tracing::{debug, info, warn};

use super::connection::ConnectionManager;
use super::correlation::{PendingRequests, FALLBACK_REQUEST_ID};
use super::messages::{
    BroadcastEvent, ClientEvent, Credentials, EventPayload, ResponsePayload, ServerMessage, SubCode,
};
use crate::models::{RealtimeSession, RoomPresence, SessionId};
use crate::services::handshake::{AuthFailure, HandshakeCoordinator};
use crate::services::room::{LeaveOutcome, Participant, RoomError, RoomRegistry, RoomView};
use crate::services::session_registry::{RegistryError, SessionOutcome, SessionRegistry};

/// Answer to a request, plus whether the connection must be closed after it
#[derive(Debug)]
struct Reply {
    payload: ResponsePayload,
    close: bool,
}

impl Reply {
    fn ok(payload: ResponsePayload) -> Self {
        Self {
            payload,
            close: false,
        }
    }

    fn of(sub_code: SubCode) -> Self {
        Self::ok(ResponsePayload::new(sub_code))
    }

    fn then_close(mut self) -> Self {
        self.close = true;
        self
    }
}

impl From<ResponsePayload> for Reply {
    fn from(payload: ResponsePayload) -> Self {
        Self::ok(payload)
    }
}

/// Shared services behind the realtime endpoint
#[derive(Clone)]
pub struct RealtimeState {
    pub coordinator: HandshakeCoordinator,
    pub registry: SessionRegistry,
    pub rooms: RoomRegistry,
    pub connections: ConnectionManager,
}

impl RealtimeState {
    pub fn new(
        coordinator: HandshakeCoordinator,
        registry: SessionRegistry,
        rooms: RoomRegistry,
        connections: ConnectionManager,
    ) -> Self {
        Self {
            coordinator,
            registry,
            rooms,
            connections,
        }
    }

    /// Process one client event and answer it
    pub async fn handle_event(
        &self,
        session_id: &SessionId,
        event: ClientEvent,
        pending: &PendingRequests,
    ) {
        let Some(request_id) = event.payload().request_id() else {
            pending
                .open(FALLBACK_REQUEST_ID)
                .respond(ResponsePayload::omitted("request_id"));
            return;
        };

        debug!(
            session_id = %session_id,
            request_id = %request_id,
            event = event.name(),
            "Realtime request"
        );

        let ticket = pending.open(request_id);
        let reply = match &event {
            ClientEvent::PlaycoConnect(payload) => self.playco_connect(session_id, payload).await,
            ClientEvent::PlaylistEnter(payload) => self.playlist_enter(session_id, payload).await,
            ClientEvent::PlaylistLeave(payload) => self.playlist_leave(session_id, payload).await,
            ClientEvent::PlaylistSetStatus(payload) => {
                self.playlist_set_status(session_id, payload).await
            }
        };

        ticket.respond(reply.payload);

        if reply.close {
            info!(session_id = %session_id, event = event.name(), "Closing realtime connection");
            let _ = self.connections.disconnect(session_id);
        }
    }

    async fn playco_connect(&self, session_id: &SessionId, payload: &EventPayload) -> Reply {
        let creds = match payload.credentials() {
            Ok(creds) => creds,
            Err(field) => return ResponsePayload::omitted(field).into(),
        };

        let user_id = match self
            .coordinator
            .validate_auth(session_id, &creds.sio_csrf_token, &creds.sio_token)
            .await
        {
            Ok(user_id) => user_id,
            Err(failure) => return auth_failed(&failure),
        };

        match self.registry.get_or_create(session_id, &user_id) {
            Ok((session, SessionOutcome::Resumed)) => Reply::ok(
                ResponsePayload::new(SubCode::SessionResumed)
                    .with_data(json!({ "session_number": session.session_number })),
            ),
            Ok((session, outcome)) => {
                let restored = outcome == SessionOutcome::Restored;
                if restored {
                    self.restore_rooms(&session);
                }
                Reply::ok(ResponsePayload::new(SubCode::SessionCreated).with_data(json!({
                    "session_number": session.session_number,
                    "restored": restored,
                    "rooms": session.app_state.rooms.keys().collect::<Vec<_>>(),
                })))
            }
            Err(RegistryError::SessionLimitReached { user_id, max }) => {
                warn!(user_id = %user_id, max, "Realtime session limit reached");
                Reply::of(SubCode::MaxSessionConnected).then_close()
            }
            Err(RegistryError::OwnerMismatch { .. }) => {
                warn!(session_id = %session_id, "Session already bound to another user");
                Reply::of(SubCode::AuthFailed)
            }
        }
    }

    async fn playlist_enter(&self, session_id: &SessionId, payload: &EventPayload) -> Reply {
        let (creds, playlist_id) = match required(payload) {
            Ok(fields) => fields,
            Err(reply) => return reply,
        };
        let currently_playing = payload.currently_playing();

        let session = match self.authorize(session_id, &creds).await {
            Ok(session) => session,
            Err(reply) => return reply,
        };

        self.registry.modify_state(session_id, |state| {
            state
                .rooms
                .insert(playlist_id, RoomPresence { currently_playing })
        });

        let (view, members) = self.rooms.enter(
            playlist_id,
            session_id,
            Participant {
                user_id: session.user_id,
                session_number: session.session_number,
                currently_playing,
            },
        );
        self.broadcast(
            &members,
            BroadcastEvent::PlaylistUserEntered,
            SubCode::UserJoined,
            &view,
        );

        Reply::of(SubCode::UserJoined)
    }

    async fn playlist_leave(&self, session_id: &SessionId, payload: &EventPayload) -> Reply {
        let (creds, playlist_id) = match required(payload) {
            Ok(fields) => fields,
            Err(reply) => return reply,
        };

        if let Err(reply) = self.authorize(session_id, &creds).await {
            return reply;
        }

        self.registry.modify_state(session_id, |state| {
            state.rooms.remove(&playlist_id)
        });

        match self.rooms.leave(playlist_id, session_id) {
            Ok(LeaveOutcome::Left { view, mut remaining }) => {
                remaining.push(session_id.clone());
                self.broadcast(
                    &remaining,
                    BroadcastEvent::PlaylistUserExited,
                    SubCode::UserLeftSelf,
                    &view,
                );
                Reply::of(SubCode::UserLeftSelf)
            }
            Ok(LeaveOutcome::Closed) => {
                debug!(playlist_id, "Playlist room closed");
                Reply::of(SubCode::RoomClosed)
            }
            Err(RoomError::RoomNotFound(_)) => Reply::of(SubCode::RoomNotExist),
            Err(RoomError::NotInRoom(_)) => Reply::of(SubCode::SessionNotExist),
        }
    }

    async fn playlist_set_status(&self, session_id: &SessionId, payload: &EventPayload) -> Reply {
        let (creds, playlist_id) = match required(payload) {
            Ok(fields) => fields,
            Err(reply) => return reply,
        };
        let Some(currently_playing) = payload.currently_playing() else {
            return ResponsePayload::omitted("currently_playing").into();
        };

        if let Err(reply) = self.authorize(session_id, &creds).await {
            return reply;
        }

        match self
            .rooms
            .set_status(playlist_id, session_id, currently_playing)
        {
            Ok((view, members)) => {
                self.registry.modify_state(session_id, |state| {
                    state.rooms.insert(
                        playlist_id,
                        RoomPresence {
                            currently_playing: Some(currently_playing),
                        },
                    )
                });
                self.broadcast(
                    &members,
                    BroadcastEvent::PlaylistModified,
                    SubCode::RoomModified,
                    &view,
                );
                Reply::of(SubCode::RoomModified)
            }
            Err(RoomError::RoomNotFound(_)) => Reply::of(SubCode::RoomNotExist),
            Err(RoomError::NotInRoom(_)) => Reply::of(SubCode::SessionNotExist),
        }
    }

    /// Validate the presented credentials and require an authenticated session
    async fn authorize(
        &self,
        session_id: &SessionId,
        creds: &Credentials,
    ) -> Result<RealtimeSession, Reply> {
        let user_id = self
            .coordinator
            .validate_auth(session_id, &creds.sio_csrf_token, &creds.sio_token)
            .await
            .map_err(|failure| auth_failed(&failure))?;

        match self.registry.get(session_id) {
            Some(session) if session.user_id == user_id => Ok(session),
            _ => Err(Reply::of(SubCode::SessionNotExist).then_close()),
        }
    }

    /// Put a restored session back into the rooms its state lists
    fn restore_rooms(&self, session: &RealtimeSession) {
        for (playlist_id, presence) in &session.app_state.rooms {
            let (view, members) = self.rooms.enter(
                *playlist_id,
                &session.session_id,
                Participant {
                    user_id: session.user_id.clone(),
                    session_number: session.session_number,
                    currently_playing: presence.currently_playing,
                },
            );
            self.broadcast(
                &members,
                BroadcastEvent::PlaylistUserEntered,
                SubCode::UserJoined,
                &view,
            );
        }
    }

    fn broadcast(
        &self,
        members: &[SessionId],
        event: BroadcastEvent,
        sub_code: SubCode,
        view: &RoomView,
    ) {
        let msg = ServerMessage::Broadcast {
            event,
            payload: ResponsePayload::new(sub_code).with_data(json!({ "room": view })),
        };
        let delivered = self.connections.broadcast(members, &msg);
        debug!(
            playlist_id = view.playlist_id,
            event = event.as_str(),
            delivered,
            "Room broadcast"
        );
    }

    /// Clean up after a transport disconnect.
    ///
    /// Leaves every room (notifying the remaining members), revokes the
    /// handshake token and drops the registry entry.
    pub async fn handle_disconnect(&self, session_id: &SessionId) {
        if let Some(session) = self.registry.get(session_id) {
            for playlist_id in session.app_state.rooms.keys() {
                match self.rooms.leave(*playlist_id, session_id) {
                    Ok(LeaveOutcome::Left { view, remaining }) => self.broadcast(
                        &remaining,
                        BroadcastEvent::PlaylistUserExited,
                        SubCode::UserLeftSelf,
                        &view,
                    ),
                    Ok(LeaveOutcome::Closed) => {
                        debug!(playlist_id, "Playlist room closed on disconnect")
                    }
                    Err(e) => debug!(playlist_id, error = %e, "Room already left"),
                }
            }
            self.registry.drop_session(session_id);
        }

        if let Err(e) = self.coordinator.revoke_session(session_id).await {
            warn!(session_id = %session_id, error = %e, "Failed to revoke handshake token");
        }
    }
}

/// Credentials and playlist id, or a reply naming the first missing field
fn required(payload: &EventPayload) -> Result<(Credentials, u64), Reply> {
    let creds = payload
        .credentials()
        .map_err(|field| Reply::from(ResponsePayload::omitted(field)))?;
    let playlist_id = payload
        .playlist_id()
        .map_err(|field| Reply::from(ResponsePayload::omitted(field)))?;
    Ok((creds, playlist_id))
}

fn auth_failed(failure: &AuthFailure) -> Reply {
    if failure.is_server_error() {
        Reply::of(SubCode::ServerError)
    } else {
        Reply::of(SubCode::AuthFailed)
    }
}
