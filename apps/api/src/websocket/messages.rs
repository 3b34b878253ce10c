//! Realtime message types
//!
//! Every frame on the wire is a JSON object `{"event": <name>, "data": <payload>}`.
//! Clients send the four request events below; the server answers each one
//! on `REQUEST_RESPONSE_<request_id>` and pushes room updates as broadcasts.

use std::borrow::Cow;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Value};

use crate::models::SessionId;

// =============================================================================
// Client -> Server
// =============================================================================

/// Raw frame as received from a client
#[derive(Debug, Clone, Deserialize)]
pub struct ClientFrame {
    pub event: String,
    #[serde(default)]
    pub data: EventPayload,
}

impl ClientFrame {
    /// Classify the frame, `None` for events this server does not handle
    pub fn into_event(self) -> Option<ClientEvent> {
        match self.event.as_str() {
            "playcoConnect" => Some(ClientEvent::PlaycoConnect(self.data)),
            "playlistEnter" => Some(ClientEvent::PlaylistEnter(self.data)),
            "playlistLeave" => Some(ClientEvent::PlaylistLeave(self.data)),
            "playlistSetStatus" => Some(ClientEvent::PlaylistSetStatus(self.data)),
            _ => None,
        }
    }
}

/// Requests a client can make over the realtime channel
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Authenticate the connection with a handshake token
    PlaycoConnect(EventPayload),
    /// Join a playlist room
    PlaylistEnter(EventPayload),
    /// Leave a playlist room
    PlaylistLeave(EventPayload),
    /// Update what this session is playing inside a room
    PlaylistSetStatus(EventPayload),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PlaycoConnect(_) => "playcoConnect",
            Self::PlaylistEnter(_) => "playlistEnter",
            Self::PlaylistLeave(_) => "playlistLeave",
            Self::PlaylistSetStatus(_) => "playlistSetStatus",
        }
    }

    pub fn payload(&self) -> &EventPayload {
        match self {
            Self::PlaycoConnect(p)
            | Self::PlaylistEnter(p)
            | Self::PlaylistLeave(p)
            | Self::PlaylistSetStatus(p) => p,
        }
    }
}

/// Request body shared by all client events
///
/// Fields are kept loosely typed so a missing or malformed field can be
/// reported back by name instead of failing the whole frame.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventPayload {
    #[serde(default)]
    pub request_id: Option<Value>,
    #[serde(default)]
    pub sio_token: Option<Value>,
    #[serde(default)]
    pub sio_csrf_token: Option<Value>,
    #[serde(default)]
    pub playlist_id: Option<Value>,
    #[serde(default)]
    pub currently_playing: Option<Value>,
}

/// Token and nonce presented with a request
#[derive(Debug, Clone)]
pub struct Credentials {
    pub sio_token: String,
    pub sio_csrf_token: String,
}

impl EventPayload {
    /// Request id as a string; numbers are accepted, empty values are not
    pub fn request_id(&self) -> Option<String> {
        match self.request_id.as_ref()? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Token and nonce, or the name of the first one missing
    pub fn credentials(&self) -> Result<Credentials, &'static str> {
        Ok(Credentials {
            sio_token: non_empty_str(&self.sio_token).ok_or("sio_token")?,
            sio_csrf_token: non_empty_str(&self.sio_csrf_token).ok_or("sio_csrf_token")?,
        })
    }

    /// Positive playlist id, given as a number or a numeric string
    pub fn playlist_id(&self) -> Result<u64, &'static str> {
        as_u64(&self.playlist_id)
            .filter(|id| *id > 0)
            .ok_or("playlist_id")
    }

    /// Optional item index; malformed values read as absent
    pub fn currently_playing(&self) -> Option<u32> {
        as_u64(&self.currently_playing).and_then(|v| u32::try_from(v).ok())
    }
}

fn non_empty_str(value: &Option<Value>) -> Option<String> {
    match value.as_ref()? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn as_u64(value: &Option<Value>) -> Option<u64> {
    match value.as_ref()? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// =============================================================================
// Server -> Client
// =============================================================================

/// Outcome classification carried in every response payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubCode {
    RoomModified,
    UserJoined,
    UserLeftSelf,
    SessionResumed,
    SessionCreated,
    RoomClosed,
    MaxSessionConnected,
    PayloadRequiredOmitted,
    AuthFailed,
    SessionNotExist,
    RoomNotExist,
    ServerError,
}

impl SubCode {
    /// HTTP-like status code
    pub fn code(self) -> u16 {
        match self {
            Self::RoomModified | Self::UserJoined | Self::UserLeftSelf | Self::SessionResumed => {
                200
            }
            Self::SessionCreated => 201,
            Self::RoomClosed => 204,
            Self::MaxSessionConnected | Self::PayloadRequiredOmitted => 400,
            Self::AuthFailed => 401,
            Self::SessionNotExist | Self::RoomNotExist => 404,
            Self::ServerError => 500,
        }
    }

    pub fn success(self) -> bool {
        self.code() < 300
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::RoomModified => "Room data was modified.",
            Self::UserJoined => "Entered the room.",
            Self::UserLeftSelf => "Left the room.",
            Self::SessionResumed => "Session is already active.",
            Self::SessionCreated => "Session created.",
            Self::RoomClosed => "The last participant left, the room was closed.",
            Self::MaxSessionConnected => "Too many sessions are connected, try again later.",
            Self::PayloadRequiredOmitted => "A required field was omitted from the request.",
            Self::AuthFailed => "Authentication failed, reconnect and try again.",
            Self::SessionNotExist => "Session does not exist, reconnect and try again.",
            Self::RoomNotExist => "Room does not exist.",
            Self::ServerError => "An unknown error occurred.",
        }
    }
}

/// Body of every response and broadcast
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponsePayload {
    pub code: u16,
    #[serde(rename = "subCode")]
    pub sub_code: SubCode,
    pub success: bool,
    pub message: &'static str,
    pub data: Value,
}

impl ResponsePayload {
    pub fn new(sub_code: SubCode) -> Self {
        Self {
            code: sub_code.code(),
            sub_code,
            success: sub_code.success(),
            message: sub_code.message(),
            data: json!({}),
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// `PAYLOAD_REQUIRED_OMITTED` naming the missing field
    pub fn omitted(field: &str) -> Self {
        Self::new(SubCode::PayloadRequiredOmitted).with_data(json!({ "omitted": field }))
    }
}

/// Room-wide events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastEvent {
    PlaylistUserEntered,
    PlaylistUserExited,
    PlaylistModified,
}

impl BroadcastEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PlaylistUserEntered => "PLAYLIST_USER_ENTERED",
            Self::PlaylistUserExited => "PLAYLIST_USER_EXITED",
            Self::PlaylistModified => "PLAYLIST_MODIFIED",
        }
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// First frame on every connection, carries the assigned session id
    Connect { sid: SessionId },

    /// Answer to one client request, delivered to the requester only
    RequestResponse {
        request_id: String,
        payload: ResponsePayload,
    },

    /// Update pushed to every member of a room
    Broadcast {
        event: BroadcastEvent,
        payload: ResponsePayload,
    },
}

impl ServerMessage {
    pub fn response(request_id: impl Into<String>, payload: ResponsePayload) -> Self {
        Self::RequestResponse {
            request_id: request_id.into(),
            payload,
        }
    }

    /// Wire event name
    pub fn event_name(&self) -> Cow<'static, str> {
        match self {
            Self::Connect { .. } => Cow::Borrowed("connect"),
            Self::RequestResponse { request_id, .. } => {
                Cow::Owned(format!("REQUEST_RESPONSE_{}", request_id))
            }
            Self::Broadcast { event, .. } => Cow::Borrowed(event.as_str()),
        }
    }
}

impl Serialize for ServerMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut frame = serializer.serialize_struct("ServerMessage", 2)?;
        frame.serialize_field("event", &self.event_name())?;
        match self {
            Self::Connect { sid } => frame.serialize_field("data", &json!({ "sid": sid }))?,
            Self::RequestResponse { payload, .. } | Self::Broadcast { payload, .. } => {
                frame.serialize_field("data", payload)?
            }
        }
        frame.end()
    }
}
