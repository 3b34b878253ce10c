//! Realtime connection management
//!
//! Tracks every open WebSocket by the session id assigned at connect and
//! routes outbound frames to one connection or to a set of them.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::mpsc;

use super::messages::ServerMessage;
use crate::models::SessionId;

/// Frame queued for a connection's writer task
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Message(ServerMessage),
    /// Close the socket after flushing everything queued before it
    Close,
}

/// Handle for sending messages to a specific connection
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Channel to this connection's writer task
    pub sender: mpsc::UnboundedSender<Outbound>,

    /// When this connection was established (Unix timestamp ms)
    pub connected_at: i64,

    /// Last activity timestamp
    pub last_activity: Arc<AtomicI64>,
}

impl ConnectionHandle {
    pub fn new(sender: mpsc::UnboundedSender<Outbound>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            sender,
            connected_at: now,
            last_activity: Arc::new(AtomicI64::new(now)),
        }
    }

    /// Update last activity timestamp
    pub fn touch(&self) {
        self.last_activity
            .store(chrono::Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn last_seen(&self) -> i64 {
        self.last_activity.load(Ordering::Relaxed)
    }

    fn send(&self, frame: Outbound) -> Result<(), SendError> {
        self.sender
            .send(frame)
            .map_err(|_| SendError::ConnectionClosed)
    }

    pub fn is_alive(&self) -> bool {
        !self.sender.is_closed()
    }
}

/// Error type for send operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("session not connected")]
    NotConnected,
    #[error("connection closed")]
    ConnectionClosed,
}

/// All live realtime connections, keyed by session id
///
/// Cheap to clone; clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct ConnectionManager {
    connections: Arc<DashMap<SessionId, ConnectionHandle>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and return the receiving end of its queue
    pub fn register(&self, session_id: SessionId) -> mpsc::UnboundedReceiver<Outbound> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections
            .insert(session_id.clone(), ConnectionHandle::new(tx));
        tracing::debug!(
            session_id = %session_id,
            total = self.connections.len(),
            "Connection added"
        );
        rx
    }

    /// Forget a connection. Returns whether it was registered.
    pub fn remove(&self, session_id: &SessionId) -> bool {
        match self.connections.remove(session_id) {
            Some((_, handle)) => {
                let now = chrono::Utc::now().timestamp_millis();
                tracing::debug!(
                    session_id = %session_id,
                    connected_ms = now - handle.connected_at,
                    idle_ms = now - handle.last_seen(),
                    "Connection removed"
                );
                true
            }
            None => false,
        }
    }

    /// Queue handle for one connection
    pub fn sender(&self, session_id: &SessionId) -> Option<mpsc::UnboundedSender<Outbound>> {
        self.connections.get(session_id).map(|h| h.sender.clone())
    }

    /// Whether a session id belongs to an open connection
    pub fn is_connected(&self, session_id: &SessionId) -> bool {
        self.connections
            .get(session_id)
            .map(|h| h.is_alive())
            .unwrap_or(false)
    }

    /// Record inbound activity
    pub fn touch(&self, session_id: &SessionId) -> bool {
        match self.connections.get(session_id) {
            Some(handle) => {
                handle.touch();
                true
            }
            None => false,
        }
    }

    /// Queue a message for one connection
    pub fn send(&self, session_id: &SessionId, msg: ServerMessage) -> Result<(), SendError> {
        self.connections
            .get(session_id)
            .ok_or(SendError::NotConnected)?
            .send(Outbound::Message(msg))
    }

    /// Queue a message for every listed connection, returning how many accepted it
    pub fn broadcast<'a>(
        &self,
        session_ids: impl IntoIterator<Item = &'a SessionId>,
        msg: &ServerMessage,
    ) -> usize {
        session_ids
            .into_iter()
            .filter(|sid| self.send(sid, msg.clone()).is_ok())
            .count()
    }

    /// Ask a connection's writer to close the socket
    pub fn disconnect(&self, session_id: &SessionId) -> Result<(), SendError> {
        self.connections
            .get(session_id)
            .ok_or(SendError::NotConnected)?
            .send(Outbound::Close)
    }

    /// Number of open connections
    pub fn total_connections(&self) -> usize {
        self.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::messages::{ResponsePayload, SubCode};

    fn sid(s: &str) -> SessionId {
        SessionId::parse(s).unwrap()
    }

    #[test]
    fn test_register_and_remove() {
        let manager = ConnectionManager::new();
        let _rx = manager.register(sid("abc"));

        assert!(manager.is_connected(&sid("abc")));
        assert_eq!(manager.total_connections(), 1);

        assert!(manager.remove(&sid("abc")));
        assert!(!manager.is_connected(&sid("abc")));
        assert!(!manager.remove(&sid("abc")));
    }

    #[test]
    fn test_dropped_receiver_is_not_connected() {
        let manager = ConnectionManager::new();
        drop(manager.register(sid("abc")));
        assert!(!manager.is_connected(&sid("abc")));
    }

    #[test]
    fn test_send_routes_to_one_connection() {
        let manager = ConnectionManager::new();
        let mut rx_a = manager.register(sid("a"));
        let mut rx_b = manager.register(sid("b"));

        let msg = ServerMessage::response("r1", ResponsePayload::new(SubCode::UserJoined));
        manager.send(&sid("a"), msg.clone()).unwrap();

        assert_eq!(rx_a.try_recv().unwrap(), Outbound::Message(msg));
        assert!(rx_b.try_recv().is_err());
        assert_eq!(
            manager.send(&sid("zzz"), ServerMessage::Connect { sid: sid("zzz") }),
            Err(SendError::NotConnected)
        );
    }

    #[test]
    fn test_broadcast_counts_deliveries() {
        let manager = ConnectionManager::new();
        let mut rx_a = manager.register(sid("a"));
        let _rx_b = manager.register(sid("b"));
        drop(manager.register(sid("c")));

        let msg = ServerMessage::Connect { sid: sid("a") };
        let targets = [sid("a"), sid("b"), sid("c"), sid("missing")];
        assert_eq!(manager.broadcast(&targets, &msg), 2);
        assert!(rx_a.try_recv().is_ok());
    }

    #[test]
    fn test_disconnect_queues_close() {
        let manager = ConnectionManager::new();
        let mut rx = manager.register(sid("a"));
        manager.disconnect(&sid("a")).unwrap();
        assert_eq!(rx.try_recv().unwrap(), Outbound::Close);
    }
}
