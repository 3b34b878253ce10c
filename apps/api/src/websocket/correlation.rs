//! Request/response correlation for one connection
//!
//! Every client request is answered exactly once on
//! `REQUEST_RESPONSE_<request_id>`, to the requesting connection only. A
//! [`ResponseTicket`] represents that outstanding answer: it is created when
//! the request arrives and consumed by [`ResponseTicket::respond`]. A ticket
//! dropped without a response answers `SERVER_ERROR` so the client is never
//! left waiting.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use super::connection::Outbound;
use super::messages::{ResponsePayload, ServerMessage, SubCode};

/// Request id used when a client omits one
pub const FALLBACK_REQUEST_ID: &str = "0";

type InFlight = Arc<Mutex<HashMap<String, usize>>>;

/// Outstanding requests of one connection
#[derive(Debug, Clone)]
pub struct PendingRequests {
    sender: mpsc::UnboundedSender<Outbound>,
    in_flight: InFlight,
}

impl PendingRequests {
    pub fn new(sender: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            sender,
            in_flight: Arc::default(),
        }
    }

    /// Start tracking a request
    pub fn open(&self, request_id: impl Into<String>) -> ResponseTicket {
        let request_id = request_id.into();
        {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            let count = in_flight.entry(request_id.clone()).or_insert(0);
            *count += 1;
            if *count > 1 {
                tracing::debug!(request_id = %request_id, "Duplicate request id in flight");
            }
        }

        ResponseTicket {
            request_id,
            sender: self.sender.clone(),
            in_flight: self.in_flight.clone(),
            answered: false,
        }
    }

    /// Requests that have not been answered yet
    pub fn in_flight(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .sum()
    }
}

/// The single pending answer to one request
#[derive(Debug)]
#[must_use = "a ticket dropped without respond() answers SERVER_ERROR"]
pub struct ResponseTicket {
    request_id: String,
    sender: mpsc::UnboundedSender<Outbound>,
    in_flight: InFlight,
    answered: bool,
}

impl ResponseTicket {
    /// Deliver the answer to the requesting connection
    pub fn respond(mut self, payload: ResponsePayload) {
        self.send(payload);
    }

    fn send(&mut self, payload: ResponsePayload) {
        self.answered = true;
        let msg = ServerMessage::response(self.request_id.clone(), payload);
        if self.sender.send(Outbound::Message(msg)).is_err() {
            tracing::debug!(request_id = %self.request_id, "Requester gone before response");
        }
    }
}

impl Drop for ResponseTicket {
    fn drop(&mut self) {
        if !self.answered {
            tracing::warn!(request_id = %self.request_id, "Request dropped without a response");
            self.send(ResponsePayload::new(SubCode::ServerError));
        }

        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(count) = in_flight.get_mut(&self.request_id) {
            *count -= 1;
            if *count == 0 {
                in_flight.remove(&self.request_id);
            }
        }
    }
}
