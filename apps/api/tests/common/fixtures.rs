//! Test application and realtime client fixtures

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use axum::Router;
use playco_api::clock::ManualClock;
use playco_api::models::{HandshakeToken, SessionId, UserId};
use playco_api::repositories::InMemoryTokenStore;
use playco_api::services::{AuthConfig, JwtAuthenticator, RegistryConfig};
use playco_api::websocket::{
    ClientFrame, ConnectionManager, Outbound, PendingRequests, RealtimeState, ServerMessage,
};
use playco_api::{build_router, AppServices};
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedReceiver;

/// Secret shared by the test authenticator and the tokens it mints
pub const TEST_SECRET: &str = "integration-test-secret-at-least-32-chars";

/// Nonce that satisfies the default length and entropy rules
pub const NONCE: &str = "n0nce-for-tests-1";

/// Builder for [`TestApp`]
pub struct TestAppBuilder {
    min_nonce_len: usize,
    registry: RegistryConfig,
}

impl Default for TestAppBuilder {
    fn default() -> Self {
        Self {
            min_nonce_len: 16,
            registry: RegistryConfig::default(),
        }
    }
}

impl TestAppBuilder {
    pub fn min_nonce_len(mut self, len: usize) -> Self {
        self.min_nonce_len = len;
        self
    }

    pub fn max_sessions(mut self, max: usize) -> Self {
        self.registry.max_sessions_per_user = max;
        self
    }

    pub fn grace_period(mut self, grace: chrono::Duration) -> Self {
        self.registry.grace_period = grace;
        self
    }

    pub fn build(self) -> TestApp {
        let clock = Arc::new(ManualClock::starting_now());
        let store = Arc::new(InMemoryTokenStore::new());
        let jwt = JwtAuthenticator::new(AuthConfig::new(TEST_SECRET));

        let services = AppServices::new(
            store.clone(),
            clock.clone(),
            Arc::new(jwt.clone()),
            self.min_nonce_len,
            self.registry,
        );

        TestApp {
            services,
            clock,
            store,
            jwt,
        }
    }
}

/// Fully wired application over in-memory state
pub struct TestApp {
    pub services: AppServices,
    pub clock: Arc<ManualClock>,
    pub store: Arc<InMemoryTokenStore>,
    jwt: JwtAuthenticator,
}

impl TestApp {
    pub fn new() -> Self {
        TestAppBuilder::default().build()
    }

    pub fn builder() -> TestAppBuilder {
        TestAppBuilder::default()
    }

    /// Fresh router over the shared services
    pub fn router(&self) -> Router {
        build_router(&self.services)
    }

    /// `Authorization` header value for `user`
    pub fn bearer(&self, user: &str) -> String {
        let token = self
            .jwt
            .issue_access_token(user, 3600)
            .expect("failed to mint access token");
        format!("Bearer {}", token)
    }

    /// Serve the router on an ephemeral local port
    pub async fn serve(&self) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind test listener");
        let addr = listener.local_addr().expect("listener has no address");
        let router = self.router();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        addr
    }

    /// Wait until no realtime connection or session is left
    pub async fn wait_until_idle(&self) {
        let idle = || {
            self.services.connections.total_connections() == 0
                && self.services.registry.is_empty()
        };
        for _ in 0..200 {
            if idle() {
                return;
            }
            tokio::time::sleep(StdDuration::from_millis(10)).await;
        }
        panic!(
            "realtime state not cleaned up: {} connections, {} sessions",
            self.services.connections.total_connections(),
            self.services.registry.len()
        );
    }

    /// Open a realtime connection the way the WebSocket handler does
    pub fn connect(&self) -> TestClient {
        let realtime = self.services.realtime();
        let sid = SessionId::generate();
        let rx = realtime.connections.register(sid.clone());
        let sender = realtime
            .connections
            .sender(&sid)
            .expect("connection just registered");
        let _ = realtime
            .connections
            .send(&sid, ServerMessage::Connect { sid: sid.clone() });

        TestClient {
            sid,
            rx,
            pending: PendingRequests::new(sender),
            realtime,
            backlog: Vec::new(),
            closed: false,
        }
    }

    /// Issue a handshake token directly through the coordinator
    pub async fn issue(&self, user: &str, client: &TestClient, nonce: &str) -> HandshakeToken {
        self.services
            .coordinator
            .issue_token(&UserId::new(user), &client.sid, nonce)
            .await
            .expect("token issuance failed")
    }
}

/// One realtime connection, driven in-process
pub struct TestClient {
    pub sid: SessionId,
    rx: UnboundedReceiver<Outbound>,
    pending: PendingRequests,
    realtime: RealtimeState,
    /// Serialized frames received and not yet taken
    backlog: Vec<Value>,
    closed: bool,
}

impl TestClient {
    /// Send one client event and wait for it to be handled
    pub async fn emit(&self, event: &str, data: Value) {
        let frame: ClientFrame = serde_json::from_value(json!({ "event": event, "data": data }))
            .expect("invalid client frame");
        let event = frame.into_event().expect("unknown client event");
        self.realtime
            .handle_event(&self.sid, event, &self.pending)
            .await;
    }

    /// `playcoConnect` with the given credentials
    pub async fn playco_connect(&self, token: &str, nonce: &str, request_id: &str) {
        self.emit(
            "playcoConnect",
            json!({
                "sio_token": token,
                "sio_csrf_token": nonce,
                "request_id": request_id,
            }),
        )
        .await;
    }

    /// Issue a token for `user` and authenticate with it, returning the response data
    pub async fn authenticate(&mut self, app: &TestApp, user: &str) -> (HandshakeToken, Value) {
        let token = app.issue(user, self, NONCE).await;
        self.playco_connect(&token.token, NONCE, "auth").await;
        let response = self
            .take("REQUEST_RESPONSE_auth")
            .expect("no playcoConnect response");
        (token, response)
    }

    fn pump(&mut self) {
        while let Ok(frame) = self.rx.try_recv() {
            match frame {
                Outbound::Message(msg) => self
                    .backlog
                    .push(serde_json::to_value(&msg).expect("unserializable frame")),
                Outbound::Close => self.closed = true,
            }
        }
    }

    /// Remove and return the `data` of the first frame named `event`
    pub fn take(&mut self, event: &str) -> Option<Value> {
        self.pump();
        let pos = self.backlog.iter().position(|f| f["event"] == event)?;
        let mut frame = self.backlog.remove(pos);
        Some(frame["data"].take())
    }

    /// Every frame received so far, in order
    pub fn drain(&mut self) -> Vec<Value> {
        self.pump();
        std::mem::take(&mut self.backlog)
    }

    /// Whether the server asked to close this connection
    pub fn is_closed(&mut self) -> bool {
        self.pump();
        self.closed
    }

    /// Tear down the connection the way the WebSocket handler does
    pub async fn disconnect(self) {
        self.realtime.connections.remove(&self.sid);
        self.realtime.handle_disconnect(&self.sid).await;
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.realtime.connections
    }
}
