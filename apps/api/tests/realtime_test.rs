//! Realtime protocol tests
//!
//! Drives `RealtimeState` the way the WebSocket handler does and checks the
//! frames each connection receives.

mod common;

use assert_matches::assert_matches;
use axum::http::StatusCode;
use chrono::Duration;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{auth_request, json_body, TestApp, TestClient, NONCE};
use playco_api::models::UserId;
use playco_api::services::AuthFailure;

/// Credentials plus extra fields for a room event
fn room_payload(token: &str, request_id: &str, extra: Value) -> Value {
    let mut payload = json!({
        "sio_token": token,
        "sio_csrf_token": NONCE,
        "request_id": request_id,
    });
    if let (Some(base), Value::Object(extra)) = (payload.as_object_mut(), extra) {
        base.extend(extra);
    }
    payload
}

async fn authenticated(app: &TestApp, user: &str) -> (TestClient, String) {
    let mut client = app.connect();
    let (token, response) = client.authenticate(app, user).await;
    assert_eq!(response["subCode"], "SESSION_CREATED");
    client.drain();
    (client, token.token)
}

#[tokio::test]
async fn test_end_to_end_handshake() {
    let app = TestApp::builder().min_nonce_len(3).build();
    let mut client = app.connect();

    // The session id is announced first
    let connect = client.take("connect").unwrap();
    assert_eq!(connect["sid"], client.sid.as_str());

    let response = app
        .router()
        .oneshot(auth_request(
            Some(&app.bearer("alice")),
            &json!({ "sid": client.sid.as_str(), "sio_csrf_token": "xyz" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    let token = body["data"]["sio_token"]["token"].as_str().unwrap().to_string();

    client.playco_connect(&token, "xyz", "r1").await;

    let payload = client.take("REQUEST_RESPONSE_r1").unwrap();
    assert_eq!(payload["code"], 201);
    assert_eq!(payload["subCode"], "SESSION_CREATED");
    assert_eq!(payload["success"], true);
    assert_eq!(payload["data"]["session_number"], 1);
    assert_eq!(payload["data"]["restored"], false);
    assert!(!client.is_closed());

    let session = app.services.registry.get(&client.sid).unwrap();
    assert_eq!(session.user_id, UserId::new("alice"));
}

#[tokio::test]
async fn test_missing_request_id_answers_on_zero() {
    let app = TestApp::new();
    let mut client = app.connect();

    client
        .emit("playcoConnect", json!({ "sio_token": "t", "sio_csrf_token": NONCE }))
        .await;

    let payload = client.take("REQUEST_RESPONSE_0").unwrap();
    assert_eq!(payload["subCode"], "PAYLOAD_REQUIRED_OMITTED");
    assert_eq!(payload["code"], 400);
    assert_eq!(payload["data"]["omitted"], "request_id");
}

#[tokio::test]
async fn test_missing_credentials_are_named() {
    let app = TestApp::new();
    let mut client = app.connect();

    client
        .emit("playcoConnect", json!({ "sio_csrf_token": NONCE, "request_id": "a" }))
        .await;
    client
        .emit("playcoConnect", json!({ "sio_token": "t", "request_id": 7 }))
        .await;

    assert_eq!(
        client.take("REQUEST_RESPONSE_a").unwrap()["data"]["omitted"],
        "sio_token"
    );
    assert_eq!(
        client.take("REQUEST_RESPONSE_7").unwrap()["data"]["omitted"],
        "sio_csrf_token"
    );
}

#[tokio::test]
async fn test_auth_failure_keeps_connection_open() {
    let app = TestApp::new();
    let mut client = app.connect();
    let token = app.issue("alice", &client, NONCE).await;

    client.playco_connect("wrong-token", NONCE, "r1").await;
    let payload = client.take("REQUEST_RESPONSE_r1").unwrap();
    assert_eq!(payload["subCode"], "AUTH_FAILED");
    assert_eq!(payload["code"], 401);
    assert_eq!(payload["success"], false);
    assert!(!client.is_closed());
    assert!(app.services.registry.get(&client.sid).is_none());

    // The same connection can retry with the right credentials
    client.playco_connect(&token.token, NONCE, "r2").await;
    assert_eq!(
        client.take("REQUEST_RESPONSE_r2").unwrap()["subCode"],
        "SESSION_CREATED"
    );
}

#[tokio::test]
async fn test_expired_token_fails_uniformly() {
    let app = TestApp::new();
    let mut client = app.connect();
    let token = app.issue("alice", &client, NONCE).await;

    app.clock.advance(Duration::hours(1));
    client.playco_connect(&token.token, NONCE, "late").await;

    assert_eq!(
        client.take("REQUEST_RESPONSE_late").unwrap()["subCode"],
        "AUTH_FAILED"
    );
}

#[tokio::test]
async fn test_response_goes_only_to_requester() {
    let app = TestApp::new();
    let mut alice = app.connect();
    let mut bob = app.connect();
    bob.drain();

    alice.authenticate(&app, "alice").await;

    assert!(bob.drain().is_empty());
}

#[tokio::test]
async fn test_reissue_preserves_session_state() {
    let app = TestApp::new();
    let (mut client, token) = authenticated(&app, "alice").await;

    client
        .emit(
            "playlistEnter",
            room_payload(&token, "enter", json!({ "playlist_id": 7, "currently_playing": 2 })),
        )
        .await;
    assert_eq!(
        client.take("REQUEST_RESPONSE_enter").unwrap()["subCode"],
        "USER_JOINED"
    );

    // Refresh: new token, new nonce, same connection
    app.clock.advance(Duration::minutes(50));
    let refreshed = app.issue("alice", &client, "refreshed-nonce-123").await;
    client
        .playco_connect(&refreshed.token, "refreshed-nonce-123", "again")
        .await;

    let payload = client.take("REQUEST_RESPONSE_again").unwrap();
    assert_eq!(payload["subCode"], "SESSION_RESUMED");
    assert_eq!(payload["data"]["session_number"], 1);

    let session = app.services.registry.get(&client.sid).unwrap();
    let presence = session.app_state.rooms.get(&7).unwrap();
    assert_eq!(presence.currently_playing, Some(2));

    // The old token no longer authorizes anything
    client
        .emit("playlistLeave", room_payload(&token, "old", json!({ "playlist_id": 7 })))
        .await;
    assert_eq!(
        client.take("REQUEST_RESPONSE_old").unwrap()["subCode"],
        "AUTH_FAILED"
    );
}

#[tokio::test]
async fn test_playlist_room_lifecycle() {
    let app = TestApp::new();
    let (mut alice, alice_token) = authenticated(&app, "alice").await;
    let (mut bob, bob_token) = authenticated(&app, "bob").await;

    alice
        .emit("playlistEnter", room_payload(&alice_token, "a1", json!({ "playlist_id": 5 })))
        .await;
    bob.emit(
        "playlistEnter",
        room_payload(&bob_token, "b1", json!({ "playlist_id": "5", "currently_playing": 0 })),
    )
    .await;

    assert_eq!(alice.take("REQUEST_RESPONSE_a1").unwrap()["subCode"], "USER_JOINED");
    assert_eq!(bob.take("REQUEST_RESPONSE_b1").unwrap()["subCode"], "USER_JOINED");

    // Alice saw both entries, the second one lists both participants
    alice.take("PLAYLIST_USER_ENTERED").unwrap();
    let entered = alice.take("PLAYLIST_USER_ENTERED").unwrap();
    let participants = entered["data"]["room"]["participants"].as_object().unwrap();
    assert_eq!(participants.len(), 2);
    assert_eq!(participants["bob#1"]["currently_playing"], 0);
    assert!(!entered.to_string().contains(bob.sid.as_str()));
    assert!(bob.take("PLAYLIST_USER_ENTERED").is_some());

    bob.emit(
        "playlistSetStatus",
        room_payload(&bob_token, "b2", json!({ "playlist_id": 5, "currently_playing": 3 })),
    )
    .await;
    assert_eq!(bob.take("REQUEST_RESPONSE_b2").unwrap()["subCode"], "ROOM_MODIFIED");
    let modified = alice.take("PLAYLIST_MODIFIED").unwrap();
    assert_eq!(
        modified["data"]["room"]["participants"]["bob#1"]["currently_playing"],
        3
    );

    alice
        .emit("playlistLeave", room_payload(&alice_token, "a2", json!({ "playlist_id": 5 })))
        .await;
    assert_eq!(alice.take("REQUEST_RESPONSE_a2").unwrap()["subCode"], "USER_LEFT_SELF");
    let exited = bob.take("PLAYLIST_USER_EXITED").unwrap();
    assert_eq!(
        exited["data"]["room"]["participants"]
            .as_object()
            .unwrap()
            .len(),
        1
    );

    bob.emit("playlistLeave", room_payload(&bob_token, "b3", json!({ "playlist_id": 5 })))
        .await;
    assert_eq!(bob.take("REQUEST_RESPONSE_b3").unwrap()["subCode"], "ROOM_CLOSED");
    assert!(app.services.rooms.view(5).is_none());

    bob.emit("playlistLeave", room_payload(&bob_token, "b4", json!({ "playlist_id": 5 })))
        .await;
    assert_eq!(bob.take("REQUEST_RESPONSE_b4").unwrap()["subCode"], "ROOM_NOT_EXIST");
}

#[tokio::test]
async fn test_room_events_validate_payload() {
    let app = TestApp::new();
    let (mut client, token) = authenticated(&app, "alice").await;

    client
        .emit("playlistEnter", room_payload(&token, "p1", json!({})))
        .await;
    client
        .emit("playlistEnter", room_payload(&token, "p2", json!({ "playlist_id": 0 })))
        .await;
    client
        .emit("playlistSetStatus", room_payload(&token, "p3", json!({ "playlist_id": 1 })))
        .await;

    for id in ["p1", "p2"] {
        let payload = client.take(&format!("REQUEST_RESPONSE_{}", id)).unwrap();
        assert_eq!(payload["subCode"], "PAYLOAD_REQUIRED_OMITTED");
        assert_eq!(payload["data"]["omitted"], "playlist_id");
    }
    assert_eq!(
        client.take("REQUEST_RESPONSE_p3").unwrap()["data"]["omitted"],
        "currently_playing"
    );
}

#[tokio::test]
async fn test_room_event_before_playco_connect_closes() {
    let app = TestApp::new();
    let mut client = app.connect();
    let token = app.issue("alice", &client, NONCE).await;

    client
        .emit(
            "playlistEnter",
            room_payload(&token.token, "early", json!({ "playlist_id": 1 })),
        )
        .await;

    assert_eq!(
        client.take("REQUEST_RESPONSE_early").unwrap()["subCode"],
        "SESSION_NOT_EXIST"
    );
    assert!(client.is_closed());
    assert!(app.services.rooms.is_empty());
}

#[tokio::test]
async fn test_session_limit_closes_extra_connection() {
    let app = TestApp::builder().max_sessions(1).build();
    let (_first, _) = authenticated(&app, "alice").await;
    let mut second = app.connect();

    let (_, response) = second.authenticate(&app, "alice").await;

    assert_eq!(response["subCode"], "MAX_SESSION_CONNECTED");
    assert!(second.is_closed());
    assert!(app.services.registry.get(&second.sid).is_none());

    // Other users are unaffected
    let (_bob, _) = authenticated(&app, "bob").await;
}

#[tokio::test]
async fn test_session_numbers_are_reused() {
    let app = TestApp::new();
    let (first, _) = authenticated(&app, "alice").await;
    let (_second, _) = authenticated(&app, "alice").await;
    first.disconnect().await;

    let mut third = app.connect();
    let (_, response) = third.authenticate(&app, "alice").await;
    assert_eq!(response["data"]["session_number"], 1);
}

#[tokio::test]
async fn test_disconnect_cleans_up() {
    let app = TestApp::new();
    let (alice, alice_token) = authenticated(&app, "alice").await;
    let (mut bob, bob_token) = authenticated(&app, "bob").await;

    alice
        .emit("playlistEnter", room_payload(&alice_token, "a", json!({ "playlist_id": 9 })))
        .await;
    bob.emit("playlistEnter", room_payload(&bob_token, "b", json!({ "playlist_id": 9 })))
        .await;
    bob.drain();

    let sid = alice.sid.clone();
    alice.disconnect().await;

    let exited = bob.take("PLAYLIST_USER_EXITED").unwrap();
    let participants = exited["data"]["room"]["participants"].as_object().unwrap();
    assert_eq!(participants.len(), 1);
    assert!(participants.contains_key("bob#1"));

    assert!(app.services.registry.get(&sid).is_none());
    assert!(!app.services.connections.is_connected(&sid));
    assert_matches!(
        app.services
            .coordinator
            .validate_auth(&sid, NONCE, &alice_token)
            .await,
        Err(AuthFailure::NotFound)
    );
}

#[tokio::test]
async fn test_grace_period_restores_rooms() {
    let app = TestApp::builder()
        .grace_period(Duration::seconds(60))
        .build();
    let (alice, token) = authenticated(&app, "alice").await;
    alice
        .emit(
            "playlistEnter",
            room_payload(&token, "a", json!({ "playlist_id": 4, "currently_playing": 1 })),
        )
        .await;
    alice.disconnect().await;
    assert!(app.services.rooms.view(4).is_none());

    app.clock.advance(Duration::seconds(30));
    let mut again = app.connect();
    let (_, response) = again.authenticate(&app, "alice").await;

    assert_eq!(response["subCode"], "SESSION_CREATED");
    assert_eq!(response["data"]["restored"], true);
    assert_eq!(response["data"]["rooms"], json!([4]));
    let view = app.services.rooms.view(4).unwrap();
    assert_eq!(view.participants["alice#1"].currently_playing, Some(1));
}

#[tokio::test]
async fn test_grace_period_expires() {
    let app = TestApp::builder()
        .grace_period(Duration::seconds(60))
        .build();
    let (alice, token) = authenticated(&app, "alice").await;
    alice
        .emit("playlistEnter", room_payload(&token, "a", json!({ "playlist_id": 4 })))
        .await;
    alice.disconnect().await;

    app.clock.advance(Duration::seconds(61));
    let mut again = app.connect();
    let (_, response) = again.authenticate(&app, "alice").await;

    assert_eq!(response["data"]["restored"], false);
    assert!(app.services.rooms.view(4).is_none());
}
