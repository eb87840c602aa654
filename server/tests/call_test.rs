//! Integration tests for call signaling: ring, resume-after-reload, accept,
//! decline, role-correct end routing, the idempotent history upsert, and
//! media-token issuance.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

type WsRead = futures_util::stream::SplitStream<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
>;
type WsWrite = futures_util::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

fn test_media_config() -> parley_server::config::MediaConfig {
    parley_server::config::MediaConfig {
        app_id: "parley-test".to_string(),
        server_secret: "test-secret".to_string(),
        token_ttl_secs: 60,
    }
}

async fn start_test_server() -> (String, SocketAddr) {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = parley_server::db::init_db(&data_dir).expect("Failed to init DB");
    let sessions = parley_server::ws::new_session_registry();
    let notifier = Arc::new(parley_server::notify::Notifier::new());

    let state = parley_server::state::AppState {
        db,
        sessions: sessions.clone(),
        calls: parley_server::call::state::CallRegistry::new(),
        notifier: notifier.clone(),
        assistant_id: Arc::new(RwLock::new(None)),
        reply_client: None,
        media: test_media_config(),
    };

    let app = parley_server::routes::build_router(state);
    notifier.attach_transport(sessions);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
        let _keep = tmp_dir;
    });

    (format!("http://{}", addr), addr)
}

async fn create_user(base_url: &str, username: &str) -> String {
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/users", base_url))
        .json(&json!({
            "username": username,
            "email": format!("{}@example.com", username),
            "password": "hunter2",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    body["data"]["id"].as_str().unwrap().to_string()
}

async fn connect_as(addr: &SocketAddr, user_id: &str) -> (WsWrite, WsRead) {
    let (ws_stream, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
        .await
        .expect("Failed to connect to WebSocket");
    let (mut write, read) = ws_stream.split();
    write
        .send(Message::Text(
            json!({"event": "join_room", "data": user_id}).to_string(),
        ))
        .await
        .expect("Failed to send join_room");
    (write, read)
}

async fn recv_event(read: &mut WsRead, event: &str) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), read.next())
            .await
            .unwrap_or_else(|_| panic!("Timed out waiting for {}", event))
            .expect("Stream ended")
            .expect("WebSocket error");
        if let Message::Text(text) = msg {
            let frame: Value = serde_json::from_str(&text).expect("Valid frame JSON");
            if frame["event"] == event {
                return frame["data"].clone();
            }
        }
    }
}

async fn drain_messages(read: &mut WsRead) {
    loop {
        match tokio::time::timeout(Duration::from_millis(200), read.next()).await {
            Ok(Some(Ok(_))) => continue,
            _ => break,
        }
    }
}

async fn expect_silence(read: &mut WsRead, millis: u64) {
    let result = tokio::time::timeout(Duration::from_millis(millis), read.next()).await;
    assert!(result.is_err(), "Expected silence, got: {:?}", result);
}

async fn send_event(write: &mut WsWrite, event: &str, data: Value) {
    write
        .send(Message::Text(json!({"event": event, "data": data}).to_string()))
        .await
        .expect("Failed to send event");
}

/// Ring bob from alice and consume the ring events on bob's side.
async fn ring(
    alice_write: &mut WsWrite,
    bob_read: &mut WsRead,
    alice: &str,
    bob: &str,
    call_type: &str,
) {
    send_event(
        alice_write,
        "user_call",
        json!({"senderId": alice, "receiverId": bob, "type": call_type}),
    )
    .await;
    let _ = recv_event(bob_read, "incoming_call").await;
    let _ = recv_event(bob_read, "sender_data").await;
}

#[tokio::test]
async fn user_call_rings_receiver_with_caller_snapshot() {
    let (base_url, addr) = start_test_server().await;
    let alice = create_user(&base_url, "alice").await;
    let bob = create_user(&base_url, "bob").await;

    let (mut alice_write, mut alice_read) = connect_as(&addr, &alice).await;
    let (_bob_write, mut bob_read) = connect_as(&addr, &bob).await;
    drain_messages(&mut alice_read).await;
    drain_messages(&mut bob_read).await;

    send_event(
        &mut alice_write,
        "user_call",
        json!({"senderId": alice, "receiverId": bob, "type": "video"}),
    )
    .await;

    let incoming = recv_event(&mut bob_read, "incoming_call").await;
    assert_eq!(incoming["senderId"], alice.as_str());
    assert_eq!(incoming["receiverId"], bob.as_str());
    assert_eq!(incoming["type"], "video");

    let sender_data = recv_event(&mut bob_read, "sender_data").await;
    assert_eq!(sender_data["id"], alice.as_str());
    assert_eq!(sender_data["username"], "alice");
    assert_eq!(sender_data["type"], "video");
    assert_eq!(sender_data["roomId"], bob.as_str(), "receiver id doubles as room id");
}

#[tokio::test]
async fn reconnecting_receiver_resumes_via_request_sender_data() {
    let (base_url, addr) = start_test_server().await;
    let alice = create_user(&base_url, "alice").await;
    let bob = create_user(&base_url, "bob").await;

    let (mut alice_write, mut alice_read) = connect_as(&addr, &alice).await;
    let (bob_write, mut bob_read) = connect_as(&addr, &bob).await;
    drain_messages(&mut alice_read).await;
    drain_messages(&mut bob_read).await;

    ring(&mut alice_write, &mut bob_read, &alice, &bob, "voice").await;

    // Bob reloads mid-ring: old connection gone, new one re-requests the
    // cached caller snapshot without alice re-initiating.
    drop(bob_write);
    drop(bob_read);
    let (mut bob_write2, mut bob_read2) = connect_as(&addr, &bob).await;
    drain_messages(&mut bob_read2).await;

    send_event(&mut bob_write2, "request_sender_data", json!(bob)).await;
    let resumed = recv_event(&mut bob_read2, "sender_data").await;
    assert_eq!(resumed["id"], alice.as_str());
    assert_eq!(resumed["type"], "voice");
}

#[tokio::test]
async fn accept_notifies_the_caller_only() {
    let (base_url, addr) = start_test_server().await;
    let alice = create_user(&base_url, "alice").await;
    let bob = create_user(&base_url, "bob").await;
    let carol = create_user(&base_url, "carol").await;

    let (mut alice_write, mut alice_read) = connect_as(&addr, &alice).await;
    let (mut bob_write, mut bob_read) = connect_as(&addr, &bob).await;
    let (_carol_write, mut carol_read) = connect_as(&addr, &carol).await;
    drain_messages(&mut alice_read).await;
    drain_messages(&mut bob_read).await;
    drain_messages(&mut carol_read).await;

    ring(&mut alice_write, &mut bob_read, &alice, &bob, "voice").await;

    send_event(&mut bob_write, "call_accepted", json!({"receiverId": bob})).await;

    let accepted = recv_event(&mut alice_read, "accepted").await;
    assert_eq!(accepted, json!([]));
    expect_silence(&mut carol_read, 300).await;
}

#[tokio::test]
async fn end_by_receiver_routes_to_caller_and_clears_the_attempt() {
    let (base_url, addr) = start_test_server().await;
    let alice = create_user(&base_url, "alice").await;
    let bob = create_user(&base_url, "bob").await;
    let carol = create_user(&base_url, "carol").await;

    let (mut alice_write, mut alice_read) = connect_as(&addr, &alice).await;
    let (mut bob_write, mut bob_read) = connect_as(&addr, &bob).await;
    let (_carol_write, mut carol_read) = connect_as(&addr, &carol).await;
    drain_messages(&mut alice_read).await;
    drain_messages(&mut bob_read).await;
    drain_messages(&mut carol_read).await;

    ring(&mut alice_write, &mut bob_read, &alice, &bob, "voice").await;
    send_event(&mut bob_write, "call_accepted", json!({"receiverId": bob})).await;
    let _ = recv_event(&mut alice_read, "accepted").await;

    send_event(
        &mut bob_write,
        "call_ended",
        json!({"receiverId": bob, "endedBy": bob, "direction": "receiver", "duration": 12}),
    )
    .await;

    let ended = recv_event(&mut alice_read, "call_ended_by_receiver").await;
    assert_eq!(ended["duration"], 12);
    // Never broadcast: an unrelated user sees nothing.
    expect_silence(&mut carol_read, 300).await;

    // The attempt is gone; a resume request now yields nothing.
    send_event(&mut bob_write, "request_sender_data", json!(bob)).await;
    expect_silence(&mut bob_read, 300).await;
}

#[tokio::test]
async fn end_by_sender_routes_to_receiver() {
    let (base_url, addr) = start_test_server().await;
    let alice = create_user(&base_url, "alice").await;
    let bob = create_user(&base_url, "bob").await;

    let (mut alice_write, mut alice_read) = connect_as(&addr, &alice).await;
    let (_bob_write, mut bob_read) = connect_as(&addr, &bob).await;
    drain_messages(&mut alice_read).await;
    drain_messages(&mut bob_read).await;

    ring(&mut alice_write, &mut bob_read, &alice, &bob, "video").await;

    send_event(
        &mut alice_write,
        "call_ended",
        json!({"receiverId": bob, "endedBy": alice, "direction": "sender", "duration": 30}),
    )
    .await;

    let ended = recv_event(&mut bob_read, "call_ended_by_sender").await;
    assert_eq!(ended["endedBy"], alice.as_str());
    expect_silence(&mut alice_read, 300).await;
}

#[tokio::test]
async fn decline_forwards_to_the_caller_room() {
    let (base_url, addr) = start_test_server().await;
    let alice = create_user(&base_url, "alice").await;
    let bob = create_user(&base_url, "bob").await;

    let (mut alice_write, mut alice_read) = connect_as(&addr, &alice).await;
    let (mut bob_write, mut bob_read) = connect_as(&addr, &bob).await;
    drain_messages(&mut alice_read).await;
    drain_messages(&mut bob_read).await;

    ring(&mut alice_write, &mut bob_read, &alice, &bob, "voice").await;

    send_event(&mut bob_write, "call_declined", json!({"callerId": alice})).await;

    let declined = recv_event(&mut alice_read, "call_declined").await;
    assert_eq!(declined["callerId"], alice.as_str());

    // Declining retires the cached attempt.
    send_event(&mut bob_write, "request_sender_data", json!(bob)).await;
    expect_silence(&mut bob_read, 300).await;
}

#[tokio::test]
async fn call_history_double_submission_merges_with_max_duration() {
    let (base_url, _addr) = start_test_server().await;
    let alice = create_user(&base_url, "alice").await;
    let bob = create_user(&base_url, "bob").await;
    let client = reqwest::Client::new();

    // Both legs race to record the same call; durations differ by timer skew.
    for duration in [30, 45] {
        let resp = client
            .post(format!("{}/api/calls/history", base_url))
            .json(&json!({
                "senderId": alice,
                "receiverId": bob,
                "roomId": bob,
                "callType": "voice",
                "duration": duration,
                "status": "ended",
                "direction": if duration == 30 { "sender" } else { "receiver" },
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }

    let resp = client
        .get(format!("{}/api/messages/{}/{}", base_url, alice, bob))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    let history = body["data"].as_array().unwrap();

    assert_eq!(history.len(), 1, "one history row per (conversation, room)");
    assert_eq!(history[0]["messageType"], "call");
    assert_eq!(history[0]["callData"]["duration"], 45, "duration keeps the max");
    assert_eq!(history[0]["callData"]["status"], "ended");
    assert_eq!(history[0]["callData"]["roomId"], bob.as_str());
}

#[tokio::test]
async fn zero_duration_ended_call_is_recorded_as_missed() {
    let (base_url, _addr) = start_test_server().await;
    let alice = create_user(&base_url, "alice").await;
    let bob = create_user(&base_url, "bob").await;
    let client = reqwest::Client::new();

    // Receiver never picked up; the caller gave up at 0 seconds elapsed.
    let resp = client
        .post(format!("{}/api/calls/history", base_url))
        .json(&json!({
            "senderId": alice,
            "receiverId": bob,
            "roomId": bob,
            "callType": "video",
            "duration": 0,
            "status": "ended",
            "direction": "sender",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["callData"]["status"], "missed");
    assert_eq!(body["data"]["callData"]["duration"], 0);
}

#[tokio::test]
async fn issued_room_tokens_verify_against_the_shared_secret() {
    let (base_url, _addr) = start_test_server().await;
    let alice = create_user(&base_url, "alice").await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!(
            "{}/api/calls/token?userId={}&roomId=room-7",
            base_url, alice
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["appId"], "parley-test");

    let token = body["data"]["token"].as_str().unwrap();
    let claims = parley_server::call::token::verify_room_token(&test_media_config(), token)
        .expect("token verifies with the shared secret");
    assert_eq!(claims.user_id, alice);
    assert_eq!(claims.room_id, "room-7");
}
