//! Integration tests for WebSocket sessions, presence broadcast, status
//! queries, and typing relay.

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

/// Helper: start the server on a random port and return (base_url, addr).
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
        media: parley_server::config::MediaConfig {
            app_id: "parley-test".to_string(),
            server_secret: "test-secret".to_string(),
            token_ttl_secs: 60,
        },
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

/// Register a user through the directory and return its id.
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
    assert_eq!(resp.status(), 200, "User creation failed for {}", username);
    let body: Value = resp.json().await.unwrap();
    body["data"]["id"].as_str().unwrap().to_string()
}

/// Connect a WebSocket client and register it under a user id.
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

/// Read frames until one carries the expected event; returns its data.
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

/// Drain any pending frames (presence noise from concurrent joins).
async fn drain_messages(read: &mut WsRead) {
    loop {
        match tokio::time::timeout(Duration::from_millis(200), read.next()).await {
            Ok(Some(Ok(_))) => continue,
            _ => break,
        }
    }
}

/// Assert that no frame arrives within the window.
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

#[tokio::test]
async fn join_room_broadcasts_user_came_online_to_others() {
    let (base_url, addr) = start_test_server().await;
    let alice = create_user(&base_url, "alice").await;
    let bob = create_user(&base_url, "bob").await;

    let (_alice_write, mut alice_read) = connect_as(&addr, &alice).await;
    drain_messages(&mut alice_read).await;

    let (_bob_write, mut bob_read) = connect_as(&addr, &bob).await;

    let data = recv_event(&mut alice_read, "user_came_online").await;
    assert_eq!(data["userId"], bob.as_str());

    // The joining user does not hear about themselves.
    expect_silence(&mut bob_read, 300).await;
}

#[tokio::test]
async fn status_query_answers_only_the_requester() {
    let (base_url, addr) = start_test_server().await;
    let alice = create_user(&base_url, "alice").await;
    let bob = create_user(&base_url, "bob").await;

    let (mut alice_write, mut alice_read) = connect_as(&addr, &alice).await;
    let (bob_write, bob_read) = connect_as(&addr, &bob).await;
    drain_messages(&mut alice_read).await;

    send_event(&mut alice_write, "status", json!({"receiverId": bob})).await;
    let data = recv_event(&mut alice_read, "online").await;
    assert_eq!(data["userId"], bob.as_str());

    // Disconnect bob; presence flips to offline.
    drop(bob_write);
    drop(bob_read);
    let _ = recv_event(&mut alice_read, "user_went_offline").await;

    send_event(&mut alice_write, "status", json!({"receiverId": bob})).await;
    let data = recv_event(&mut alice_read, "offline").await;
    assert_eq!(data["userId"], bob.as_str());
}

#[tokio::test]
async fn assistant_identity_always_reports_online() {
    let (base_url, addr) = start_test_server().await;
    let alice = create_user(&base_url, "alice").await;

    // Create the assistant through the directory; it never connects.
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/users", base_url))
        .json(&json!({
            "username": "aria",
            "email": "aria@assistant.invalid",
            "password": "n/a",
            "isAssistant": true,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let assistant = body["data"]["id"].as_str().unwrap().to_string();

    let (mut alice_write, mut alice_read) = connect_as(&addr, &alice).await;
    drain_messages(&mut alice_read).await;

    send_event(&mut alice_write, "status", json!({"receiverId": assistant})).await;
    let data = recv_event(&mut alice_read, "online").await;
    assert_eq!(data["userId"], assistant.as_str());
}

#[tokio::test]
async fn typing_relays_to_the_receiver_room_only() {
    let (base_url, addr) = start_test_server().await;
    let alice = create_user(&base_url, "alice").await;
    let bob = create_user(&base_url, "bob").await;
    let carol = create_user(&base_url, "carol").await;

    let (mut alice_write, mut alice_read) = connect_as(&addr, &alice).await;
    let (_bob_write, mut bob_read) = connect_as(&addr, &bob).await;
    let (_carol_write, mut carol_read) = connect_as(&addr, &carol).await;
    drain_messages(&mut alice_read).await;
    drain_messages(&mut bob_read).await;
    drain_messages(&mut carol_read).await;

    send_event(&mut alice_write, "typing", json!({"receiverId": bob})).await;
    let data = recv_event(&mut bob_read, "is_typing").await;
    assert_eq!(data["receiverId"], bob.as_str());
    assert_eq!(data["senderId"], alice.as_str());

    send_event(&mut alice_write, "is_not_typing", json!({"receiverId": bob})).await;
    let _ = recv_event(&mut bob_read, "not_typing").await;

    // Typing is targeted, not broadcast.
    expect_silence(&mut carol_read, 300).await;
}

#[tokio::test]
async fn last_disconnect_broadcasts_user_went_offline() {
    let (base_url, addr) = start_test_server().await;
    let alice = create_user(&base_url, "alice").await;
    let bob = create_user(&base_url, "bob").await;

    let (_alice_write, mut alice_read) = connect_as(&addr, &alice).await;
    let (mut bob_write, bob_read) = connect_as(&addr, &bob).await;
    drain_messages(&mut alice_read).await;

    bob_write.send(Message::Close(None)).await.unwrap();
    drop(bob_write);
    drop(bob_read);

    let data = recv_event(&mut alice_read, "user_went_offline").await;
    assert_eq!(data["userId"], bob.as_str());
}

#[tokio::test]
async fn multi_tab_presence_fires_on_first_and_last_connection_only() {
    let (base_url, addr) = start_test_server().await;
    let alice = create_user(&base_url, "alice").await;
    let bob = create_user(&base_url, "bob").await;

    let (_bob_write, mut bob_read) = connect_as(&addr, &bob).await;
    drain_messages(&mut bob_read).await;

    // First tab: online broadcast.
    let (tab1_write, tab1_read) = connect_as(&addr, &alice).await;
    let data = recv_event(&mut bob_read, "user_came_online").await;
    assert_eq!(data["userId"], alice.as_str());

    // Second tab: no duplicate online broadcast.
    let (tab2_write, mut tab2_read) = connect_as(&addr, &alice).await;
    expect_silence(&mut bob_read, 300).await;

    // First tab closes: alice is still online via the second tab.
    drop(tab1_write);
    drop(tab1_read);
    expect_silence(&mut bob_read, 300).await;

    // Both tabs of a user receive user-addressed events: bob messages alice.
    let (mut bob_write2, mut bob_read2) = connect_as(&addr, &bob).await;
    drain_messages(&mut bob_read2).await;
    drain_messages(&mut tab2_read).await;
    send_event(
        &mut bob_write2,
        "send_message",
        json!({"senderid": bob, "receiverid": alice, "content": "ping"}),
    )
    .await;
    let data = recv_event(&mut tab2_read, "send_message_to_receiver").await;
    assert_eq!(data["content"], "ping");

    // Last tab closes: offline broadcast.
    drop(tab2_write);
    drop(tab2_read);
    let data = recv_event(&mut bob_read, "user_went_offline").await;
    assert_eq!(data["userId"], alice.as_str());
}
