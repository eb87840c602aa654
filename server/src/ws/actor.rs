use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};

use crate::chat::presence;
use crate::state::AppState;
use crate::ws::{protocol, ConnectionSender};

/// Ping interval: server sends WebSocket ping every 30 seconds.
/// Prevents connection leaks from abrupt disconnects.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Pong timeout: if pong not received within 10 seconds after ping, close.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Run the actor-per-connection pattern for a WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards messages from an mpsc channel
/// - Reader task: processes incoming frames, dispatches to protocol handlers
///
/// The mpsc channel allows any part of the system to send messages to this
/// client by cloning the sender. The connection is anonymous until the client
/// registers a user identity with a `join_room` frame.
pub async fn run_connection(socket: WebSocket, state: AppState) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    // Identity registered by join_room; None until then.
    let mut session_user: Option<String> = None;

    tracing::debug!("WebSocket actor started");

    // Spawn writer task: forwards mpsc messages to the WebSocket sink
    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    // Track pong reception
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();

    // Spawn ping task: sends periodic pings and monitors pong responses
    let ping_tx = tx.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(PING_INTERVAL);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
                // Writer task has died — connection is gone
                break;
            }

            match timeout(PONG_TIMEOUT, pong_rx.recv()).await {
                Ok(Some(())) => {
                    // Pong received, continue
                }
                _ => {
                    tracing::warn!("Pong timeout, closing connection");
                    let _ = ping_tx.send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Pong timeout".into(),
                    })));
                    break;
                }
            }
        }
    });

    // Reader loop: process incoming WebSocket messages
    loop {
        match ws_receiver.next().await {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    protocol::handle_text_frame(text.as_str(), &tx, &state, &mut session_user)
                        .await;
                }
                Message::Binary(_) => {
                    tracing::debug!(
                        user_id = session_user.as_deref().unwrap_or("<anonymous>"),
                        "Received binary message (expected JSON text)"
                    );
                }
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    let _ = tx.send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::debug!(
                        user_id = session_user.as_deref().unwrap_or("<anonymous>"),
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::debug!(
                    user_id = session_user.as_deref().unwrap_or("<anonymous>"),
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                // Stream ended — client disconnected
                break;
            }
        }
    }

    // Cleanup: abort writer and ping tasks, then unregister
    writer_handle.abort();
    ping_handle.abort();

    if let Some(user_id) = session_user {
        unregister_session(&state, &user_id, &tx);
        tracing::info!(user_id = %user_id, "WebSocket actor stopped");
    }
}

/// Writer task: receives messages from the mpsc channel and forwards them
/// to the WebSocket sink.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if ws_sender.send(msg).await.is_err() {
            // WebSocket send failed — connection is broken
            break;
        }
    }
}

/// Register this connection under a user id (the `join_room` intent).
///
/// Joins the connection to the user's room. The online transition is
/// broadcast only for the user's first live connection; additional tabs
/// join the room silently. Re-registering the same connection under a
/// different id moves it between rooms.
pub fn register_session(
    state: &AppState,
    user_id: &str,
    tx: ConnectionSender,
    session_user: &mut Option<String>,
) {
    if let Some(previous) = session_user.take() {
        if previous != user_id {
            unregister_session(state, &previous, &tx);
        }
    }

    let came_online = {
        let mut entry = state.sessions.entry(user_id.to_string()).or_default();
        let was_empty = entry.is_empty();
        // Guard against a duplicate join_room on the same connection.
        if !entry.iter().any(|sender| sender.same_channel(&tx)) {
            entry.push(tx);
        }
        was_empty
    };

    *session_user = Some(user_id.to_string());

    let conn_count = state
        .sessions
        .get(user_id)
        .map(|v| v.len())
        .unwrap_or(0);
    tracing::debug!(user_id = %user_id, connections = conn_count, "Session registered");

    if came_online {
        presence::announce_online(state, user_id);
    }
}

/// Remove this connection from the user's room.
///
/// A no-op if the user was never registered (already cleaned up, or the
/// client disconnected before join_room). The offline transition is
/// broadcast only when the user's last connection is gone.
pub fn unregister_session(state: &AppState, user_id: &str, tx: &ConnectionSender) {
    let mut remove_user = false;

    if let Some(mut connections) = state.sessions.get_mut(user_id) {
        connections.retain(|sender| !sender.same_channel(tx) && !sender.is_closed());
        if connections.is_empty() {
            remove_user = true;
        }
    }

    if remove_user {
        state.sessions.remove(user_id);
        presence::announce_offline(state, user_id);
    }

    tracing::debug!(user_id = %user_id, "Session unregistered");
}
