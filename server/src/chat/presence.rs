//! Presence and typing fan-out.
//!
//! Online/offline transitions derive from session registry changes and are
//! broadcast globally; `status` queries answer only the requester; typing
//! indicators relay to the named receiver's room. All of it is
//! fire-and-forget: an offline receiver simply never sees the event.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::state::AppState;
use crate::ws::{broadcast, is_online, ConnectionSender};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusQuery {
    receiver_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TypingPayload {
    receiver_id: String,
}

/// Broadcast `user_came_online` to every other connected client.
/// Called from the actor when a user's first connection registers.
pub fn announce_online(state: &AppState, user_id: &str) {
    broadcast::broadcast_to_others(
        &state.sessions,
        user_id,
        "user_came_online",
        &json!({ "userId": user_id }),
    );
}

/// Broadcast `user_went_offline` to every other connected client.
/// Called from the actor when a user's last connection is gone.
pub fn announce_offline(state: &AppState, user_id: &str) {
    broadcast::broadcast_to_others(
        &state.sessions,
        user_id,
        "user_went_offline",
        &json!({ "userId": user_id }),
    );
}

/// Handle a `status` query: answer only the requester with `online` or
/// `offline` for the named user. The assistant identity always reports
/// online regardless of registry state.
pub fn handle_status(data: Value, tx: &ConnectionSender, state: &AppState) {
    let query: StatusQuery = match serde_json::from_value(data) {
        Ok(query) => query,
        Err(e) => {
            tracing::debug!(error = %e, "Dropping malformed status query");
            return;
        }
    };

    let online = state.is_assistant(&query.receiver_id) || is_online(&state.sessions, &query.receiver_id);
    let event = if online { "online" } else { "offline" };
    broadcast::send_frame(tx, event, &json!({ "userId": query.receiver_id }));
}

/// Relay a `typing` intent to the receiver's room as `is_typing`.
pub fn handle_typing(data: Value, state: &AppState, sender_id: Option<&str>) {
    relay_typing(data, state, sender_id, "is_typing");
}

/// Relay an `is_not_typing` intent to the receiver's room as `not_typing`.
pub fn handle_stop_typing(data: Value, state: &AppState, sender_id: Option<&str>) {
    relay_typing(data, state, sender_id, "not_typing");
}

fn relay_typing(data: Value, state: &AppState, sender_id: Option<&str>, event: &str) {
    let payload: TypingPayload = match serde_json::from_value(data) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::debug!(error = %e, "Dropping malformed typing payload");
            return;
        }
    };

    broadcast::emit_to_user(
        &state.sessions,
        &payload.receiver_id,
        event,
        &json!({ "receiverId": payload.receiver_id, "senderId": sender_id }),
    );
}
