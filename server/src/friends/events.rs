//! WebSocket-side friend events: the `get_friends` listing and the client-
//! initiated request notification relays. Relays go through the Notifier so
//! they share queue semantics with the REST-initiated notifications.

use serde::Deserialize;
use serde_json::Value;

use crate::friends::store;
use crate::state::AppState;
use crate::ws::{broadcast, ConnectionSender};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestSentPayload {
    receiver_id: String,
    #[allow(dead_code)]
    sender_username: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestRespondedPayload {
    sender_id: String,
}

/// Handle `get_friends`: answer the requesting connection with `friend_list`.
pub async fn handle_get_friends(data: Value, tx: &ConnectionSender, state: &AppState) {
    let Some(user_id) = data.as_str().filter(|s| !s.is_empty()).map(String::from) else {
        tracing::debug!("get_friends without a user id");
        return;
    };

    let db = state.db.clone();
    let entries = tokio::task::spawn_blocking(move || {
        let conn = match db.lock() {
            Ok(conn) => conn,
            Err(poisoned) => poisoned.into_inner(),
        };
        store::list_friends(&conn, &user_id)
    })
    .await;

    match entries {
        Ok(Ok(entries)) => broadcast::send_frame(tx, "friend_list", &entries),
        Ok(Err(e)) => tracing::warn!(error = %e, "Failed to load friend list"),
        Err(e) => tracing::warn!(error = %e, "Friend list task failed"),
    }
}

/// Relay a client-side `friend_request_sent` to the receiver's room as
/// `friend_request_received`.
pub fn handle_request_sent(data: Value, state: &AppState) {
    let payload: RequestSentPayload = match serde_json::from_value(data.clone()) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::debug!(error = %e, "Dropping malformed friend_request_sent payload");
            return;
        }
    };
    state
        .notifier
        .emit_to_user(&payload.receiver_id, "friend_request_received", data);
}

/// Relay a client-side `friend_request_responded` to the original sender.
pub fn handle_request_responded(data: Value, state: &AppState) {
    let payload: RequestRespondedPayload = match serde_json::from_value(data.clone()) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::debug!(error = %e, "Dropping malformed friend_request_responded payload");
            return;
        }
    };
    state
        .notifier
        .emit_to_user(&payload.sender_id, "friend_request_responded", data);
}
