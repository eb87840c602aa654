//! Call signaling coordinator.
//!
//! State machine per call attempt:
//! idle -> ringing -> {accepted -> active -> ended} | declined | missed.
//! The coordinator resolves every emission to exactly one room through the
//! call-attempt cache; end-of-call events are never broadcast, so an
//! unrelated user sharing a room name can never misread them.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::call::state::{CallAttempt, CallerSnapshot};
use crate::state::AppState;
use crate::ws::{broadcast, ConnectionSender};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserCallPayload {
    sender_id: String,
    receiver_id: String,
    #[serde(rename = "type")]
    call_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallAcceptedPayload {
    receiver_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallDeclinedPayload {
    caller_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallEndedPayload {
    receiver_id: String,
    #[allow(dead_code)]
    ended_by: String,
    direction: String,
}

/// Caller snapshot as served to the receiver (`sender_data`), both at ring
/// time and on a `request_sender_data` resume.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SenderData<'a> {
    id: &'a str,
    username: &'a str,
    avatar_url: Option<&'a str>,
    #[serde(rename = "type")]
    call_type: &'a str,
    room_id: &'a str,
}

impl<'a> SenderData<'a> {
    fn from_attempt(attempt: &'a CallAttempt) -> Self {
        Self {
            id: &attempt.caller.id,
            username: &attempt.caller.username,
            avatar_url: attempt.caller.avatar_url.as_deref(),
            call_type: &attempt.call_type,
            room_id: &attempt.room_id,
        }
    }
}

/// Handle a `user_call` intent: snapshot the caller into the attempt cache
/// keyed by the receiver's id, then ring the receiver's room.
///
/// An offline receiver still "rings": delivery is a silent no-op and the
/// caller's client owns the give-up timeout.
pub async fn handle_user_call(data: Value, state: &AppState) {
    let payload: UserCallPayload = match serde_json::from_value(data) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::debug!(error = %e, "Dropping malformed user_call payload");
            return;
        }
    };

    let caller = match snapshot_caller(state, payload.sender_id.clone()).await {
        Some(caller) => caller,
        None => {
            tracing::warn!(sender = %payload.sender_id, "user_call from unknown user");
            return;
        }
    };

    // The receiver's id doubles as the media room id in the 1:1 case.
    let attempt = CallAttempt::new(
        caller,
        payload.call_type.clone(),
        payload.receiver_id.clone(),
    );

    broadcast::emit_to_user(
        &state.sessions,
        &payload.receiver_id,
        "incoming_call",
        &json!({
            "senderId": payload.sender_id,
            "receiverId": payload.receiver_id,
            "type": payload.call_type,
        }),
    );
    broadcast::emit_to_user(
        &state.sessions,
        &payload.receiver_id,
        "sender_data",
        &SenderData::from_attempt(&attempt),
    );

    state.calls.insert(&payload.receiver_id, attempt);
}

/// Handle a `request_sender_data` intent: re-serve the cached caller
/// snapshot to the requesting connection only, so a receiver that reloaded
/// mid-ring can resume the incoming-call UI.
pub fn handle_request_sender_data(data: Value, tx: &ConnectionSender, state: &AppState) {
    let Some(receiver_id) = data.as_str().filter(|s| !s.is_empty()) else {
        tracing::debug!("request_sender_data without a room key");
        return;
    };

    match state.calls.get(receiver_id) {
        Some(attempt) => {
            broadcast::send_frame(tx, "sender_data", &SenderData::from_attempt(&attempt));
        }
        None => {
            tracing::debug!(receiver = %receiver_id, "No cached call attempt to resume");
        }
    }
}

/// Handle a `call_accepted` intent (keyed by the receiver's own id): resolve
/// the cached caller and notify the caller's room only. The attempt stays
/// cached; it is still needed to correlate the end of the call.
pub fn handle_call_accepted(data: Value, state: &AppState) {
    let payload: CallAcceptedPayload = match serde_json::from_value(data) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::debug!(error = %e, "Dropping malformed call_accepted payload");
            return;
        }
    };

    match state.calls.get(&payload.receiver_id) {
        Some(attempt) => {
            broadcast::emit_to_user(&state.sessions, &attempt.caller.id, "accepted", &json!([]));
        }
        None => {
            tracing::warn!(receiver = %payload.receiver_id, "call_accepted with no cached attempt");
        }
    }
}

/// Handle a `call_declined` intent: forward to the caller's room and clear
/// the declining receiver's attempt.
pub fn handle_call_declined(data: Value, state: &AppState, session_user: Option<&str>) {
    let payload: CallDeclinedPayload = match serde_json::from_value(data.clone()) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::debug!(error = %e, "Dropping malformed call_declined payload");
            return;
        }
    };

    broadcast::emit_to_user(&state.sessions, &payload.caller_id, "call_declined", &data);

    if let Some(receiver_id) = session_user {
        state.calls.remove(receiver_id);
    }
}

/// Handle a `call_ended` intent. The ending side tags its role via
/// `direction`; the coordinator resolves the counterpart through the cache
/// and emits the role-correct event to that counterpart alone.
pub fn handle_call_ended(data: Value, state: &AppState) {
    let payload: CallEndedPayload = match serde_json::from_value(data.clone()) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::debug!(error = %e, "Dropping malformed call_ended payload");
            return;
        }
    };

    match payload.direction.as_str() {
        "sender" => {
            // Caller hung up: the counterpart is the receiver, whose id is
            // the cache key carried in the payload.
            broadcast::emit_to_user(
                &state.sessions,
                &payload.receiver_id,
                "call_ended_by_sender",
                &data,
            );
            state.calls.remove(&payload.receiver_id);
        }
        "receiver" => {
            // Receiver hung up: resolve the caller from their own cache
            // entry, then retire it.
            match state.calls.remove(&payload.receiver_id) {
                Some(attempt) => {
                    broadcast::emit_to_user(
                        &state.sessions,
                        &attempt.caller.id,
                        "call_ended_by_receiver",
                        &data,
                    );
                }
                None => {
                    tracing::warn!(receiver = %payload.receiver_id, "call_ended with no cached attempt");
                }
            }
        }
        other => {
            tracing::debug!(direction = other, "Dropping call_ended with unknown direction");
        }
    }
}

/// Snapshot the caller's user-directory record for the attempt cache.
async fn snapshot_caller(state: &AppState, user_id: String) -> Option<CallerSnapshot> {
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || {
        let conn = db.lock().ok()?;
        conn.query_row(
            "SELECT id, username, avatar_url FROM users WHERE id = ?1",
            rusqlite::params![user_id],
            |row| {
                Ok(CallerSnapshot {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    avatar_url: row.get(2)?,
                })
            },
        )
        .ok()
    })
    .await
    .ok()
    .flatten()
}
