//! Message router: turns a `send_message` intent into persisted state plus
//! targeted delivery to the sender and receiver rooms.

use serde::Deserialize;
use serde_json::Value;

use crate::chat::store::{self, MessageRecord};
use crate::friends;
use crate::state::AppState;
use crate::ws::broadcast;

/// Maximum message content length (chars).
const MAX_CONTENT_LENGTH: usize = 4000;

/// Routing failure inside the persistence step.
#[derive(Debug)]
pub enum RouteError {
    /// One side of the pair has blocked the other; the message is dropped.
    Blocked,
    Storage(rusqlite::Error),
    Task(tokio::task::JoinError),
}

impl std::fmt::Display for RouteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteError::Blocked => write!(f, "pair is blocked"),
            RouteError::Storage(e) => write!(f, "storage error: {}", e),
            RouteError::Task(e) => write!(f, "blocking task failed: {}", e),
        }
    }
}

impl From<rusqlite::Error> for RouteError {
    fn from(e: rusqlite::Error) -> Self {
        RouteError::Storage(e)
    }
}

#[derive(Debug, Deserialize)]
struct SendMessagePayload {
    senderid: String,
    receiverid: String,
    #[serde(default)]
    content: String,
    attachment: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BadgePayload {
    receiver_id: String,
    #[serde(default)]
    content: String,
    sender_id: String,
}

/// Handle a `send_message` intent: validate, persist, deliver to both rooms,
/// then branch into the assistant auto-reply when the receiver is the
/// designated assistant identity.
pub async fn handle_send_message(data: Value, state: &AppState) {
    let payload: SendMessagePayload = match serde_json::from_value(data) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::debug!(error = %e, "Dropping malformed send_message payload");
            return;
        }
    };

    let content = payload.content.trim().to_string();
    if content.is_empty() && payload.attachment.is_none() {
        tracing::debug!(sender = %payload.senderid, "Dropping empty message");
        return;
    }
    if content.len() > MAX_CONTENT_LENGTH {
        tracing::debug!(sender = %payload.senderid, "Dropping oversized message");
        return;
    }

    match persist_message(
        state,
        payload.senderid.clone(),
        payload.receiverid.clone(),
        content.clone(),
        payload.attachment.clone(),
    )
    .await
    {
        Ok(record) => {
            deliver(state, &record);
            maybe_assistant_reply(state, &payload.receiverid, &payload.senderid, content);
        }
        Err(RouteError::Blocked) => {
            tracing::debug!(
                sender = %payload.senderid,
                receiver = %payload.receiverid,
                "Dropping message between blocked pair"
            );
        }
        Err(e) => {
            // Event paths log and drop on persistence failure; there is no
            // retry and no error envelope on the live transport.
            tracing::warn!(
                sender = %payload.senderid,
                receiver = %payload.receiverid,
                error = %e,
                "Failed to persist message"
            );
        }
    }
}

/// Handle a `new_messages` intent: relay the lightweight badge event to the
/// receiver's room as `new_message`. Deliberately decoupled from the full
/// persisted-message delivery so notification UIs need not deserialize the
/// message shape.
pub fn handle_new_messages(data: Value, state: &AppState) {
    let payload: BadgePayload = match serde_json::from_value(data.clone()) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::debug!(error = %e, "Dropping malformed new_messages payload");
            return;
        }
    };
    broadcast::emit_to_user(&state.sessions, &payload.receiver_id, "new_message", &data);
}

/// Persist one message: block check, find-or-create conversation, insert,
/// bump the conversation pointer. Returns the full persisted record.
pub async fn persist_message(
    state: &AppState,
    sender_id: String,
    receiver_id: String,
    content: String,
    attachment: Option<String>,
) -> Result<MessageRecord, RouteError> {
    let db = state.db.clone();

    tokio::task::spawn_blocking(move || {
        let conn = match db.lock() {
            Ok(conn) => conn,
            Err(poisoned) => poisoned.into_inner(),
        };

        if friends::store::is_blocked_between(&conn, &sender_id, &receiver_id)? {
            return Err(RouteError::Blocked);
        }

        let conversation_id = store::find_or_create_conversation(&conn, &sender_id, &receiver_id)?;
        let row = store::insert_text_message(
            &conn,
            &conversation_id,
            &sender_id,
            &receiver_id,
            &content,
            attachment.as_deref(),
        )?;
        store::touch_conversation(&conn, &conversation_id, &row.id)?;

        Ok(MessageRecord::from_row(&row))
    })
    .await
    .unwrap_or_else(|e| Err(RouteError::Task(e)))
}

/// Emit the persisted record to the sender's room (local echo / multi-device
/// sync) and the receiver's room (live delivery).
fn deliver(state: &AppState, record: &MessageRecord) {
    broadcast::emit_to_user(
        &state.sessions,
        &record.sender_id,
        "send_message_to_sender",
        record,
    );
    broadcast::emit_to_user(
        &state.sessions,
        &record.receiver_id,
        "send_message_to_receiver",
        record,
    );
}

/// Best-effort assistant side branch: when the receiver is the assistant,
/// generate a reply and run the identical persist-and-deliver sequence with
/// sender and receiver swapped. Failure here never affects the original
/// message, so the work runs on a detached task.
fn maybe_assistant_reply(state: &AppState, receiver_id: &str, sender_id: &str, prompt: String) {
    if !state.is_assistant(receiver_id) {
        return;
    }
    let Some(client) = state.reply_client.clone() else {
        tracing::debug!("Assistant addressed but no reply collaborator configured");
        return;
    };

    let state = state.clone();
    let assistant_id = receiver_id.to_string();
    let user_id = sender_id.to_string();

    tokio::spawn(async move {
        let reply = match client.generate(&prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "Assistant reply generation failed");
                return;
            }
        };
        if reply.trim().is_empty() {
            tracing::debug!("Assistant returned an empty reply");
            return;
        }

        match persist_message(&state, assistant_id.clone(), user_id.clone(), reply, None).await {
            Ok(record) => deliver(&state, &record),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to persist assistant reply");
            }
        }
    });
}
