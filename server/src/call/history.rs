//! Persisted call-history recording.
//!
//! Whichever call leg observes the end first records the history row; the
//! other leg may race it with its own submission. The (conversation, room)
//! upsert key makes the double write merge (max duration, latest status)
//! instead of duplicating.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use crate::chat::store::{self, MessageRecord, MESSAGE_COLUMNS};
use crate::routes::{fail, ok, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallHistoryRequest {
    pub sender_id: String,
    pub receiver_id: String,
    pub room_id: String,
    pub call_type: String,
    #[serde(default)]
    pub duration: i64,
    pub status: String,
    pub direction: String,
}

/// POST /api/calls/history
/// Idempotent upsert of a call-history record keyed by (conversation, room).
/// A zero-duration "ended" submission is stored as "missed": a call that
/// never ran has not ended.
pub async fn record_call(
    State(state): State<AppState>,
    Json(body): Json<CallHistoryRequest>,
) -> ApiResult {
    if !matches!(body.call_type.as_str(), "voice" | "video") {
        return Err(fail(StatusCode::BAD_REQUEST, "Invalid call type"));
    }
    if !matches!(body.status.as_str(), "ended" | "missed" | "declined") {
        return Err(fail(StatusCode::BAD_REQUEST, "Invalid call status"));
    }
    if !matches!(body.direction.as_str(), "sender" | "receiver") {
        return Err(fail(StatusCode::BAD_REQUEST, "Invalid call direction"));
    }
    if body.room_id.is_empty() {
        return Err(fail(StatusCode::BAD_REQUEST, "Missing room id"));
    }

    let duration = body.duration.max(0);
    let status = if duration == 0 && body.status == "ended" {
        "missed".to_string()
    } else {
        body.status.clone()
    };

    let db = state.db.clone();

    let record = tokio::task::spawn_blocking(move || {
        let conn = match db.lock() {
            Ok(conn) => conn,
            Err(poisoned) => poisoned.into_inner(),
        };

        let conversation_id =
            store::find_or_create_conversation(&conn, &body.sender_id, &body.receiver_id)?;

        let id = uuid::Uuid::now_v7().to_string();
        let timestamp = Utc::now().timestamp_millis();
        let created_at = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO messages (id, conversation_id, sender_id, receiver_id, message_type,
                                   call_type, call_status, call_duration, call_direction,
                                   call_room_id, timestamp, created_at)
             VALUES (?1, ?2, ?3, ?4, 'call', ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(conversation_id, call_room_id) WHERE message_type = 'call'
             DO UPDATE SET call_duration = max(call_duration, excluded.call_duration),
                           call_status = excluded.call_status,
                           call_direction = excluded.call_direction",
            rusqlite::params![
                id,
                conversation_id,
                body.sender_id,
                body.receiver_id,
                body.call_type,
                status,
                duration,
                body.direction,
                body.room_id,
                timestamp,
                created_at
            ],
        )?;

        let row = conn.query_row(
            &format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE conversation_id = ?1 AND call_room_id = ?2 AND message_type = 'call'"
            ),
            rusqlite::params![conversation_id, body.room_id],
            |row| store::message_from_row(row),
        )?;

        store::touch_conversation(&conn, &conversation_id, &row.id)?;

        Ok::<_, rusqlite::Error>(MessageRecord::from_row(&row))
    })
    .await
    .map_err(|_| fail(StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))?
    .map_err(|e| {
        tracing::warn!(error = %e, "Failed to record call history");
        fail(StatusCode::INTERNAL_SERVER_ERROR, "Failed to record call")
    })?;

    Ok(ok(record))
}
