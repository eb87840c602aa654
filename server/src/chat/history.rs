//! REST read path for conversation history, plus the per-user soft clear.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::Utc;
use rusqlite::OptionalExtension;
use serde_json::json;

use crate::chat::store::{self, MessageRecord, MESSAGE_COLUMNS};
use crate::routes::{fail, ok, ApiResult};
use crate::state::AppState;

/// GET /api/messages/{user_id}/{peer_id}
/// All messages between the pair, from the requesting user's point of view:
/// the requester's clear watermark filters out anything at or before it, and
/// results are ordered by creation ascending. A missing conversation is an
/// empty list, not an error.
pub async fn get_messages(
    State(state): State<AppState>,
    Path((user_id, peer_id)): Path<(String, String)>,
) -> ApiResult {
    let db = state.db.clone();

    let records = tokio::task::spawn_blocking(move || {
        let conn = match db.lock() {
            Ok(conn) => conn,
            Err(poisoned) => poisoned.into_inner(),
        };

        let Some(conversation_id) = store::find_conversation_id(&conn, &user_id, &peer_id)? else {
            return Ok(Vec::new());
        };

        let watermark: Option<i64> = conn
            .query_row(
                "SELECT cleared_at FROM conversation_clears WHERE conversation_id = ?1 AND user_id = ?2",
                rusqlite::params![conversation_id, user_id],
                |row| row.get(0),
            )
            .optional()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE conversation_id = ?1 AND timestamp > ?2
             ORDER BY timestamp ASC, created_at ASC"
        ))?;

        let records: Vec<MessageRecord> = stmt
            .query_map(
                rusqlite::params![conversation_id, watermark.unwrap_or(0)],
                |row| store::message_from_row(row).map(|r| MessageRecord::from_row(&r)),
            )?
            .filter_map(|r| r.ok())
            .collect();

        Ok::<_, rusqlite::Error>(records)
    })
    .await
    .map_err(|_| fail(StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))?
    .map_err(|e| {
        tracing::warn!(error = %e, "Failed to load message history");
        fail(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load messages")
    })?;

    Ok(ok(records))
}

/// POST /api/messages/{user_id}/{peer_id}/clear
/// Set the requesting user's clear watermark to now. The peer's view is
/// untouched; nothing is deleted. Clearing a conversation that does not
/// exist yet is a success no-op.
pub async fn clear_messages(
    State(state): State<AppState>,
    Path((user_id, peer_id)): Path<(String, String)>,
) -> ApiResult {
    let db = state.db.clone();

    let cleared = tokio::task::spawn_blocking(move || {
        let conn = match db.lock() {
            Ok(conn) => conn,
            Err(poisoned) => poisoned.into_inner(),
        };

        let Some(conversation_id) = store::find_conversation_id(&conn, &user_id, &peer_id)? else {
            return Ok(false);
        };

        let cleared_at = Utc::now().timestamp_millis();
        conn.execute(
            "INSERT INTO conversation_clears (conversation_id, user_id, cleared_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(conversation_id, user_id) DO UPDATE SET cleared_at = excluded.cleared_at",
            rusqlite::params![conversation_id, user_id, cleared_at],
        )?;

        Ok::<_, rusqlite::Error>(true)
    })
    .await
    .map_err(|_| fail(StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))?
    .map_err(|e| {
        tracing::warn!(error = %e, "Failed to set clear watermark");
        fail(StatusCode::INTERNAL_SERVER_ERROR, "Failed to clear chat")
    })?;

    Ok(ok(json!({ "cleared": cleared })))
}
