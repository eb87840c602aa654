//! Blocking store helpers shared by the message router, the history REST
//! endpoints, and the call-history recorder. All functions expect to run
//! inside tokio::task::spawn_blocking with the connection lock held.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

use crate::db::models::MessageRow;

/// Wire shape of a persisted message, as delivered to clients and returned
/// from the history endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: String,
    pub conversation_id: String,
    #[serde(rename = "senderid")]
    pub sender_id: String,
    #[serde(rename = "receiverid")]
    pub receiver_id: String,
    pub message_type: String,
    pub content: Option<String>,
    pub attachment: Option<String>,
    pub call_data: Option<CallData>,
    pub timestamp: i64,
    pub created_at: String,
}

/// Call metadata carried on messages with message_type = 'call'.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallData {
    #[serde(rename = "type")]
    pub call_type: String,
    pub duration: i64,
    pub status: String,
    pub direction: String,
    pub room_id: String,
}

impl MessageRecord {
    pub fn from_row(row: &MessageRow) -> Self {
        let call_data = if row.message_type == "call" {
            Some(CallData {
                call_type: row.call_type.clone().unwrap_or_default(),
                duration: row.call_duration.unwrap_or(0),
                status: row.call_status.clone().unwrap_or_default(),
                direction: row.call_direction.clone().unwrap_or_default(),
                room_id: row.call_room_id.clone().unwrap_or_default(),
            })
        } else {
            None
        };

        Self {
            id: row.id.clone(),
            conversation_id: row.conversation_id.clone(),
            sender_id: row.sender_id.clone(),
            receiver_id: row.receiver_id.clone(),
            message_type: row.message_type.clone(),
            content: row.content.clone(),
            attachment: row.attachment_url.clone(),
            call_data,
            timestamp: row.timestamp,
            created_at: row.created_at.clone(),
        }
    }
}

/// Normalize an unordered user pair: the lexicographically smaller id is
/// always participant_a.
pub fn normalize_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Find the conversation id for an unordered participant pair, if one exists.
pub fn find_conversation_id(
    conn: &Connection,
    user_a: &str,
    user_b: &str,
) -> rusqlite::Result<Option<String>> {
    let (participant_a, participant_b) = normalize_pair(user_a, user_b);
    conn.query_row(
        "SELECT id FROM conversations WHERE participant_a = ?1 AND participant_b = ?2",
        rusqlite::params![participant_a, participant_b],
        |row| row.get(0),
    )
    .optional()
}

/// Find or lazily create the conversation for an unordered participant pair.
///
/// Safe under racing senders: INSERT OR IGNORE lets the unique constraint
/// pick a winner, and the loser falls through to the select.
pub fn find_or_create_conversation(
    conn: &Connection,
    user_a: &str,
    user_b: &str,
) -> rusqlite::Result<String> {
    let (participant_a, participant_b) = normalize_pair(user_a, user_b);

    let candidate_id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT OR IGNORE INTO conversations (id, participant_a, participant_b) VALUES (?1, ?2, ?3)",
        rusqlite::params![candidate_id, participant_a, participant_b],
    )?;

    conn.query_row(
        "SELECT id FROM conversations WHERE participant_a = ?1 AND participant_b = ?2",
        rusqlite::params![participant_a, participant_b],
        |row| row.get(0),
    )
}

/// Update a conversation's last-message pointer and updated-at timestamp.
pub fn touch_conversation(
    conn: &Connection,
    conversation_id: &str,
    last_message_id: &str,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE conversations SET last_message_id = ?2, updated_at = datetime('now') WHERE id = ?1",
        rusqlite::params![conversation_id, last_message_id],
    )?;
    Ok(())
}

/// Insert a text message row and return its full record.
pub fn insert_text_message(
    conn: &Connection,
    conversation_id: &str,
    sender_id: &str,
    receiver_id: &str,
    content: &str,
    attachment: Option<&str>,
) -> rusqlite::Result<MessageRow> {
    let id = uuid::Uuid::now_v7().to_string();
    let timestamp = Utc::now().timestamp_millis();
    let created_at = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO messages (id, conversation_id, sender_id, receiver_id, message_type, content, attachment_url, timestamp, created_at)
         VALUES (?1, ?2, ?3, ?4, 'text', ?5, ?6, ?7, ?8)",
        rusqlite::params![id, conversation_id, sender_id, receiver_id, content, attachment, timestamp, created_at],
    )?;

    Ok(MessageRow {
        id,
        conversation_id: conversation_id.to_string(),
        sender_id: sender_id.to_string(),
        receiver_id: receiver_id.to_string(),
        message_type: "text".to_string(),
        content: Some(content.to_string()),
        attachment_url: attachment.map(|s| s.to_string()),
        timestamp,
        created_at,
        call_type: None,
        call_status: None,
        call_duration: None,
        call_direction: None,
        call_room_id: None,
    })
}

/// Read one message row from a query result.
pub fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        receiver_id: row.get(3)?,
        message_type: row.get(4)?,
        content: row.get(5)?,
        attachment_url: row.get(6)?,
        timestamp: row.get(7)?,
        created_at: row.get(8)?,
        call_type: row.get(9)?,
        call_status: row.get(10)?,
        call_duration: row.get(11)?,
        call_direction: row.get(12)?,
        call_room_id: row.get(13)?,
    })
}

/// Column list matching message_from_row.
pub const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, receiver_id, message_type, \
     content, attachment_url, timestamp, created_at, \
     call_type, call_status, call_duration, call_direction, call_room_id";
