//! Blocking store helpers for the user directory.

use rusqlite::{Connection, OptionalExtension};

use crate::db::models::UserRow;

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        avatar_url: row.get(4)?,
        is_assistant: row.get::<_, i64>(5)? != 0,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

const USER_COLUMNS: &str =
    "id, username, email, password_hash, avatar_url, is_assistant, created_at, updated_at";

pub fn fetch_by_id(conn: &Connection, id: &str) -> rusqlite::Result<Option<UserRow>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        rusqlite::params![id],
        user_from_row,
    )
    .optional()
}

pub fn fetch_by_username(conn: &Connection, username: &str) -> rusqlite::Result<Option<UserRow>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
        rusqlite::params![username],
        user_from_row,
    )
    .optional()
}

pub fn fetch_by_email(conn: &Connection, email: &str) -> rusqlite::Result<Option<UserRow>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
        rusqlite::params![email],
        user_from_row,
    )
    .optional()
}

pub fn insert_user(
    conn: &Connection,
    id: &str,
    username: &str,
    email: &str,
    password_hash: &str,
    avatar_url: Option<&str>,
    is_assistant: bool,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO users (id, username, email, password_hash, avatar_url, is_assistant)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![id, username, email, password_hash, avatar_url, is_assistant as i64],
    )?;
    Ok(())
}

/// Resolve the assistant identity, creating it on first boot if configured.
/// Returns the assistant's user id.
pub fn ensure_assistant(conn: &Connection, username: &str) -> rusqlite::Result<String> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM users WHERE is_assistant = 1 LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(id) = existing {
        return Ok(id);
    }

    let id = uuid::Uuid::now_v7().to_string();
    insert_user(
        conn,
        &id,
        username,
        &format!("{username}@assistant.invalid"),
        "!",
        None,
        true,
    )?;
    tracing::info!(user_id = %id, username = %username, "Created assistant identity");
    Ok(id)
}
