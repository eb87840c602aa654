//! Blocking store helpers for the relationship service. The friendship
//! model is two directed edges per relation, each carrying denormalized
//! display fields for the friend side; block state is soft and attributed
//! to the blocker.

use rusqlite::Connection;
use serde::Serialize;

/// Friend-list entry as served over REST and the `friend_list` event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendEntry {
    pub id: String,
    pub username: String,
    pub avatar_url: Option<String>,
    pub is_blocked: bool,
    pub blocked_by: Option<String>,
}

/// Upsert one directed edge, refreshing the denormalized display fields
/// from the user directory. Existing block state is preserved.
pub fn upsert_friend_edge(
    conn: &Connection,
    user_id: &str,
    friend_id: &str,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO friends (user_id, friend_id, friend_username, friend_avatar_url)
         SELECT ?1, id, username, avatar_url FROM users WHERE id = ?2
         ON CONFLICT(user_id, friend_id) DO UPDATE SET
             friend_username = excluded.friend_username,
             friend_avatar_url = excluded.friend_avatar_url",
        rusqlite::params![user_id, friend_id],
    )?;
    Ok(())
}

/// Upsert both directions of a friendship. After this, each user can look
/// the other up as a friend.
pub fn upsert_friendship(conn: &Connection, user_a: &str, user_b: &str) -> rusqlite::Result<()> {
    upsert_friend_edge(conn, user_a, user_b)?;
    upsert_friend_edge(conn, user_b, user_a)?;
    Ok(())
}

/// Whether a non-blocked friendship edge exists from user to friend.
pub fn are_friends(conn: &Connection, user_id: &str, friend_id: &str) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM friends
         WHERE user_id = ?1 AND friend_id = ?2 AND is_blocked = 0",
        rusqlite::params![user_id, friend_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Whether either side of the pair has blocked the other.
pub fn is_blocked_between(conn: &Connection, a: &str, b: &str) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM friends
         WHERE ((user_id = ?1 AND friend_id = ?2) OR (user_id = ?2 AND friend_id = ?1))
           AND is_blocked = 1",
        rusqlite::params![a, b],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// List a user's friends. Edges the peer blocked are withheld from this
/// user's view; edges this user blocked stay visible with the block flag so
/// the client can offer unblock.
pub fn list_friends(conn: &Connection, user_id: &str) -> rusqlite::Result<Vec<FriendEntry>> {
    let mut stmt = conn.prepare(
        "SELECT friend_id, friend_username, friend_avatar_url, is_blocked, blocked_by
         FROM friends
         WHERE user_id = ?1
           AND NOT (is_blocked = 1 AND blocked_by = friend_id)
         ORDER BY friend_username COLLATE NOCASE ASC",
    )?;

    let entries = stmt
        .query_map(rusqlite::params![user_id], |row| {
            Ok(FriendEntry {
                id: row.get(0)?,
                username: row.get(1)?,
                avatar_url: row.get(2)?,
                is_blocked: row.get::<_, i64>(3)? != 0,
                blocked_by: row.get(4)?,
            })
        })?
        .filter_map(|r| r.ok())
        .collect();

    Ok(entries)
}

/// Soft-block: mark both edges blocked, attributed to the blocker.
pub fn block_friend(conn: &Connection, blocker_id: &str, friend_id: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE friends SET is_blocked = 1, blocked_by = ?1
         WHERE (user_id = ?1 AND friend_id = ?2) OR (user_id = ?2 AND friend_id = ?1)",
        rusqlite::params![blocker_id, friend_id],
    )
}

/// Unblock: only the original blocker can lift the block.
pub fn unblock_friend(
    conn: &Connection,
    blocker_id: &str,
    friend_id: &str,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE friends SET is_blocked = 0, blocked_by = NULL
         WHERE ((user_id = ?1 AND friend_id = ?2) OR (user_id = ?2 AND friend_id = ?1))
           AND blocked_by = ?1",
        rusqlite::params![blocker_id, friend_id],
    )
}
