//! REST lifecycle for friend requests: created pending, responded exactly
//! once, acceptance upserting both friendship edges transactionally. Live
//! notifications go through the Notifier so they survive the startup window
//! before the transport is attached.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::friends::store;
use crate::routes::{fail, ok, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequestBody {
    pub sender_id: String,
    pub receiver_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondBody {
    pub status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingQuery {
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequestRecord {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub sender_username: Option<String>,
    pub status: String,
    pub created_at: String,
    pub responded_at: Option<String>,
}

enum CreateOutcome {
    Created(FriendRequestRecord),
    UnknownUser,
    SelfRequest,
    AlreadyFriends,
    AlreadyPending,
}

enum RespondOutcome {
    Responded {
        record: FriendRequestRecord,
        receiver_username: String,
    },
    NotFound,
    AlreadyResolved,
}

/// POST /api/friends/requests
/// Create a pending friend request and notify the receiver's room.
pub async fn create_request(
    State(state): State<AppState>,
    Json(body): Json<CreateRequestBody>,
) -> ApiResult {
    if body.sender_id.is_empty() || body.receiver_id.is_empty() {
        return Err(fail(StatusCode::BAD_REQUEST, "Missing senderId or receiverId"));
    }

    let db = state.db.clone();
    let sender_id = body.sender_id.clone();
    let receiver_id = body.receiver_id.clone();

    let outcome = tokio::task::spawn_blocking(move || {
        let conn = match db.lock() {
            Ok(conn) => conn,
            Err(poisoned) => poisoned.into_inner(),
        };

        if sender_id == receiver_id {
            return Ok(CreateOutcome::SelfRequest);
        }

        let sender_username: Option<String> = conn
            .query_row(
                "SELECT username FROM users WHERE id = ?1",
                rusqlite::params![sender_id],
                |row| row.get(0),
            )
            .ok();
        let receiver_exists: bool = conn
            .query_row(
                "SELECT COUNT(*) FROM users WHERE id = ?1",
                rusqlite::params![receiver_id],
                |row| row.get::<_, i64>(0).map(|c| c > 0),
            )
            .unwrap_or(false);

        let Some(sender_username) = sender_username else {
            return Ok(CreateOutcome::UnknownUser);
        };
        if !receiver_exists {
            return Ok(CreateOutcome::UnknownUser);
        }

        if store::are_friends(&conn, &sender_id, &receiver_id)? {
            return Ok(CreateOutcome::AlreadyFriends);
        }

        let id = uuid::Uuid::now_v7().to_string();
        let inserted = conn.execute(
            "INSERT INTO friend_requests (id, sender_id, receiver_id) VALUES (?1, ?2, ?3)",
            rusqlite::params![id, sender_id, receiver_id],
        );

        match inserted {
            Ok(_) => {}
            // The partial unique index rejects a second open request per pair.
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Ok(CreateOutcome::AlreadyPending);
            }
            Err(e) => return Err(e),
        }

        let created_at: String = conn.query_row(
            "SELECT created_at FROM friend_requests WHERE id = ?1",
            rusqlite::params![id],
            |row| row.get(0),
        )?;

        Ok(CreateOutcome::Created(FriendRequestRecord {
            id,
            sender_id,
            receiver_id,
            sender_username: Some(sender_username),
            status: "pending".to_string(),
            created_at,
            responded_at: None,
        }))
    })
    .await
    .map_err(|_| fail(StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))?
    .map_err(|e: rusqlite::Error| {
        tracing::warn!(error = %e, "Failed to create friend request");
        fail(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create request")
    })?;

    match outcome {
        CreateOutcome::Created(record) => {
            state.notifier.emit_to_user(
                &record.receiver_id,
                "friend_request_received",
                json!({
                    "receiverId": record.receiver_id,
                    "senderUsername": record.sender_username,
                    "senderId": record.sender_id,
                    "requestId": record.id,
                }),
            );
            Ok(ok(record))
        }
        CreateOutcome::SelfRequest => Err(fail(StatusCode::BAD_REQUEST, "Cannot befriend yourself")),
        CreateOutcome::UnknownUser => Err(fail(StatusCode::NOT_FOUND, "User not found")),
        CreateOutcome::AlreadyFriends => Err(fail(StatusCode::CONFLICT, "Already friends")),
        CreateOutcome::AlreadyPending => {
            Err(fail(StatusCode::CONFLICT, "Request already pending"))
        }
    }
}

/// POST /api/friends/requests/{id}/respond
/// Transition a pending request to accepted or declined, exactly once.
/// Acceptance upserts both friendship edges in the same transaction.
pub async fn respond_request(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
    Json(body): Json<RespondBody>,
) -> ApiResult {
    if !matches!(body.status.as_str(), "accepted" | "declined") {
        return Err(fail(StatusCode::BAD_REQUEST, "Status must be accepted or declined"));
    }

    let db = state.db.clone();
    let status = body.status.clone();
    let id = request_id.clone();

    let outcome = tokio::task::spawn_blocking(move || {
        let mut conn = match db.lock() {
            Ok(conn) => conn,
            Err(poisoned) => poisoned.into_inner(),
        };

        let tx = conn.transaction()?;

        // Guarded update: only the pending -> resolved transition is legal,
        // and a racing second response loses here with zero rows changed.
        let changed = tx.execute(
            "UPDATE friend_requests
             SET status = ?2, responded_at = datetime('now')
             WHERE id = ?1 AND status = 'pending'",
            rusqlite::params![id, status],
        )?;

        if changed == 0 {
            let exists: bool = tx
                .query_row(
                    "SELECT COUNT(*) FROM friend_requests WHERE id = ?1",
                    rusqlite::params![id],
                    |row| row.get::<_, i64>(0).map(|c| c > 0),
                )
                .unwrap_or(false);
            tx.rollback()?;
            return Ok(if exists {
                RespondOutcome::AlreadyResolved
            } else {
                RespondOutcome::NotFound
            });
        }

        let (sender_id, receiver_id, created_at, responded_at): (String, String, String, Option<String>) =
            tx.query_row(
                "SELECT sender_id, receiver_id, created_at, responded_at
                 FROM friend_requests WHERE id = ?1",
                rusqlite::params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;

        if status == "accepted" {
            store::upsert_friendship(&tx, &sender_id, &receiver_id)?;
        }

        let receiver_username: String = tx.query_row(
            "SELECT username FROM users WHERE id = ?1",
            rusqlite::params![receiver_id],
            |row| row.get(0),
        )?;

        tx.commit()?;

        Ok(RespondOutcome::Responded {
            record: FriendRequestRecord {
                id,
                sender_id,
                receiver_id,
                sender_username: None,
                status,
                created_at,
                responded_at,
            },
            receiver_username,
        })
    })
    .await
    .map_err(|_| fail(StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))?
    .map_err(|e: rusqlite::Error| {
        tracing::warn!(error = %e, "Failed to respond to friend request");
        fail(StatusCode::INTERNAL_SERVER_ERROR, "Failed to respond to request")
    })?;

    match outcome {
        RespondOutcome::Responded {
            record,
            receiver_username,
        } => {
            state.notifier.emit_to_user(
                &record.sender_id,
                "friend_request_responded",
                json!({
                    "senderId": record.sender_id,
                    "status": record.status,
                    "receiverUsername": receiver_username,
                    "receiverId": record.receiver_id,
                }),
            );
            Ok(ok(record))
        }
        RespondOutcome::NotFound => Err(fail(StatusCode::NOT_FOUND, "Request not found")),
        RespondOutcome::AlreadyResolved => {
            Err(fail(StatusCode::CONFLICT, "Request already responded to"))
        }
    }
}

/// GET /api/friends/requests?userId=
/// Pending incoming requests for a receiver, oldest first.
pub async fn list_pending(
    State(state): State<AppState>,
    Query(query): Query<PendingQuery>,
) -> ApiResult {
    let db = state.db.clone();
    let user_id = query.user_id.clone();

    let records = tokio::task::spawn_blocking(move || {
        let conn = match db.lock() {
            Ok(conn) => conn,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut stmt = conn.prepare(
            "SELECT r.id, r.sender_id, r.receiver_id, u.username, r.status, r.created_at, r.responded_at
             FROM friend_requests r
             JOIN users u ON u.id = r.sender_id
             WHERE r.receiver_id = ?1 AND r.status = 'pending'
             ORDER BY r.created_at ASC",
        )?;

        let records: Vec<FriendRequestRecord> = stmt
            .query_map(rusqlite::params![user_id], |row| {
                Ok(FriendRequestRecord {
                    id: row.get(0)?,
                    sender_id: row.get(1)?,
                    receiver_id: row.get(2)?,
                    sender_username: row.get(3)?,
                    status: row.get(4)?,
                    created_at: row.get(5)?,
                    responded_at: row.get(6)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok::<_, rusqlite::Error>(records)
    })
    .await
    .map_err(|_| fail(StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))?
    .map_err(|e| {
        tracing::warn!(error = %e, "Failed to list friend requests");
        fail(StatusCode::INTERNAL_SERVER_ERROR, "Failed to list requests")
    })?;

    Ok(ok(records))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockBody {
    pub friend_id: String,
}

/// GET /api/friends/{userId}
pub async fn list_friends(State(state): State<AppState>, Path(user_id): Path<String>) -> ApiResult {
    let db = state.db.clone();

    let entries = tokio::task::spawn_blocking(move || {
        let conn = match db.lock() {
            Ok(conn) => conn,
            Err(poisoned) => poisoned.into_inner(),
        };
        store::list_friends(&conn, &user_id)
    })
    .await
    .map_err(|_| fail(StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))?
    .map_err(|e| {
        tracing::warn!(error = %e, "Failed to list friends");
        fail(StatusCode::INTERNAL_SERVER_ERROR, "Failed to list friends")
    })?;

    Ok(ok(entries))
}

/// POST /api/friends/{userId}/block
pub async fn block(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(body): Json<BlockBody>,
) -> ApiResult {
    mutate_block(state, user_id, body.friend_id, true).await
}

/// POST /api/friends/{userId}/unblock
pub async fn unblock(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(body): Json<BlockBody>,
) -> ApiResult {
    mutate_block(state, user_id, body.friend_id, false).await
}

async fn mutate_block(state: AppState, user_id: String, friend_id: String, blocked: bool) -> ApiResult {
    let db = state.db.clone();

    let changed = tokio::task::spawn_blocking(move || {
        let conn = match db.lock() {
            Ok(conn) => conn,
            Err(poisoned) => poisoned.into_inner(),
        };
        if blocked {
            store::block_friend(&conn, &user_id, &friend_id)
        } else {
            store::unblock_friend(&conn, &user_id, &friend_id)
        }
    })
    .await
    .map_err(|_| fail(StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))?
    .map_err(|e| {
        tracing::warn!(error = %e, "Failed to update block state");
        fail(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update block state")
    })?;

    if changed == 0 {
        return Err(fail(StatusCode::NOT_FOUND, "Friendship not found"));
    }
    Ok(ok(json!({ "updated": changed })))
}
