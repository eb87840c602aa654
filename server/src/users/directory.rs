//! User directory REST surface: create plus lookup by id, username, email.
//! Authentication itself is an external collaborator; this server only
//! stores the directory record (the password arrives pre-hashed or is
//! hashed at this boundary as an opaque value).

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::db::models::UserRow;
use crate::friends;
use crate::routes::{fail, ok, ApiResult};
use crate::state::AppState;
use crate::users::store;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserBody {
    pub username: String,
    pub email: String,
    pub password: String,
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub is_assistant: bool,
}

#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    pub username: Option<String>,
    pub email: Option<String>,
}

/// Directory record as served over REST; never includes the password hash.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub email: String,
    pub avatar_url: Option<String>,
    pub is_assistant: bool,
    pub created_at: String,
}

impl UserRecord {
    fn from_row(row: &UserRow) -> Self {
        Self {
            id: row.id.clone(),
            username: row.username.clone(),
            email: row.email.clone(),
            avatar_url: row.avatar_url.clone(),
            is_assistant: row.is_assistant,
            created_at: row.created_at.clone(),
        }
    }
}

enum CreateOutcome {
    Created(UserRecord),
    Duplicate,
}

/// POST /api/users
/// Create a directory record. New users are auto-befriended by the
/// assistant identity when one exists, so the assistant shows up in their
/// friend list from the first session.
pub async fn create_user(State(state): State<AppState>, Json(body): Json<CreateUserBody>) -> ApiResult {
    let username = body.username.trim().to_string();
    let email = body.email.trim().to_lowercase();
    if username.is_empty() || email.is_empty() || body.password.is_empty() {
        return Err(fail(StatusCode::BAD_REQUEST, "Missing username, email or password"));
    }

    let db = state.db.clone();
    let avatar_url = body.avatar_url.clone();
    let is_assistant = body.is_assistant;
    let password_hash = format!("{:x}", Sha256::digest(body.password.as_bytes()));

    let outcome = tokio::task::spawn_blocking(move || {
        let conn = match db.lock() {
            Ok(conn) => conn,
            Err(poisoned) => poisoned.into_inner(),
        };

        let id = uuid::Uuid::now_v7().to_string();
        match store::insert_user(
            &conn,
            &id,
            &username,
            &email,
            &password_hash,
            avatar_url.as_deref(),
            is_assistant,
        ) {
            Ok(()) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Ok(CreateOutcome::Duplicate);
            }
            Err(e) => return Err(e),
        }

        // AI-friend bootstrap: every new user starts befriended with the
        // assistant, both directions.
        if !is_assistant {
            let assistant: Option<String> = conn
                .query_row(
                    "SELECT id FROM users WHERE is_assistant = 1 LIMIT 1",
                    [],
                    |row| row.get(0),
                )
                .ok();
            if let Some(assistant_id) = assistant {
                friends::store::upsert_friendship(&conn, &id, &assistant_id)?;
            }
        }

        let row = store::fetch_by_id(&conn, &id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
        Ok(CreateOutcome::Created(UserRecord::from_row(&row)))
    })
    .await
    .map_err(|_| fail(StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))?
    .map_err(|e: rusqlite::Error| {
        tracing::warn!(error = %e, "Failed to create user");
        fail(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create user")
    })?;

    match outcome {
        CreateOutcome::Created(record) => {
            if record.is_assistant {
                state.set_assistant(record.id.clone());
            }
            Ok(ok(record))
        }
        CreateOutcome::Duplicate => {
            Err(fail(StatusCode::CONFLICT, "Username or email already taken"))
        }
    }
}

/// GET /api/users/{id}
pub async fn get_user(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let db = state.db.clone();

    let row = tokio::task::spawn_blocking(move || {
        let conn = match db.lock() {
            Ok(conn) => conn,
            Err(poisoned) => poisoned.into_inner(),
        };
        store::fetch_by_id(&conn, &id)
    })
    .await
    .map_err(|_| fail(StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))?
    .map_err(|e| {
        tracing::warn!(error = %e, "Failed to look up user");
        fail(StatusCode::INTERNAL_SERVER_ERROR, "Failed to look up user")
    })?;

    match row {
        Some(row) => Ok(ok(UserRecord::from_row(&row))),
        None => Err(fail(StatusCode::NOT_FOUND, "User not found")),
    }
}

/// GET /api/users?username= or ?email=
pub async fn lookup_user(State(state): State<AppState>, Query(query): Query<LookupQuery>) -> ApiResult {
    if query.username.is_none() && query.email.is_none() {
        return Err(fail(StatusCode::BAD_REQUEST, "Provide username or email"));
    }

    let db = state.db.clone();

    let row = tokio::task::spawn_blocking(move || {
        let conn = match db.lock() {
            Ok(conn) => conn,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(username) = &query.username {
            store::fetch_by_username(&conn, username)
        } else if let Some(email) = &query.email {
            store::fetch_by_email(&conn, &email.to_lowercase())
        } else {
            Ok(None)
        }
    })
    .await
    .map_err(|_| fail(StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))?
    .map_err(|e| {
        tracing::warn!(error = %e, "Failed to look up user");
        fail(StatusCode::INTERNAL_SERVER_ERROR, "Failed to look up user")
    })?;

    match row {
        Some(row) => Ok(ok(UserRecord::from_row(&row))),
        None => Err(fail(StatusCode::NOT_FOUND, "User not found")),
    }
}
