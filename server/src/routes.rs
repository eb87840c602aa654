use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::PeerIpKeyExtractor;
use tower_governor::GovernorLayer;

use crate::state::AppState;
use crate::ws::handler as ws_handler;
use crate::{call, chat, friends, users};

/// Uniform REST envelope: every endpoint answers {success, message, data}.
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
    pub data: Value,
}

pub type ApiResult = Result<Json<ApiResponse>, (StatusCode, Json<ApiResponse>)>;

/// Successful envelope around a serializable payload.
pub fn ok(data: impl Serialize) -> Json<ApiResponse> {
    let data = match serde_json::to_value(data) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to serialize response payload");
            Value::Null
        }
    };
    Json(ApiResponse {
        success: true,
        message: "ok".to_string(),
        data,
    })
}

/// Failure envelope with an HTTP status and a user-facing message.
pub fn fail(status: StatusCode, message: &str) -> (StatusCode, Json<ApiResponse>) {
    (
        status,
        Json(ApiResponse {
            success: false,
            message: message.to_string(),
            data: Value::Null,
        }),
    )
}

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    // Rate limiting on token issuance: 2 tokens/sec per IP with a small burst.
    // Uses PeerIpKeyExtractor which reads from ConnectInfo<SocketAddr>.
    let governor_config = Arc::new(
        GovernorConfigBuilder::default()
            .key_extractor(PeerIpKeyExtractor)
            .per_second(2)
            .burst_size(20)
            .finish()
            .expect("Failed to build governor config"),
    );
    let governor_limiter = governor_config.limiter().clone();

    // Background task to clean up rate limiter state
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            governor_limiter.retain_recent();
        }
    });

    let token_routes = Router::new()
        .route("/api/calls/token", get(call::token::issue_token))
        .layer(GovernorLayer {
            config: governor_config,
        });

    Router::new()
        // User directory
        .route(
            "/api/users",
            post(users::directory::create_user).get(users::directory::lookup_user),
        )
        .route("/api/users/{id}", get(users::directory::get_user))
        // Friends and friend requests
        .route(
            "/api/friends/requests",
            post(friends::requests::create_request).get(friends::requests::list_pending),
        )
        .route(
            "/api/friends/requests/{id}/respond",
            post(friends::requests::respond_request),
        )
        .route("/api/friends/{user_id}", get(friends::requests::list_friends))
        .route("/api/friends/{user_id}/block", post(friends::requests::block))
        .route("/api/friends/{user_id}/unblock", post(friends::requests::unblock))
        // Conversation history
        .route(
            "/api/messages/{user_id}/{peer_id}",
            get(chat::history::get_messages),
        )
        .route(
            "/api/messages/{user_id}/{peer_id}/clear",
            post(chat::history::clear_messages),
        )
        // Call history
        .route("/api/calls/history", post(call::history::record_call))
        .merge(token_routes)
        // Live transport
        .route("/ws", get(ws_handler::ws_upgrade))
        .with_state(state)
}
