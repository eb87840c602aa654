//! Signed media-room token issuance.
//!
//! The media provider is an opaque signaling+media black box; the only
//! contract surface on this side is a token the provider can verify against
//! the shared secret. Tokens use the time-limited HMAC credential mechanism:
//! a base64url JSON payload carrying (app, user, room, expiry, nonce) joined
//! with a base64url HMAC-SHA256 signature over the encoded payload.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::Sha256;

use crate::config::MediaConfig;
use crate::routes::{fail, ok, ApiResult};
use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenClaims {
    pub app_id: String,
    pub user_id: String,
    pub room_id: String,
    pub nonce: String,
    pub expires_at: i64,
}

/// Issue a room token for a user. Returns (token, expires_at unix seconds).
pub fn issue_room_token(
    cfg: &MediaConfig,
    user_id: &str,
    room_id: &str,
) -> Result<(String, i64), serde_json::Error> {
    let expires_at = Utc::now().timestamp() + cfg.token_ttl_secs as i64;

    let mut nonce_bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);

    let claims = TokenClaims {
        app_id: cfg.app_id.clone(),
        user_id: user_id.to_string(),
        room_id: room_id.to_string(),
        nonce: URL_SAFE_NO_PAD.encode(nonce_bytes),
        expires_at,
    };

    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
    let signature = sign(&cfg.server_secret, payload.as_bytes());

    Ok((format!("{payload}.{signature}"), expires_at))
}

/// Verify a room token: signature first (constant-time), then expiry.
pub fn verify_room_token(cfg: &MediaConfig, token: &str) -> Option<TokenClaims> {
    let (payload, signature) = token.split_once('.')?;

    let mut mac = HmacSha256::new_from_slice(cfg.server_secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(payload.as_bytes());
    let sig_bytes = URL_SAFE_NO_PAD.decode(signature).ok()?;
    mac.verify_slice(&sig_bytes).ok()?;

    let claims: TokenClaims = serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).ok()?).ok()?;
    if claims.expires_at <= Utc::now().timestamp() {
        return None;
    }
    Some(claims)
}

fn sign(secret: &str, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload);
    URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenQuery {
    pub user_id: String,
    pub room_id: String,
}

/// GET /api/calls/token?userId=&roomId=
/// Issue a signed media-room token for joining the external call provider.
pub async fn issue_token(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> ApiResult {
    if query.user_id.is_empty() || query.room_id.is_empty() {
        return Err(fail(StatusCode::BAD_REQUEST, "Missing userId or roomId"));
    }

    let (token, expires_at) = issue_room_token(&state.media, &query.user_id, &query.room_id)
        .map_err(|e| {
            tracing::warn!(error = %e, "Failed to encode room token");
            fail(StatusCode::INTERNAL_SERVER_ERROR, "Failed to issue token")
        })?;

    Ok(ok(json!({
        "token": token,
        "appId": state.media.app_id,
        "expiresAt": expires_at,
    })))
}
