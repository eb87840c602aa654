use std::sync::{Arc, RwLock};

use crate::ai::ReplyClient;
use crate::call::state::CallRegistry;
use crate::config::MediaConfig;
use crate::db::DbPool;
use crate::notify::Notifier;
use crate::ws::SessionRegistry;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// SQLite connection wrapped in Arc<Mutex>
    pub db: DbPool,
    /// Live WebSocket connections per user (the rooms)
    pub sessions: SessionRegistry,
    /// Ephemeral call attempts keyed by receiver user id
    pub calls: CallRegistry,
    /// Notification dispatcher with startup queuing
    pub notifier: Arc<Notifier>,
    /// Assistant user id, resolved at startup (or when the assistant is
    /// created through the directory), so the routing hot path checks no magic id
    pub assistant_id: Arc<RwLock<Option<String>>>,
    /// Reply-generation collaborator; None when the assistant is disabled
    pub reply_client: Option<Arc<ReplyClient>>,
    /// Media-room token settings (with the effective signing secret)
    pub media: MediaConfig,
}

impl AppState {
    /// Whether a user id names the designated assistant identity.
    pub fn is_assistant(&self, user_id: &str) -> bool {
        self.assistant_id
            .read()
            .map(|guard| guard.as_deref() == Some(user_id))
            .unwrap_or(false)
    }

    /// Record the assistant identity's user id.
    pub fn set_assistant(&self, user_id: String) {
        if let Ok(mut guard) = self.assistant_id.write() {
            *guard = Some(user_id);
        }
    }
}
