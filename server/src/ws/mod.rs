pub mod actor;
pub mod broadcast;
pub mod handler;
pub mod protocol;

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Type alias for the sender half of a WebSocket connection's channel.
/// Other parts of the system can clone this to push messages to a specific client.
pub type ConnectionSender = mpsc::UnboundedSender<axum::extract::ws::Message>;

/// Session registry: tracks all live WebSocket connections per user.
/// The entry for a user id is that user's "room": every sender in the Vec
/// receives user-addressed events, so multiple tabs/devices all get delivery.
/// Arc<DashMap<UserId, Vec<ConnectionSender>>>
pub type SessionRegistry = Arc<DashMap<String, Vec<ConnectionSender>>>;

/// Create a new empty session registry.
pub fn new_session_registry() -> SessionRegistry {
    Arc::new(DashMap::new())
}

/// Whether a user currently has at least one live connection.
pub fn is_online(registry: &SessionRegistry, user_id: &str) -> bool {
    registry
        .get(user_id)
        .map(|entry| !entry.value().is_empty())
        .unwrap_or(false)
}
