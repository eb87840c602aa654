use axum::extract::ws::Message;
use serde::Serialize;
use serde_json::json;

use super::{ConnectionSender, SessionRegistry};

/// Encode an event frame as a JSON text message.
/// Frame shape is {"event": <name>, "data": <payload>}; the event names are
/// the wire contract and must not be altered.
fn encode_frame(event: &str, data: &impl Serialize) -> Option<Message> {
    match serde_json::to_string(&json!({ "event": event, "data": data })) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            tracing::warn!(event = event, error = %e, "Failed to encode event frame");
            None
        }
    }
}

/// Send an event frame on a single connection.
pub fn send_frame(tx: &ConnectionSender, event: &str, data: &impl Serialize) {
    if let Some(msg) = encode_frame(event, data) {
        let _ = tx.send(msg);
    }
}

/// Emit an event to a specific user's room (all their connections).
/// Delivery to an offline user is a silent no-op.
pub fn emit_to_user(registry: &SessionRegistry, user_id: &str, event: &str, data: &impl Serialize) {
    let Some(msg) = encode_frame(event, data) else {
        return;
    };

    if let Some(connections) = registry.get(user_id) {
        for sender in connections.value().iter() {
            let _ = sender.send(msg.clone());
        }
    }
}

/// Broadcast an event to every connected client.
pub fn broadcast_to_all(registry: &SessionRegistry, event: &str, data: &impl Serialize) {
    let Some(msg) = encode_frame(event, data) else {
        return;
    };

    for entry in registry.iter() {
        for sender in entry.value().iter() {
            let _ = sender.send(msg.clone());
        }
    }
}

/// Broadcast an event to every connected client except one user's room.
/// Used for presence transitions: the user coming online does not need to
/// hear about themselves on their other tabs.
pub fn broadcast_to_others(
    registry: &SessionRegistry,
    except_user_id: &str,
    event: &str,
    data: &impl Serialize,
) {
    let Some(msg) = encode_frame(event, data) else {
        return;
    };

    for entry in registry.iter() {
        if entry.key() == except_user_id {
            continue;
        }
        for sender in entry.value().iter() {
            let _ = sender.send(msg.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::new_session_registry;
    use tokio::sync::mpsc;

    fn frame_event(msg: &Message) -> String {
        match msg {
            Message::Text(text) => serde_json::from_str::<serde_json::Value>(text.as_str())
                .expect("valid frame json")["event"]
                .as_str()
                .expect("event name")
                .to_string(),
            other => panic!("expected text frame, got {:?}", other),
        }
    }

    #[test]
    fn emit_targets_every_connection_in_the_room() {
        let registry = new_session_registry();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        registry.insert("u1".to_string(), vec![tx1, tx2]);

        emit_to_user(&registry, "u1", "new_message", &serde_json::json!({"content": "hi"}));

        assert_eq!(frame_event(&rx1.try_recv().expect("first tab delivery")), "new_message");
        assert_eq!(frame_event(&rx2.try_recv().expect("second tab delivery")), "new_message");
    }

    #[test]
    fn emit_to_offline_user_is_a_noop() {
        let registry = new_session_registry();
        // No panic, no error: delivery to an absent room silently drops.
        emit_to_user(&registry, "ghost", "new_message", &serde_json::json!({}));
    }

    #[test]
    fn broadcast_to_others_skips_the_excluded_room() {
        let registry = new_session_registry();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        registry.insert("u1".to_string(), vec![tx1]);
        registry.insert("u2".to_string(), vec![tx2]);

        broadcast_to_others(
            &registry,
            "u1",
            "user_came_online",
            &serde_json::json!({"userId": "u1"}),
        );

        assert!(rx1.try_recv().is_err(), "excluded room must not receive");
        assert_eq!(frame_event(&rx2.try_recv().expect("other room delivery")), "user_came_online");
    }
}
